use std::env;
use std::sync::Arc;

use client::api::ApiClient;
use client::auth::{FileStore, SessionManager};
use client::catalog::ModelCatalog;
use client::config::Config;
use client::stats::DashboardService;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = Config::from_env();
    log::info!("marketplace endpoint: {}", config.base_url);

    let api = ApiClient::new(&config.base_url).map_err(io_error)?;
    let store = Arc::new(FileStore::new(&config.credential_dir));
    let session = SessionManager::new(api.clone(), store);
    let catalog = ModelCatalog::new(api.clone(), session.clone());
    let dashboard = DashboardService::new(api.clone(), catalog.clone());

    session.initialize().await;
    if !session.is_authenticated() {
        let email = env::var("MARKETPLACE_EMAIL").ok();
        let password = env::var("MARKETPLACE_PASSWORD").ok();
        let (Some(email), Some(password)) = (email, password) else {
            log::error!(
                "no stored session; set MARKETPLACE_EMAIL and MARKETPLACE_PASSWORD to log in"
            );
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "missing credentials",
            ));
        };
        session.login(&email, &password).await.map_err(io_error)?;
    }

    if let Some(account) = session.account() {
        log::info!("signed in as {} ({} credits)", account.email, account.credits);
    }

    let stats = dashboard.refresh().await.map_err(io_error)?;
    log::info!(
        "{} predictions, total cost {:.1}",
        stats.total_count,
        stats.total_cost
    );
    for usage in &stats.by_model {
        log::info!("  {}: {} predictions", usage.name, usage.count);
    }
    for usage in &stats.by_type {
        log::info!("  {}: {} predictions", usage.model_type, usage.count);
    }
    for recent in &stats.recent {
        log::info!(
            "  recent #{} via {} (cost {})",
            recent.record.id,
            recent.model_name,
            recent.record.cost
        );
    }

    Ok(())
}

fn io_error<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}
