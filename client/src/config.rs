use std::env;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1/";

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub credential_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let base_url =
            env::var("MARKETPLACE_API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let credential_dir = env::var("MARKETPLACE_CREDENTIAL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));
        Self {
            base_url,
            credential_dir,
        }
    }
}
