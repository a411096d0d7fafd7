use std::sync::{Arc, RwLock};

use log::{debug, info, warn};
use shared::{Account, RegisterRequest, TokenResponse};
use thiserror::Error;

use super::store::CredentialStore;
use crate::api::{ApiClient, ApiError};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password must be at least {} characters", MIN_PASSWORD_LEN)]
    PasswordTooShort,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Owns the bearer credential and the current account snapshot. Constructed
/// once at startup and cloned into every component that issues authorized
/// calls; the snapshot is only ever replaced wholesale with a server
/// response, never adjusted by client-side arithmetic.
#[derive(Clone)]
pub struct SessionManager {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    account: Arc<RwLock<Option<Account>>>,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            api,
            store,
            account: Arc::new(RwLock::new(None)),
        }
    }

    /// Restores a persisted session if one exists. Every failure mode is
    /// absorbed into the unauthenticated state; nothing propagates.
    pub async fn initialize(&self) {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(err) => {
                warn!("credential storage unreadable: {err}");
                None
            }
        };
        let Some(token) = stored else {
            debug!("no persisted credential, starting unauthenticated");
            return;
        };
        self.api.set_token(Some(token));
        match self.probe().await {
            Ok(account) => info!("session restored for {}", account.email),
            Err(err) => {
                warn!("stored credential rejected: {err}");
                self.discard();
            }
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Account, AuthError> {
        let token: TokenResponse = self
            .api
            .post_form("auth/login", &[("username", email), ("password", password)])
            .await?;
        self.adopt(token.access_token).await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<Account, AuthError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort);
        }
        let request = RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
        };
        let token: TokenResponse = self.api.post_json("auth/register", &request).await?;
        self.adopt(token.access_token).await
    }

    /// Synchronous by contract: clearing local state must not depend on the
    /// network.
    pub fn logout(&self) {
        info!("logging out");
        self.discard();
    }

    /// Re-fetches the identity snapshot; called after any server-side
    /// account mutation to avoid optimistic drift.
    pub async fn refresh(&self) -> Result<Account, AuthError> {
        if !self.api.has_token() {
            return Err(AuthError::NotAuthenticated);
        }
        Ok(self.probe().await?)
    }

    pub fn account(&self) -> Option<Account> {
        self.account.read().unwrap().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.api.has_token() && self.account.read().unwrap().is_some()
    }

    pub(crate) fn replace_snapshot(&self, account: Account) {
        *self.account.write().unwrap() = Some(account);
    }

    async fn adopt(&self, token: String) -> Result<Account, AuthError> {
        if let Err(err) = self.store.save(&token) {
            warn!("failed to persist credential: {err}");
        }
        self.api.set_token(Some(token));
        match self.probe().await {
            Ok(account) => {
                info!("authenticated as {}", account.email);
                Ok(account)
            }
            Err(err) => {
                self.discard();
                Err(AuthError::Api(err))
            }
        }
    }

    async fn probe(&self) -> Result<Account, ApiError> {
        let account: Account = self.api.get_json("users/me").await?;
        self.replace_snapshot(account.clone());
        Ok(account)
    }

    fn discard(&self) {
        if let Err(err) = self.store.clear() {
            warn!("failed to clear stored credential: {err}");
        }
        self.api.set_token(None);
        *self.account.write().unwrap() = None;
    }
}
