use log::info;
use shared::{Account, CreditTopUp, ProfileUpdate};
use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::auth::SessionManager;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("top-up amount must be a positive number")]
    InvalidAmount,
    #[error("nothing to save")]
    NothingToSave,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Profile edit form; an empty password means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Clone)]
pub struct CreditLedger {
    api: ApiClient,
    session: SessionManager,
}

impl CreditLedger {
    pub fn new(api: ApiClient, session: SessionManager) -> Self {
        Self { api, session }
    }

    /// The balance is never incremented locally: the server response
    /// replaces the whole account snapshot.
    pub async fn top_up(&self, amount: f64) -> Result<Account, LedgerError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount);
        }
        let account: Account = self
            .api
            .put_json("users/me/credits", &CreditTopUp { amount })
            .await?;
        info!("balance topped up, server reports {} credits", account.credits);
        self.session.replace_snapshot(account.clone());
        Ok(account)
    }

    /// Only the fields that differ from the current snapshot are sent.
    pub fn profile_delta(current: &Account, form: &ProfileForm) -> ProfileUpdate {
        let mut delta = ProfileUpdate::default();
        if form.full_name != current.full_name {
            delta.full_name = Some(form.full_name.clone());
        }
        if form.email != current.email {
            delta.email = Some(form.email.clone());
        }
        if !form.password.is_empty() {
            delta.password = Some(form.password.clone());
        }
        delta
    }

    pub async fn update_profile(&self, form: &ProfileForm) -> Result<Account, LedgerError> {
        let current = self.session.account().ok_or(LedgerError::NotAuthenticated)?;
        let delta = Self::profile_delta(&current, form);
        if delta.is_empty() {
            return Err(LedgerError::NothingToSave);
        }
        let account: Account = self.api.put_json("users/me", &delta).await?;
        self.session.replace_snapshot(account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::MemoryStore;

    fn account() -> Account {
        Account {
            id: 1,
            email: "user@example.com".into(),
            full_name: "User".into(),
            credits: 3.0,
            is_active: true,
        }
    }

    fn ledger() -> (CreditLedger, SessionManager) {
        let api = ApiClient::new("http://127.0.0.1:9/api/v1/").unwrap();
        let session = SessionManager::new(api.clone(), Arc::new(MemoryStore::default()));
        session.replace_snapshot(account());
        (CreditLedger::new(api, session.clone()), session)
    }

    #[tokio::test]
    async fn top_up_rejects_non_positive_amounts_locally() {
        let (ledger, session) = ledger();
        for amount in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let err = ledger.top_up(amount).await.unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAmount), "amount {amount}");
        }
        // the snapshot was never touched
        assert_eq!(session.account(), Some(account()));
    }

    #[test]
    fn profile_delta_contains_only_changes() {
        let current = account();
        let unchanged = ProfileForm {
            full_name: current.full_name.clone(),
            email: current.email.clone(),
            password: String::new(),
        };
        assert!(CreditLedger::profile_delta(&current, &unchanged).is_empty());

        let renamed = ProfileForm {
            full_name: "Renamed".into(),
            email: current.email.clone(),
            password: String::new(),
        };
        let delta = CreditLedger::profile_delta(&current, &renamed);
        assert_eq!(delta.full_name.as_deref(), Some("Renamed"));
        assert_eq!(delta.email, None);
        assert_eq!(delta.password, None);
    }

    #[tokio::test]
    async fn empty_profile_delta_fails_without_a_network_call() {
        let (ledger, _session) = ledger();
        let current = account();
        let form = ProfileForm {
            full_name: current.full_name.clone(),
            email: current.email.clone(),
            password: String::new(),
        };
        let err = ledger.update_profile(&form).await.unwrap_err();
        assert!(matches!(err, LedgerError::NothingToSave));
    }
}
