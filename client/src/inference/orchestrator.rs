use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, info, warn};
use reqwest::multipart::{Form, Part};
use shared::{BatchResult, PredictionRecord, PredictionRequest};
use thiserror::Error;

use super::input::{ParseError, parse_feature_vector};
use crate::MINIMUM_STAKE;
use crate::api::{ApiClient, ApiError};
use crate::auth::SessionManager;
use crate::catalog::ModelCatalog;

/// Tabular text formats accepted as batch input.
pub const BATCH_INPUT_EXTENSIONS: &[&str] = &["csv"];

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Input(#[from] ParseError),
    #[error("no model selected")]
    NoModelSelected,
    #[error("batch input must be a .csv file")]
    UnsupportedBatchFile,
    #[error("insufficient credits")]
    InsufficientCredits,
    #[error("a submission is already in flight")]
    InFlight,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("model no longer exists: {0}")]
    ModelGone(String),
    #[error("input file read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Api(ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    AdmissionCheck,
    Submitting,
}

// Holding the guard keeps the orchestrator out of Idle; dropping it returns
// there on every exit path, success and failure alike.
struct PhaseGuard {
    phase: Arc<Mutex<Phase>>,
}

impl PhaseGuard {
    fn begin(phase: &Arc<Mutex<Phase>>) -> Result<Self, SubmitError> {
        let mut current = phase.lock().unwrap();
        if *current != Phase::Idle {
            return Err(SubmitError::InFlight);
        }
        *current = Phase::Validating;
        drop(current);
        Ok(Self { phase: phase.clone() })
    }

    fn advance(&self, to: Phase) {
        *self.phase.lock().unwrap() = to;
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        *self.phase.lock().unwrap() = Phase::Idle;
    }
}

/// Coordinates input validation, admission control and submission. At most
/// one charge-causing request is outstanding per orchestrator instance.
#[derive(Clone)]
pub struct InferenceOrchestrator {
    api: ApiClient,
    session: SessionManager,
    catalog: ModelCatalog,
    selected: Arc<RwLock<Option<i64>>>,
    history: Arc<RwLock<Vec<PredictionRecord>>>,
    phase: Arc<Mutex<Phase>>,
}

impl InferenceOrchestrator {
    pub fn new(api: ApiClient, session: SessionManager, catalog: ModelCatalog) -> Self {
        Self {
            api,
            session,
            catalog,
            selected: Arc::new(RwLock::new(None)),
            history: Arc::new(RwLock::new(Vec::new())),
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }

    pub fn select_model(&self, model_id: Option<i64>) {
        *self.selected.write().unwrap() = model_id;
    }

    pub fn selected_model(&self) -> Option<i64> {
        *self.selected.read().unwrap()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().unwrap()
    }

    pub async fn predict_vector(&self, raw_input: &str) -> Result<PredictionRecord, SubmitError> {
        let guard = PhaseGuard::begin(&self.phase)?;
        let features = parse_feature_vector(raw_input)?;
        guard.advance(Phase::AdmissionCheck);
        let model_id = self.admitted_model()?;
        guard.advance(Phase::Submitting);
        debug!("submitting {}-feature vector to model {model_id}", features.len());
        let request = PredictionRequest { input_data: features };
        let record: PredictionRecord = match self
            .api
            .post_json(&format!("models/{model_id}/predict"), &request)
            .await
        {
            Ok(record) => record,
            Err(err) => return Err(self.fail_submission(err).await),
        };
        info!("prediction {} accepted, cost {}", record.id, record.cost);
        self.reconcile_after_success().await;
        Ok(record)
    }

    pub async fn predict_batch(&self, input_file: &Path) -> Result<BatchResult, SubmitError> {
        let guard = PhaseGuard::begin(&self.phase)?;
        check_batch_file(input_file)?;
        guard.advance(Phase::AdmissionCheck);
        let model_id = self.admitted_model()?;
        guard.advance(Phase::Submitting);
        let bytes = tokio::fs::read(input_file).await?;
        let file_name = input_file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("input.csv")
            .to_string();
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")
            .map_err(|err| SubmitError::Api(ApiError::Transport(err)))?;
        let form = Form::new()
            .part("file", part)
            .text("model_id", model_id.to_string());
        let result: BatchResult = match self.api.post_multipart("predictions/file", form).await {
            Ok(result) => result,
            Err(err) => return Err(self.fail_submission(err).await),
        };
        info!("batch file processed: {} predictions", result.prediction_count());
        self.reconcile_after_success().await;
        Ok(result)
    }

    /// Prediction history, newest first, as delivered by the server.
    pub async fn fetch_history(&self) -> Result<Vec<PredictionRecord>, SubmitError> {
        let records: Vec<PredictionRecord> = self
            .api
            .get_json("predictions/")
            .await
            .map_err(SubmitError::Api)?;
        *self.history.write().unwrap() = records.clone();
        Ok(records)
    }

    pub fn cached_history(&self) -> Vec<PredictionRecord> {
        self.history.read().unwrap().clone()
    }

    pub async fn download_file(&self, file_name: &str) -> Result<Vec<u8>, SubmitError> {
        let name = file_name.rsplit('/').next().unwrap_or(file_name);
        self.api
            .get_bytes(&format!("predictions/file/{name}"))
            .await
            .map_err(SubmitError::Api)
    }

    // Conservative pre-flight: a model must be selected and the account must
    // hold the minimum stake. The exact charge is the remote authority's
    // call at submission time.
    fn admitted_model(&self) -> Result<i64, SubmitError> {
        let model_id = self.selected_model().ok_or(SubmitError::NoModelSelected)?;
        let account = self.session.account().ok_or(SubmitError::NotAuthenticated)?;
        if account.credits < MINIMUM_STAKE {
            return Err(SubmitError::InsufficientCredits);
        }
        Ok(model_id)
    }

    // A gone target means the catalog is stale: refresh it so the entry
    // disappears from future selections.
    async fn fail_submission(&self, err: ApiError) -> SubmitError {
        if err.is_gone() {
            warn!("submission target no longer exists: {err}");
            if let Err(refresh_err) = self.catalog.list().await {
                warn!("catalog refresh after stale reference failed: {refresh_err}");
            }
            SubmitError::ModelGone(err.to_string())
        } else {
            SubmitError::Api(err)
        }
    }

    // The ledger was already debited server-side; pull the authoritative
    // snapshot and the new history entry. Neither failure unwinds the
    // success the user already got.
    async fn reconcile_after_success(&self) {
        if let Err(err) = self.session.refresh().await {
            warn!("account refresh after prediction failed: {err}");
        }
        if let Err(err) = self.fetch_history().await {
            warn!("history refresh after prediction failed: {err}");
        }
    }
}

fn check_batch_file(path: &Path) -> Result<(), SubmitError> {
    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            BATCH_INPUT_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false);
    if supported {
        Ok(())
    } else {
        Err(SubmitError::UnsupportedBatchFile)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use shared::Account;

    use super::*;
    use crate::auth::MemoryStore;

    fn account(credits: f64) -> Account {
        Account {
            id: 1,
            email: "user@example.com".into(),
            full_name: "User".into(),
            credits,
            is_active: true,
        }
    }

    fn orchestrator(credits: Option<f64>) -> InferenceOrchestrator {
        let api = ApiClient::new("http://127.0.0.1:9/api/v1/").unwrap();
        let session = SessionManager::new(api.clone(), Arc::new(MemoryStore::default()));
        if let Some(credits) = credits {
            session.replace_snapshot(account(credits));
        }
        let catalog = ModelCatalog::new(api.clone(), session.clone());
        InferenceOrchestrator::new(api, session, catalog)
    }

    #[tokio::test]
    async fn invalid_vector_fails_during_validation() {
        let orchestrator = orchestrator(Some(5.0));
        orchestrator.select_model(Some(1));
        let err = orchestrator.predict_vector("1.23, x, 7.89").await.unwrap_err();
        assert!(matches!(err, SubmitError::Input(ParseError::NotANumber(_))));
        // terminal states return to idle
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn submission_requires_a_selected_model() {
        let orchestrator = orchestrator(Some(5.0));
        let err = orchestrator.predict_vector("1 2 3").await.unwrap_err();
        assert!(matches!(err, SubmitError::NoModelSelected));
    }

    #[tokio::test]
    async fn submission_requires_minimum_stake() {
        let orchestrator = orchestrator(Some(0.0));
        orchestrator.select_model(Some(1));
        let err = orchestrator.predict_vector("1 2 3").await.unwrap_err();
        assert!(matches!(err, SubmitError::InsufficientCredits));
    }

    #[tokio::test]
    async fn batch_admission_fires_before_the_file_is_read() {
        let orchestrator = orchestrator(Some(0.0));
        orchestrator.select_model(Some(1));
        // nonexistent file: the stake check must fail first
        let err = orchestrator
            .predict_batch(&PathBuf::from("missing.csv"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::InsufficientCredits));
    }

    #[tokio::test]
    async fn batch_rejects_non_tabular_input() {
        let orchestrator = orchestrator(Some(5.0));
        orchestrator.select_model(Some(1));
        let err = orchestrator
            .predict_batch(&PathBuf::from("input.xlsx"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::UnsupportedBatchFile));
    }

    #[tokio::test]
    async fn a_second_submission_is_rejected_while_one_is_in_flight() {
        let orchestrator = orchestrator(Some(5.0));
        orchestrator.select_model(Some(1));
        let guard = PhaseGuard::begin(&orchestrator.phase).unwrap();
        guard.advance(Phase::Submitting);
        let err = orchestrator.predict_vector("1 2 3").await.unwrap_err();
        assert!(matches!(err, SubmitError::InFlight));
        drop(guard);
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn unauthenticated_submission_is_rejected_locally() {
        let orchestrator = orchestrator(None);
        orchestrator.select_model(Some(1));
        let err = orchestrator.predict_vector("1 2 3").await.unwrap_err();
        assert!(matches!(err, SubmitError::NotAuthenticated));
    }
}
