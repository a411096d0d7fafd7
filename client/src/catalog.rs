use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::{debug, info};
use reqwest::multipart::{Form, Part};
use shared::{CostEstimate, ModelEntry, ModelUpload};
use thiserror::Error;

use crate::MINIMUM_STAKE;
use crate::api::{ApiClient, ApiError};
use crate::auth::SessionManager;

/// Serialized classical-ML artifact formats accepted for upload. Checked
/// client-side as a cheap pre-filter, not a security boundary.
pub const MODEL_ARTIFACT_EXTENSIONS: &[&str] = &["joblib", "pkl"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unsupported model artifact {0:?}: expected .joblib or .pkl")]
    UnsupportedArtifact(String),
    #[error("insufficient credits to publish a model")]
    InsufficientCredits,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("artifact read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Default)]
struct CatalogState {
    active: Vec<ModelEntry>,
    // Soft-deleted entries stay resolvable by id for historical joins.
    removed: HashMap<i64, ModelEntry>,
}

#[derive(Clone)]
pub struct ModelCatalog {
    api: ApiClient,
    session: SessionManager,
    state: Arc<RwLock<CatalogState>>,
}

impl ModelCatalog {
    pub fn new(api: ApiClient, session: SessionManager) -> Self {
        Self {
            api,
            session,
            state: Arc::new(RwLock::new(CatalogState::default())),
        }
    }

    /// Fetches the visible model set and replaces the cache wholesale so
    /// stale soft-delete flags cannot linger.
    pub async fn list(&self) -> Result<Vec<ModelEntry>, CatalogError> {
        let fetched: Vec<ModelEntry> = self.api.get_json("models/").await?;
        debug!("model catalog refreshed: {} entries", fetched.len());
        self.state.write().unwrap().active = fetched.clone();
        Ok(fetched)
    }

    /// The actionable catalog: models selectable for new predictions.
    pub fn models(&self) -> Vec<ModelEntry> {
        self.state
            .read()
            .unwrap()
            .active
            .iter()
            .filter(|model| !model.is_deleted)
            .cloned()
            .collect()
    }

    /// Resolves active and removed entries alike.
    pub fn resolve(&self, model_id: i64) -> Option<ModelEntry> {
        let state = self.state.read().unwrap();
        state
            .active
            .iter()
            .find(|model| model.id == model_id)
            .cloned()
            .or_else(|| state.removed.get(&model_id).cloned())
    }

    /// Active plus soft-deleted entries, for joining against prediction
    /// history.
    pub fn entries_for_join(&self) -> Vec<ModelEntry> {
        let state = self.state.read().unwrap();
        let mut entries = state.active.clone();
        entries.extend(state.removed.values().cloned());
        entries
    }

    pub fn check_artifact(path: &Path) -> Result<(), CatalogError> {
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                MODEL_ARTIFACT_EXTENSIONS
                    .iter()
                    .any(|allowed| ext.eq_ignore_ascii_case(allowed))
            })
            .unwrap_or(false);
        if supported {
            Ok(())
        } else {
            Err(CatalogError::UnsupportedArtifact(path.display().to_string()))
        }
    }

    /// Advisory only: the authoritative cost is fixed at registration time.
    pub async fn estimate_cost(&self, artifact: &Path) -> Result<f64, CatalogError> {
        Self::check_artifact(artifact)?;
        let form = Form::new().part("model_file", Self::artifact_part(artifact).await?);
        let estimate: CostEstimate = self.api.post_multipart("models/estimate-cost", form).await?;
        Ok(estimate.cost_per_prediction)
    }

    pub async fn register(
        &self,
        upload: &ModelUpload,
        artifact: &Path,
    ) -> Result<ModelEntry, CatalogError> {
        let account = self.session.account().ok_or(CatalogError::NotAuthenticated)?;
        // Flat minimum stake, independent of the eventual per-prediction
        // cost, which is not known until registration completes.
        if account.credits < MINIMUM_STAKE {
            return Err(CatalogError::InsufficientCredits);
        }
        Self::check_artifact(artifact)?;
        let form = Form::new()
            .text("name", upload.name.clone())
            .text("description", upload.description.clone())
            .text("version", upload.version.clone())
            .text("model_type", upload.model_type.to_string())
            .part("model_file", Self::artifact_part(artifact).await?);
        let entry: ModelEntry = self.api.post_multipart("models/", form).await?;
        info!("registered model {} ({})", entry.name, entry.id);
        self.list().await?;
        Ok(entry)
    }

    /// Soft delete: the entry leaves the actionable cache but moves to the
    /// removed side table so historical joins keep resolving it.
    pub async fn remove(&self, model_id: i64) -> Result<(), CatalogError> {
        self.api.delete(&format!("models/{model_id}")).await?;
        let mut state = self.state.write().unwrap();
        if let Some(index) = state.active.iter().position(|model| model.id == model_id) {
            let mut entry = state.active.remove(index);
            entry.is_deleted = true;
            state.removed.insert(model_id, entry);
        }
        info!("model {model_id} removed from catalog");
        Ok(())
    }

    async fn artifact_part(artifact: &Path) -> Result<Part, CatalogError> {
        let bytes = tokio::fs::read(artifact).await?;
        let file_name = artifact
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("model")
            .to_string();
        Ok(Part::bytes(bytes).file_name(file_name))
    }

    #[cfg(test)]
    pub(crate) fn seed(&self, active: Vec<ModelEntry>, removed: Vec<ModelEntry>) {
        let mut state = self.state.write().unwrap();
        state.active = active;
        state.removed = removed.into_iter().map(|entry| (entry.id, entry)).collect();
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use shared::{Account, ModelType};

    use super::*;
    use crate::auth::MemoryStore;

    fn account(credits: f64) -> Account {
        Account {
            id: 1,
            email: "owner@example.com".into(),
            full_name: "Owner".into(),
            credits,
            is_active: true,
        }
    }

    fn model(id: i64, name: &str, deleted: bool) -> ModelEntry {
        ModelEntry {
            id,
            name: name.into(),
            version: "1.0".into(),
            description: String::new(),
            model_type: Some(ModelType::Classification),
            cost_per_prediction: 0.5,
            owner: account(10.0),
            is_deleted: deleted,
            is_active: !deleted,
            created_at: None,
        }
    }

    fn catalog_with_credits(credits: f64) -> ModelCatalog {
        let api = ApiClient::new("http://127.0.0.1:9/api/v1/").unwrap();
        let session = SessionManager::new(api.clone(), Arc::new(MemoryStore::default()));
        session.replace_snapshot(account(credits));
        ModelCatalog::new(api, session)
    }

    #[test]
    fn artifact_prefilter_accepts_known_extensions_only() {
        assert!(ModelCatalog::check_artifact(Path::new("model.pkl")).is_ok());
        assert!(ModelCatalog::check_artifact(Path::new("model.joblib")).is_ok());
        assert!(ModelCatalog::check_artifact(Path::new("MODEL.PKL")).is_ok());
        assert!(matches!(
            ModelCatalog::check_artifact(Path::new("model.onnx")),
            Err(CatalogError::UnsupportedArtifact(_))
        ));
        assert!(matches!(
            ModelCatalog::check_artifact(Path::new("model")),
            Err(CatalogError::UnsupportedArtifact(_))
        ));
    }

    #[tokio::test]
    async fn register_rejects_insufficient_stake_before_touching_the_artifact() {
        let catalog = catalog_with_credits(0.0);
        let upload = ModelUpload {
            name: "m".into(),
            version: "1".into(),
            description: String::new(),
            model_type: ModelType::Regression,
        };
        // The path does not exist; the admission gate must fire first.
        let missing = PathBuf::from("does-not-exist.pkl");
        let err = catalog.register(&upload, &missing).await.unwrap_err();
        assert!(matches!(err, CatalogError::InsufficientCredits));
    }

    #[tokio::test]
    async fn estimate_rejects_unsupported_artifact_without_reading_it() {
        let catalog = catalog_with_credits(5.0);
        let err = catalog
            .estimate_cost(Path::new("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedArtifact(_)));
    }

    #[test]
    fn removed_entries_stay_resolvable_but_leave_the_actionable_set() {
        let catalog = catalog_with_credits(5.0);
        catalog.seed(vec![model(1, "A", false)], vec![model(2, "B", true)]);
        assert_eq!(catalog.models().len(), 1);
        assert_eq!(catalog.resolve(2).map(|m| m.name), Some("B".to_string()));
        assert_eq!(catalog.entries_for_join().len(), 2);
        assert_eq!(catalog.resolve(99), None);
    }
}
