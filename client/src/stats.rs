use std::collections::HashMap;

use serde::Serialize;
use shared::{ModelEntry, ModelType, PredictionRecord};
use thiserror::Error;

use crate::api::{ApiClient, ApiError};
use crate::catalog::{CatalogError, ModelCatalog};

pub const RECENT_LIMIT: usize = 5;
pub const DELETED_SUFFIX: &str = " (deleted)";
pub const MISSING_MODEL_LABEL: &str = "deleted model";

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelUsage {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeUsage {
    pub model_type: ModelType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentPrediction {
    pub model_name: String,
    pub record: PredictionRecord,
}

/// Derived dashboard statistics; recomputed from scratch on every refresh,
/// never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_count: usize,
    pub total_cost: f64,
    pub by_model: Vec<ModelUsage>,
    pub by_type: Vec<TypeUsage>,
    pub recent: Vec<RecentPrediction>,
}

/// Joins the prediction history against the catalog (active and
/// soft-deleted entries alike). Pure: same inputs, identical output.
/// Bucket ordering follows first encounter in the history scan so chart
/// legends stay deterministic across refreshes.
pub fn aggregate(history: &[PredictionRecord], catalog: &[ModelEntry]) -> UsageStats {
    // One id-indexed map per pass instead of a re-scan per prediction.
    let by_id: HashMap<i64, &ModelEntry> = catalog.iter().map(|entry| (entry.id, entry)).collect();

    let mut by_model: Vec<ModelUsage> = Vec::new();
    let mut model_index: HashMap<i64, usize> = HashMap::new();
    let mut by_type: Vec<TypeUsage> = Vec::new();
    let mut type_index: HashMap<ModelType, usize> = HashMap::new();
    let mut total_cost = 0.0;

    for record in history {
        total_cost += record.cost;
        let Some(model) = by_id.get(&record.model_id) else {
            // Hard-absent reference: counts toward the totals only; there is
            // no entry to attribute it to.
            continue;
        };
        match model_index.get(&model.id) {
            Some(&slot) => by_model[slot].count += 1,
            None => {
                model_index.insert(model.id, by_model.len());
                by_model.push(ModelUsage { name: display_name(model), count: 1 });
            }
        }
        // Soft-deleted entries still carry their historical type.
        if let Some(model_type) = model.model_type {
            match type_index.get(&model_type) {
                Some(&slot) => by_type[slot].count += 1,
                None => {
                    type_index.insert(model_type, by_type.len());
                    by_type.push(TypeUsage { model_type, count: 1 });
                }
            }
        }
    }

    let recent = history
        .iter()
        .take(RECENT_LIMIT)
        .map(|record| RecentPrediction {
            model_name: by_id
                .get(&record.model_id)
                .map(|model| display_name(model))
                .unwrap_or_else(|| MISSING_MODEL_LABEL.to_string()),
            record: record.clone(),
        })
        .collect();

    UsageStats {
        total_count: history.len(),
        total_cost,
        by_model,
        by_type,
        recent,
    }
}

fn display_name(model: &ModelEntry) -> String {
    if model.is_deleted {
        format!("{}{}", model.name, DELETED_SUFFIX)
    } else {
        model.name.clone()
    }
}

/// Refreshes the two aggregation inputs together and recomputes the stats.
#[derive(Clone)]
pub struct DashboardService {
    api: ApiClient,
    catalog: ModelCatalog,
}

impl DashboardService {
    pub fn new(api: ApiClient, catalog: ModelCatalog) -> Self {
        Self { api, catalog }
    }

    pub async fn refresh(&self) -> Result<UsageStats, StatsError> {
        // Both fetches are independent and issued concurrently; aggregation
        // must not run on a partial pair.
        let (history, _) = futures::try_join!(
            async {
                self.api
                    .get_json::<Vec<PredictionRecord>>("predictions/")
                    .await
                    .map_err(StatsError::from)
            },
            async { self.catalog.list().await.map_err(StatsError::from) },
        )?;
        Ok(aggregate(&history, &self.catalog.entries_for_join()))
    }
}
