use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub credits: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ModelType {
    Classification,
    Regression,
}

// Custom deserializer for model types that might come as unrecognized strings;
// a bad type on one entry must not fail the whole catalog fetch.
fn deserialize_lenient_type<'de, D>(deserializer: D) -> Result<Option<ModelType>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s.parse::<ModelType>().ok()),
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_lenient_type")]
    pub model_type: Option<ModelType>,
    pub cost_per_prediction: f64,
    pub owner: Account,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: i64,
    pub model_id: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub input_data: Option<Vec<f64>>,
    #[serde(default)]
    pub input_file_path: Option<String>,
    #[serde(default)]
    pub prediction_result: Value,
    #[serde(default)]
    pub result_file_path: Option<String>,
}

/// Where a prediction's input came from. File-backed submissions carry a
/// server-side path instead of the inline vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputSource<'a> {
    Inline(&'a [f64]),
    File(&'a str),
    Missing,
}

/// Where a prediction's result lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResultSource<'a> {
    Inline(&'a Value),
    File(&'a str),
}

impl PredictionRecord {
    pub fn input_source(&self) -> InputSource<'_> {
        if let Some(path) = self.input_file_path.as_deref() {
            InputSource::File(path)
        } else if let Some(values) = self.input_data.as_deref() {
            InputSource::Inline(values)
        } else {
            InputSource::Missing
        }
    }

    pub fn result_source(&self) -> ResultSource<'_> {
        match self.result_file_path.as_deref() {
            Some(path) => ResultSource::File(path),
            None => ResultSource::Inline(&self.prediction_result),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CreditTopUp {
    pub amount: f64,
}

/// Partial profile update; only changed fields are serialized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.email.is_none() && self.password.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub input_data: Vec<f64>,
}

/// Metadata fields of a model registration; the artifact travels alongside
/// as a multipart file part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUpload {
    pub name: String,
    pub version: String,
    pub description: String,
    pub model_type: ModelType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CostEstimate {
    pub cost_per_prediction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub file_path: String,
    pub predictions: Vec<f64>,
}

impl BatchResult {
    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    /// Last path segment, usable with the download endpoint.
    pub fn file_name(&self) -> &str {
        self.file_path.rsplit('/').next().unwrap_or(&self.file_path)
    }
}

fn default_true() -> bool {
    true
}
