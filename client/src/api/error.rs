use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("URL parsing failed: {0}")]
    Url(#[from] url::ParseError),
    #[error("{message}")]
    Status { status: u16, message: String },
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The collaborator reports the target resource as gone. Detected from
    /// the status code, not the human-readable message text.
    pub fn is_gone(&self) -> bool {
        matches!(self, ApiError::Status { status: 404 | 410, .. })
    }
}

/// Turns a non-success body into a single user-facing message. Preference
/// order: structured per-field errors, then the server `detail` field, then
/// a key-by-key listing, then the raw body.
pub(crate) fn decode_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = message_from_value(&value) {
            return message;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("request failed with status {status}")
    } else {
        trimmed.to_string()
    }
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => field_errors(items),
        Value::Object(map) => match map.get("detail") {
            Some(Value::String(detail)) => Some(detail.clone()),
            Some(Value::Array(items)) => field_errors(items),
            _ => {
                let lines: Vec<String> = map
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key, display_value(value)))
                    .collect();
                if lines.is_empty() { None } else { Some(lines.join("\n")) }
            }
        },
        _ => None,
    }
}

// Validation errors arrive as [{loc: [...], msg: ...}, ...]; flatten each
// into a "field.path: message" line.
fn field_errors(items: &[Value]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let lines: Vec<String> = items
        .iter()
        .map(|item| {
            let loc = item.get("loc").and_then(Value::as_array).map(|parts| {
                parts
                    .iter()
                    .map(display_value)
                    .collect::<Vec<_>>()
                    .join(".")
            });
            let msg = item.get("msg").and_then(Value::as_str);
            match (loc, msg) {
                (Some(loc), Some(msg)) => format!("{loc}: {msg}"),
                (None, Some(msg)) => msg.to_string(),
                _ => display_value(item),
            }
        })
        .collect();
    Some(lines.join("\n"))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_detail_field() {
        let message = decode_error_message(400, r#"{"detail": "Insufficient credits"}"#);
        assert_eq!(message, "Insufficient credits");
    }

    #[test]
    fn flattens_field_errors_into_lines() {
        let body = r#"[
            {"loc": ["body", "model_id"], "msg": "field required"},
            {"loc": ["body", "file"], "msg": "invalid file"}
        ]"#;
        let message = decode_error_message(422, body);
        assert_eq!(message, "body.model_id: field required\nbody.file: invalid file");
    }

    #[test]
    fn flattens_detail_array() {
        let body = r#"{"detail": [{"loc": ["body", "amount"], "msg": "must be positive"}]}"#;
        assert_eq!(decode_error_message(422, body), "body.amount: must be positive");
    }

    #[test]
    fn lists_plain_object_fields() {
        let message = decode_error_message(400, r#"{"file": "too large"}"#);
        assert_eq!(message, "file: too large");
    }

    #[test]
    fn falls_back_to_raw_body_then_status() {
        assert_eq!(decode_error_message(502, "bad gateway"), "bad gateway");
        assert_eq!(decode_error_message(502, ""), "request failed with status 502");
    }

    #[test]
    fn gone_detection_is_structural() {
        let gone = ApiError::Status { status: 404, message: "missing".into() };
        let denied = ApiError::Status { status: 400, message: "missing".into() };
        assert!(gone.is_gone());
        assert!(!denied.is_gone());
    }
}
