use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("enter at least one feature value")]
    Empty,
    #[error("value {0:?} is not a number")]
    NotANumber(String),
}

/// Splits free text on commas and whitespace and converts every token to a
/// number. All-or-nothing: one bad token rejects the whole vector, so a
/// partial vector is never submitted.
pub fn parse_feature_vector(raw: &str) -> Result<Vec<f64>, ParseError> {
    let mut values = Vec::new();
    for token in raw.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.parse::<f64>() {
            // NaN and infinities are parseable but are not feature values
            Ok(value) if value.is_finite() => values.push(value),
            _ => return Err(ParseError::NotANumber(token.to_string())),
        }
    }
    if values.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(values)
}
