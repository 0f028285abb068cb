use thiserror::Error;

/// The transport succeeded but the expected keyword is missing from the body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Keyword \"{keyword}\" not found in response body")]
pub struct ContentValidationError {
    pub keyword: String,
}

/// Case-insensitive substring check of `keyword` against `body`.
pub fn validate_content(body: &str, keyword: &str) -> Result<(), ContentValidationError> {
    if body.to_lowercase().contains(&keyword.to_lowercase()) {
        Ok(())
    } else {
        Err(ContentValidationError { keyword: keyword.to_string() })
    }
}
