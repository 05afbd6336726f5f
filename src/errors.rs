/// Domain-specific error types for secrag
///
/// Only input-contract violations (`Validation`) are expected to reach the caller of a
/// query. Store, embedding and reranking failures are absorbed per sub-search and show
/// up in the search report instead.

#[derive(Debug, thiserror::Error)]
pub enum SecragError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl SecragError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use secrag::errors::SecragError;
    /// let err = SecragError::validation("top_k", "top_k must be greater than zero");
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        SecragError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_helper_keeps_field() {
        let err = SecragError::validation("query", "Query text cannot be empty");
        match &err {
            SecragError::Validation { message, field } => {
                assert_eq!(message, "Query text cannot be empty");
                assert_eq!(field.as_deref(), Some("query"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        assert_eq!(err.to_string(), "Validation error: Query text cannot be empty");
    }

    #[test]
    fn test_storage_message() {
        let err = SecragError::Storage("Vector query failed: timeout".to_string());
        assert_eq!(err.to_string(), "Storage error: Vector query failed: timeout");
    }
}
