//! Error types for SheetQL.
//!
//! Defines the main error enum used throughout the question pipeline.

use serde::Serialize;
use thiserror::Error;

/// Main error type for SheetQL operations.
#[derive(Error, Debug)]
pub enum SheetqlError {
    /// The candidate intent references an unknown table/column or has a malformed shape.
    #[error("Validation error at `{field}`: {message}")]
    Validation { field: String, message: String },

    /// Compiled text matched the mutating-keyword denylist or is not a read-only query.
    #[error("Forbidden operation: {0}")]
    ForbiddenOperation(String),

    /// The language model response is not a parseable JSON object.
    #[error("Translation error: {0}")]
    Translation(String),

    /// Engine-level failure while running a query (includes timeouts).
    #[error("Execution error: {0}")]
    Execution(String),

    /// Failure while loading a source file into the store.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    /// LLM transport or provider errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, bad URL, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SheetqlError {
    /// Creates a validation error for the given field path.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a forbidden operation error with the given message.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::ForbiddenOperation(msg.into())
    }

    /// Creates a translation error with the given message.
    pub fn translation(msg: impl Into<String>) -> Self {
        Self::Translation(msg.into())
    }

    /// Creates an execution error with the given message.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Creates an ingestion error with the given message.
    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Validation Error",
            Self::ForbiddenOperation(_) => "Forbidden Operation",
            Self::Translation(_) => "Translation Error",
            Self::Execution(_) => "Execution Error",
            Self::Ingestion(_) => "Ingestion Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the offending field path for validation errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns true if the caller may fix the input (or re-ask) and try again.
    ///
    /// A forbidden operation always points at a compiler defect, so it is never
    /// worth repeating.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Translation(_) | Self::Llm(_)
        )
    }

    /// Converts the error into the `{error: message}` shape returned to callers.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.to_string(),
        }
    }
}

impl From<rusqlite::Error> for SheetqlError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Execution(e.to_string())
    }
}

/// Serializable error document surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Result type alias using SheetqlError.
pub type Result<T> = std::result::Result<T, SheetqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = SheetqlError::validation("filters[0].column", "unknown column 'montant'");
        assert_eq!(
            err.to_string(),
            "Validation error at `filters[0].column`: unknown column 'montant'"
        );
        assert_eq!(err.category(), "Validation Error");
        assert_eq!(err.field(), Some("filters[0].column"));
    }

    #[test]
    fn test_error_display_forbidden() {
        let err = SheetqlError::forbidden("keyword 'DROP' is not allowed");
        assert_eq!(
            err.to_string(),
            "Forbidden operation: keyword 'DROP' is not allowed"
        );
        assert_eq!(err.category(), "Forbidden Operation");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_display_translation() {
        let err = SheetqlError::translation("response is not JSON");
        assert_eq!(err.to_string(), "Translation error: response is not JSON");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_error_display_execution() {
        let err = SheetqlError::execution("Query timed out after 30 seconds");
        assert_eq!(
            err.to_string(),
            "Execution error: Query timed out after 30 seconds"
        );
        assert!(!err.is_recoverable());
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_error_body_shape() {
        let err = SheetqlError::config("missing field 'model'");
        let json = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "Configuration error: missing field 'model'"})
        );
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SheetqlError>();
    }
}
