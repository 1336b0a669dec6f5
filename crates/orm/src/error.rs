//! Error types for the ORM system
//!
//! Covers record persistence, relation bindings and the record stores.

use crate::event_error::EventError;
use std::fmt;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Error types for ORM operations
#[derive(Debug, Clone)]
pub enum ModelError {
    /// Database connection or query error
    Database(String),
    /// Record not found in database
    NotFound(String),
    /// Model validation failed
    Validation(String),
    /// Primary key is missing or invalid
    MissingPrimaryKey,
    /// Relation misconfiguration or failed relation operation
    Relationship(String),
    /// Serialization/deserialization error
    Serialization(String),
    /// Schema error (unknown model, bad table definition)
    Schema(String),
    /// Query building error
    Query(String),
    /// Observer or listener failure
    Event(String),
    /// Configuration error
    Configuration(String),
    /// Invalid input from the caller
    InvalidArgument(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Database(msg) => write!(f, "Database error: {}", msg),
            ModelError::NotFound(table) => write!(f, "Record not found in table '{}'", table),
            ModelError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ModelError::MissingPrimaryKey => write!(f, "Primary key is missing or invalid"),
            ModelError::Relationship(msg) => write!(f, "Relationship error: {}", msg),
            ModelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ModelError::Schema(msg) => write!(f, "Schema error: {}", msg),
            ModelError::Query(msg) => write!(f, "Query error: {}", msg),
            ModelError::Event(msg) => write!(f, "Event error: {}", msg),
            ModelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ModelError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ModelError::NotFound("row".to_string()),
            other => ModelError::Database(other.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<EventError> for ModelError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Validation { .. } => ModelError::Validation(err.to_string()),
            EventError::Database { message } => ModelError::Database(message),
            other => ModelError::Event(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            ModelError::NotFound("posts".to_string()).to_string(),
            "Record not found in table 'posts'"
        );
        assert_eq!(
            ModelError::InvalidArgument("bad order".to_string()).to_string(),
            "Invalid argument: bad order"
        );
        assert_eq!(
            ModelError::MissingPrimaryKey.to_string(),
            "Primary key is missing or invalid"
        );
    }

    #[test]
    fn test_event_error_conversion() {
        let err: ModelError = EventError::observer("boom").into();
        assert!(matches!(err, ModelError::Event(ref msg) if msg.contains("boom")));

        let err: ModelError = EventError::validation("missing title").into();
        assert!(matches!(err, ModelError::Validation(ref msg) if msg.contains("missing title")));
    }

    #[test]
    fn test_serde_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: ModelError = parse.unwrap_err().into();
        assert!(matches!(err, ModelError::Serialization(_)));
    }
}
