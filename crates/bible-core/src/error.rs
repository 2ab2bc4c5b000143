//! Error types for the bible reader.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using BibleError.
pub type Result<T> = std::result::Result<T, BibleError>;

/// A single field-level validation failure on the write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the offending field.
    pub field: String,

    /// Human readable message.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors that can occur in the bible reader.
#[derive(Error, Debug)]
pub enum BibleError {
    /// The collection has no index with this name.
    #[error("Index {index} does not exist on {store}")]
    IndexNotFound { store: String, index: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A record failed field validation or could not be decoded.
    #[error("Invalid record in {store}: {reason}")]
    InvalidRecord { store: String, reason: String },

    /// Local database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Remote query layer error.
    #[error("Remote error: {message}")]
    Remote { message: String },

    /// A remote request exceeded its time bound.
    #[error("Timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Sync error.
    #[error("Sync error: {message}")]
    Sync { message: String },

    /// Another sync run holds the single-flight lock.
    #[error("Sync already in progress")]
    SyncInProgress,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BibleError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an invalid record error.
    pub fn invalid_record(store: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            store: store.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create a remote error.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
        }
    }

    /// Create a sync error.
    pub fn sync(message: impl Into<String>) -> Self {
        Self::Sync {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::Remote { .. }
                | Self::Database { .. }
                | Self::Sync { .. }
                | Self::SyncInProgress
                | Self::Io(_)
        )
    }

    /// Stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::InvalidRecord { .. } => "INVALID_RECORD",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Remote { .. } => "REMOTE_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Sync { .. } => "SYNC_ERROR",
            Self::SyncInProgress => "SYNC_IN_PROGRESS",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BibleError::IndexNotFound {
            store: "verses".to_string(),
            index: "by_verse".to_string(),
        };
        assert!(err.to_string().contains("by_verse"));
    }

    #[test]
    fn test_field_error_display() {
        let err = FieldError::new("author", "required");
        assert_eq!(err.to_string(), "author: required");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(BibleError::database("x").error_code(), "DATABASE_ERROR");
        assert_eq!(BibleError::SyncInProgress.error_code(), "SYNC_IN_PROGRESS");
        assert!(BibleError::Timeout { millis: 10 }.is_retryable());
        assert!(!BibleError::invalid_argument("x").is_retryable());
    }
}
