//! Error types for the store crate.

use crate::types::NodeId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Absent objects are not errors: lookups return `Ok(None)` and callers
/// must check.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced node does not exist on this network.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// An asset file referenced by a content object is missing.
    #[error("missing asset file: {path}")]
    MissingAsset {
        /// Uploads-relative path of the missing file.
        path: String,
    },

    /// A content object failed validation before a write.
    #[error("invalid content object: {message}")]
    InvalidObject {
        /// Description of the validation failure.
        message: String,
    },

    /// Serialization of a meta value or fixture failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying persistence failure.
    #[error("persistence error: {message}")]
    Persistence {
        /// Description of the persistence failure.
        message: String,
    },
}

impl StoreError {
    /// Creates a persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Creates an invalid-object error.
    pub fn invalid_object(message: impl Into<String>) -> Self {
        Self::InvalidObject {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::UnknownNode(NodeId::new(9));
        assert_eq!(err.to_string(), "unknown node: node:9");

        let err = StoreError::MissingAsset {
            path: "2024/01/a.png".into(),
        };
        assert!(err.to_string().contains("2024/01/a.png"));
    }
}
