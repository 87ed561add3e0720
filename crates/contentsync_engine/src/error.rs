//! Error types for the sync engine.

use thiserror::Error;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during export, import or distribution.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The root object of an export does not exist.
    #[error("root object not found: {0}")]
    RootNotFound(u64),

    /// A GID failed to parse where one was required.
    #[error("malformed gid: {0}")]
    MalformedGid(String),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] contentsync_store::StoreError),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while bundling or reading an archive.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip error while bundling or reading an archive.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A reference rule failed to compile.
    #[error("invalid reference rule {name}: {message}")]
    InvalidRule {
        /// Rule name.
        name: String,
        /// Description of the compile failure.
        message: String,
    },

    /// Network or peer error on a remote call.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// No connection is configured for the given network address.
    #[error("not connected to peer: {0}")]
    NotConnected(String),

    /// A distribution destination does not resolve to a node.
    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    /// An import batch had at least one failed unit.
    #[error("import failed: {message}")]
    ImportFailed {
        /// First per-unit error message.
        message: String,
    },
}

impl SyncError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Remote { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::remote_retryable("timeout").is_retryable());
        assert!(!SyncError::remote_fatal("bad credential").is_retryable());
        assert!(!SyncError::RootNotFound(1).is_retryable());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            SyncError::RootNotFound(10).to_string(),
            "root object not found: 10"
        );
        assert_eq!(
            SyncError::NotConnected("peer.example".into()).to_string(),
            "not connected to peer: peer.example"
        );
    }
}
