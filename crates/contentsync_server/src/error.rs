//! Error types for the server crate.

use contentsync_protocol::{codes, Envelope};
use thiserror::Error;

/// Result type for handler operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors a handler can produce.
///
/// Every variant maps onto an envelope with a machine code and an
/// HTTP-style status embedded in the body.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or invalid credential.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No mutual connection established with the caller.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// The request is malformed or missing required fields.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The addressed resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Engine failure while serving the request.
    #[error("engine error: {0}")]
    Engine(#[from] contentsync_engine::SyncError),

    /// Store failure while serving the request.
    #[error("store error: {0}")]
    Store(#[from] contentsync_store::StoreError),

    /// Body (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServerError {
    /// HTTP-style status embedded in the envelope body.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::NotAuthorized(_) => 401,
            ServerError::NotConnected(_) => 403,
            ServerError::InvalidRequest(_) | ServerError::Serialization(_) => 400,
            ServerError::NotFound(_) => 404,
            ServerError::Engine(_) | ServerError::Store(_) => 500,
        }
    }

    /// Machine code for the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::NotAuthorized(_) => codes::NOT_AUTHORIZED,
            ServerError::NotConnected(_) => codes::NOT_CONNECTED,
            _ => codes::ERROR,
        }
    }

    /// Wraps the error into a response envelope.
    pub fn into_envelope(self) -> Envelope {
        Envelope::error_with_code(self.to_string(), self.code(), self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_code_mapping() {
        assert_eq!(ServerError::NotAuthorized("x".into()).status(), 401);
        assert_eq!(
            ServerError::NotAuthorized("x".into()).code(),
            "rest_not_authorized"
        );
        assert_eq!(ServerError::NotConnected("x".into()).status(), 403);
        assert_eq!(
            ServerError::NotConnected("x".into()).code(),
            "rest_not_connected"
        );
        assert_eq!(ServerError::InvalidRequest("x".into()).status(), 400);
        assert_eq!(ServerError::NotFound("x".into()).status(), 404);
    }

    #[test]
    fn envelope_shape() {
        let envelope = ServerError::NotConnected("peer.example".into()).into_envelope();
        assert!(!envelope.is_success());
        assert_eq!(envelope.code, "rest_not_connected");
        assert_eq!(envelope.data.status, 403);
    }
}
