//! The wire response envelope.
//!
//! Every peer endpoint wraps its payload in this envelope. The inner
//! `data.status` is authoritative for success/failure even when the
//! outer HTTP status is 200 (historical compatibility).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Machine-distinguishable envelope codes.
pub mod codes {
    /// The request succeeded.
    pub const SUCCESS: &str = "success_code";
    /// The request failed.
    pub const ERROR: &str = "error_code";
    /// Missing or invalid credential.
    pub const NOT_AUTHORIZED: &str = "rest_not_authorized";
    /// No mutual connection is established with the caller.
    pub const NOT_CONNECTED: &str = "rest_not_connected";
}

/// A peer endpoint response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Human-readable message.
    pub message: String,
    /// Machine code, `success_code` or an error code.
    pub code: String,
    /// Payload wrapper.
    pub data: EnvelopeData,
}

/// The payload wrapper of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeData {
    /// HTTP-style status embedded in the body; authoritative.
    pub status: u16,
    /// The actual response payload.
    #[serde(rename = "responseData")]
    pub response_data: Value,
}

impl Envelope {
    /// Creates a success envelope with status 200.
    pub fn success(message: impl Into<String>, response_data: Value) -> Self {
        Self {
            message: message.into(),
            code: codes::SUCCESS.into(),
            data: EnvelopeData {
                status: 200,
                response_data,
            },
        }
    }

    /// Creates an error envelope with the generic error code.
    pub fn error(message: impl Into<String>, status: u16) -> Self {
        Self::error_with_code(message, codes::ERROR, status)
    }

    /// Creates an error envelope with a specific machine code.
    pub fn error_with_code(message: impl Into<String>, code: &str, status: u16) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            data: EnvelopeData {
                status,
                response_data: Value::Null,
            },
        }
    }

    /// Returns true if the envelope reports success.
    pub fn is_success(&self) -> bool {
        self.code == codes::SUCCESS && self.data.status < 400
    }

    /// Consumes the envelope, yielding the payload on success and the
    /// message on failure.
    pub fn into_result(self) -> Result<Value, String> {
        if self.is_success() {
            Ok(self.data.response_data)
        } else {
            Err(self.message)
        }
    }
}
