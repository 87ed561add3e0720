//! Credential verification and the mutual-connection ledger.

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use contentsync_engine::ConnectionCredential;
use contentsync_gid::canonicalize_address;
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Credentials this server accepts on inbound calls.
pub struct CredentialStore {
    credentials: RwLock<Vec<ConnectionCredential>>,
}

impl CredentialStore {
    /// Creates an empty store; every call will be rejected.
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(Vec::new()),
        }
    }

    /// Accepts a credential.
    pub fn add(&self, credential: ConnectionCredential) {
        self.credentials.write().push(credential);
    }

    /// Verifies a Basic `Authorization` header value.
    pub fn verify(&self, header: Option<&str>) -> ServerResult<()> {
        let header =
            header.ok_or_else(|| ServerError::NotAuthorized("missing credential".into()))?;
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or_else(|| ServerError::NotAuthorized("unsupported auth scheme".into()))?;
        let decoded = BASE64
            .decode(encoded)
            .map_err(|_| ServerError::NotAuthorized("undecodable credential".into()))?;
        let pair = String::from_utf8(decoded)
            .map_err(|_| ServerError::NotAuthorized("undecodable credential".into()))?;
        let (login, secret) = pair
            .split_once(':')
            .ok_or_else(|| ServerError::NotAuthorized("malformed credential".into()))?;

        let accepted = self.credentials.read().iter().any(|credential| {
            credential.login() == login
                && credential
                    .reveal()
                    .map(|revealed| revealed == secret)
                    .unwrap_or(false)
        });
        if accepted {
            Ok(())
        } else {
            Err(ServerError::NotAuthorized("credential rejected".into()))
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The bidirectional-connection ledger.
///
/// A caller is "connected" once both sides have run `add_connection`;
/// everything beyond the handshake endpoints requires the caller's
/// `Origin` address to be present here.
pub struct ConnectionLedger {
    connected: RwLock<BTreeSet<String>>,
}

impl ConnectionLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            connected: RwLock::new(BTreeSet::new()),
        }
    }

    /// Records a connection with the given network address.
    pub fn add(&self, address: &str) -> bool {
        self.connected
            .write()
            .insert(canonicalize_address(address))
    }

    /// Returns true if the address has an established connection.
    pub fn contains(&self, address: &str) -> bool {
        self.connected
            .read()
            .contains(&canonicalize_address(address))
    }

    /// Verifies a caller's `Origin` header.
    pub fn verify(&self, origin: Option<&str>) -> ServerResult<()> {
        let origin = origin
            .ok_or_else(|| ServerError::NotConnected("missing origin header".into()))?;
        if self.contains(origin) {
            Ok(())
        } else {
            Err(ServerError::NotConnected(format!(
                "no connection established with {origin}"
            )))
        }
    }

    /// Lists the connected addresses.
    pub fn addresses(&self) -> Vec<String> {
        self.connected.read().iter().cloned().collect()
    }
}

impl Default for ConnectionLedger {
    fn default() -> Self {
        Self::new()
    }
}
