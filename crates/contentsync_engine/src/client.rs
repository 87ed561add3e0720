//! Remote request client abstraction.
//!
//! Outbound calls to a peer network go through the `RemoteClient`
//! trait. Implementations own the actual HTTP stack; this crate ships a
//! loopback implementation routing requests to in-process peers, which
//! is also what the tests use.

use crate::error::{SyncError, SyncResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use contentsync_gid::canonicalize_address;
use contentsync_protocol::Envelope;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// HTTP-style request method of a peer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Read.
    Get,
    /// Create or execute.
    Post,
    /// Remove.
    Delete,
}

impl RequestMethod {
    /// Returns the wire string for this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Delete => "DELETE",
        }
    }
}

/// Rolling key for credential obfuscation.
///
/// Obfuscation is reversible on purpose: the secret is an application
/// password that must be presented in clear on outbound Basic auth.
/// This only keeps it from sitting in storage as plain text.
const OBFUSCATION_KEY: &[u8] = b"contentsync";

/// An opaque connection credential: a login plus a
/// reversibly-obfuscated application password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCredential {
    login: String,
    obfuscated: String,
}

impl ConnectionCredential {
    /// Creates a credential from a login and a clear-text secret.
    pub fn new(login: impl Into<String>, secret: &str) -> Self {
        Self {
            login: login.into(),
            obfuscated: obfuscate(secret),
        }
    }

    /// Restores a credential from its stored (obfuscated) form.
    pub fn from_obfuscated(login: impl Into<String>, obfuscated: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            obfuscated: obfuscated.into(),
        }
    }

    /// Returns the login.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// Returns the stored (obfuscated) secret.
    pub fn obfuscated(&self) -> &str {
        &self.obfuscated
    }

    /// Reveals the clear-text secret.
    pub fn reveal(&self) -> SyncResult<String> {
        deobfuscate(&self.obfuscated)
    }

    /// Returns the `Authorization` header value for Basic auth.
    pub fn authorization_header(&self) -> SyncResult<String> {
        let secret = self.reveal()?;
        let pair = format!("{}:{}", self.login, secret);
        Ok(format!("Basic {}", BASE64.encode(pair.as_bytes())))
    }
}

fn obfuscate(secret: &str) -> String {
    let bytes: Vec<u8> = secret
        .bytes()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    BASE64.encode(bytes)
}

fn deobfuscate(obfuscated: &str) -> SyncResult<String> {
    let bytes = BASE64
        .decode(obfuscated)
        .map_err(|e| SyncError::remote_fatal(format!("invalid stored credential: {e}")))?;
    let clear: Vec<u8> = bytes
        .iter()
        .zip(OBFUSCATION_KEY.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect();
    String::from_utf8(clear)
        .map_err(|_| SyncError::remote_fatal("invalid stored credential: not utf-8"))
}

/// Timeouts for outbound peer calls.
///
/// Control calls default to 30 seconds; large content transfers may
/// take up to an hour. Implementations must not hold any local lock
/// while blocked on either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    /// Timeout for control calls (auth checks, map mutations).
    pub control: Duration,
    /// Timeout for content transfers.
    pub transfer: Duration,
}

impl ClientTimeouts {
    /// Sets the control-call timeout.
    pub fn with_control(mut self, control: Duration) -> Self {
        self.control = control;
        self
    }

    /// Sets the transfer timeout.
    pub fn with_transfer(mut self, transfer: Duration) -> Self {
        self.transfer = transfer;
        self
    }
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            control: Duration::from_secs(30),
            transfer: Duration::from_secs(3600),
        }
    }
}

/// One configured peer network.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    /// Canonical address of the peer network.
    pub address: String,
    /// Credential presented on calls to this peer.
    pub credential: ConnectionCredential,
    /// Our own canonical address, sent as the `Origin` header so the
    /// peer can verify a bidirectional connection exists.
    pub origin_address: String,
    /// Call timeouts.
    pub timeouts: ClientTimeouts,
}

impl PeerConnection {
    /// Creates a connection; both addresses are canonicalized.
    pub fn new(
        address: impl AsRef<str>,
        credential: ConnectionCredential,
        origin_address: impl AsRef<str>,
    ) -> Self {
        Self {
            address: canonicalize_address(address.as_ref()),
            credential,
            origin_address: canonicalize_address(origin_address.as_ref()),
            timeouts: ClientTimeouts::default(),
        }
    }
}

/// Registry of configured peer connections, keyed by canonical address.
pub struct PeerRegistry {
    peers: RwLock<BTreeMap<String, PeerConnection>>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            peers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Adds or replaces a peer connection.
    pub fn add(&self, connection: PeerConnection) {
        self.peers
            .write()
            .insert(connection.address.clone(), connection);
    }

    /// Gets the connection for an address (canonicalized before lookup).
    pub fn get(&self, address: &str) -> Option<PeerConnection> {
        self.peers
            .read()
            .get(&canonicalize_address(address))
            .cloned()
    }

    /// Returns every configured peer address.
    pub fn addresses(&self) -> Vec<String> {
        self.peers.read().keys().cloned().collect()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Issues authenticated calls to a peer's synchronization endpoints.
///
/// Implementations send the request over their transport, unwrap the
/// response envelope and return its `responseData`, mapping transport
/// failures and error envelopes to `SyncError::Remote`.
pub trait RemoteClient: Send + Sync {
    /// Sends one request to a peer.
    fn send(
        &self,
        connection: &PeerConnection,
        path: &str,
        body: &Value,
        method: RequestMethod,
    ) -> SyncResult<Value>;
}

/// An inbound peer request, as seen by an endpoint.
#[derive(Debug, Clone)]
pub struct PeerRequest {
    /// Endpoint path, e.g. `posts/1-10/connections`.
    pub path: String,
    /// Request method.
    pub method: RequestMethod,
    /// JSON body (`Value::Null` for bodyless requests).
    pub body: Value,
    /// `Authorization` header value, if present.
    pub authorization: Option<String>,
    /// `Origin` header value: the caller's canonical network address.
    pub origin: Option<String>,
}

/// An in-process peer that can answer requests directly.
///
/// The server crate implements this; the loopback client routes to it.
pub trait PeerEndpoint: Send + Sync {
    /// Handles one request, always producing an envelope.
    fn handle(&self, request: PeerRequest) -> Envelope;
}

/// A remote client that routes calls to registered in-process peers.
///
/// Stands in for the HTTP stack in tests and single-process
/// deployments; unreachable addresses fail like a network timeout
/// would (retryable).
pub struct LoopbackClient {
    endpoints: RwLock<BTreeMap<String, Arc<dyn PeerEndpoint>>>,
}

impl LoopbackClient {
    /// Creates a loopback client with no reachable peers.
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(BTreeMap::new()),
        }
    }

    /// Makes a peer reachable under the given address.
    pub fn register(&self, address: &str, endpoint: Arc<dyn PeerEndpoint>) {
        self.endpoints
            .write()
            .insert(canonicalize_address(address), endpoint);
    }

    /// Removes a peer, simulating an outage.
    pub fn unregister(&self, address: &str) {
        self.endpoints.write().remove(&canonicalize_address(address));
    }
}

impl Default for LoopbackClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteClient for LoopbackClient {
    fn send(
        &self,
        connection: &PeerConnection,
        path: &str,
        body: &Value,
        method: RequestMethod,
    ) -> SyncResult<Value> {
        let endpoint = self
            .endpoints
            .read()
            .get(&connection.address)
            .cloned()
            .ok_or_else(|| {
                SyncError::remote_retryable(format!("peer unreachable: {}", connection.address))
            })?;

        let request = PeerRequest {
            path: path.to_string(),
            method,
            body: body.clone(),
            authorization: Some(connection.credential.authorization_header()?),
            origin: Some(connection.origin_address.clone()),
        };

        endpoint
            .handle(request)
            .into_result()
            .map_err(SyncError::remote_fatal)
    }
}

/// A scripted remote client for tests.
///
/// Responses are served per path prefix; every call is recorded.
pub struct MockRemoteClient {
    responses: RwLock<BTreeMap<String, SyncResult<Value>>>,
    calls: RwLock<Vec<(String, String, Value)>>,
}

impl MockRemoteClient {
    /// Creates a client that fails every call as unreachable.
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(BTreeMap::new()),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Scripts a success response for a path prefix.
    pub fn respond(&self, path_prefix: &str, value: Value) {
        self.responses
            .write()
            .insert(path_prefix.to_string(), Ok(value));
    }

    /// Scripts a failure for a path prefix.
    pub fn fail(&self, path_prefix: &str, retryable: bool) {
        self.responses.write().insert(
            path_prefix.to_string(),
            Err(SyncError::Remote {
                message: format!("scripted failure for {path_prefix}"),
                retryable,
            }),
        );
    }

    /// Returns the recorded calls as `(address, path, body)`.
    pub fn calls(&self) -> Vec<(String, String, Value)> {
        self.calls.read().clone()
    }
}

impl Default for MockRemoteClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteClient for MockRemoteClient {
    fn send(
        &self,
        connection: &PeerConnection,
        path: &str,
        body: &Value,
        _method: RequestMethod,
    ) -> SyncResult<Value> {
        self.calls
            .write()
            .push((connection.address.clone(), path.to_string(), body.clone()));

        let responses = self.responses.read();
        let scripted = responses
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()));
        match scripted {
            Some((_, Ok(value))) => Ok(value.clone()),
            Some((_, Err(SyncError::Remote { message, retryable }))) => Err(SyncError::Remote {
                message: message.clone(),
                retryable: *retryable,
            }),
            Some((_, Err(_))) => Err(SyncError::remote_fatal("scripted failure")),
            None => Err(SyncError::remote_retryable(format!(
                "peer unreachable: {}",
                connection.address
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn credential_obfuscation_roundtrip() {
        let credential = ConnectionCredential::new("alice", "s3cr3t pass");
        assert_ne!(credential.obfuscated(), "s3cr3t pass");
        assert_eq!(credential.reveal().unwrap(), "s3cr3t pass");

        let restored =
            ConnectionCredential::from_obfuscated("alice", credential.obfuscated().to_string());
        assert_eq!(restored.reveal().unwrap(), "s3cr3t pass");
    }

    #[test]
    fn authorization_header_is_basic() {
        let credential = ConnectionCredential::new("alice", "pw");
        let header = credential.authorization_header().unwrap();
        assert!(header.starts_with("Basic "));
        let decoded = BASE64.decode(header.trim_start_matches("Basic ")).unwrap();
        assert_eq!(decoded, b"alice:pw");
    }

    #[test]
    fn peer_registry_canonicalizes() {
        let registry = PeerRegistry::new();
        registry.add(PeerConnection::new(
            "https://www.peer.example/",
            ConnectionCredential::new("a", "b"),
            "one.example",
        ));

        assert!(registry.get("peer.example").is_some());
        assert!(registry.get("http://peer.example/").is_some());
        assert!(registry.get("other.example").is_none());
        assert_eq!(registry.addresses(), vec!["peer.example".to_string()]);
    }

    #[test]
    fn default_timeouts() {
        let timeouts = ClientTimeouts::default();
        assert_eq!(timeouts.control, Duration::from_secs(30));
        assert_eq!(timeouts.transfer, Duration::from_secs(3600));
    }

    #[test]
    fn loopback_unreachable_is_retryable() {
        let client = LoopbackClient::new();
        let connection = PeerConnection::new(
            "peer.example",
            ConnectionCredential::new("a", "b"),
            "one.example",
        );

        let err = client
            .send(&connection, "site_name", &Value::Null, RequestMethod::Get)
            .unwrap_err();
        assert!(err.is_retryable());
    }

    struct EchoEndpoint;

    impl PeerEndpoint for EchoEndpoint {
        fn handle(&self, request: PeerRequest) -> Envelope {
            Envelope::success(
                "echo",
                json!({
                    "path": request.path,
                    "origin": request.origin,
                    "authorized": request.authorization.is_some(),
                }),
            )
        }
    }

    #[test]
    fn loopback_routes_with_headers() {
        let client = LoopbackClient::new();
        client.register("peer.example", Arc::new(EchoEndpoint));

        let connection = PeerConnection::new(
            "https://peer.example",
            ConnectionCredential::new("a", "b"),
            "https://www.one.example/",
        );

        let response = client
            .send(&connection, "site_name", &Value::Null, RequestMethod::Get)
            .unwrap();
        assert_eq!(response["path"], "site_name");
        assert_eq!(response["origin"], "one.example");
        assert_eq!(response["authorized"], true);

        client.unregister("peer.example");
        assert!(client
            .send(&connection, "site_name", &Value::Null, RequestMethod::Get)
            .is_err());
    }

    #[test]
    fn mock_client_scripts_and_records() {
        let client = MockRemoteClient::new();
        client.respond("site_name", json!("Peer Site"));
        client.fail("distribution/", false);

        let connection = PeerConnection::new(
            "peer.example",
            ConnectionCredential::new("a", "b"),
            "one.example",
        );

        assert_eq!(
            client
                .send(&connection, "site_name", &Value::Null, RequestMethod::Get)
                .unwrap(),
            json!("Peer Site")
        );
        assert!(client
            .send(
                &connection,
                "distribution/distribute-item",
                &Value::Null,
                RequestMethod::Post
            )
            .is_err());
        assert_eq!(client.calls().len(), 2);
    }
}
