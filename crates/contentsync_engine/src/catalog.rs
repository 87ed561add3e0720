//! Cached views of remote catalogs.
//!
//! Browsing a peer's content does not need read-after-write
//! consistency, so listings and single objects are served from a
//! time-boxed cache: roughly ten minutes for one object, an hour for a
//! listing. Callers must tolerate staleness within that window.

use crate::client::{PeerRegistry, RemoteClient, RequestMethod};
use crate::error::{SyncError, SyncResult};
use contentsync_protocol::PostSummary;
use contentsync_store::{Cache, TtlCache, REMOTE_LISTING_TTL, REMOTE_OBJECT_TTL};
use serde_json::Value;
use std::sync::Arc;

/// Cached remote content lookups.
pub struct RemoteCatalog {
    client: Arc<dyn RemoteClient>,
    peers: Arc<PeerRegistry>,
    cache: TtlCache,
}

impl RemoteCatalog {
    /// Creates a catalog over the given client and peer registry.
    pub fn new(client: Arc<dyn RemoteClient>, peers: Arc<PeerRegistry>) -> Self {
        Self {
            client,
            peers,
            cache: TtlCache::new(REMOTE_OBJECT_TTL),
        }
    }

    /// Lists a peer's posts, cached for up to an hour.
    pub fn posts(&self, address: &str) -> SyncResult<Vec<PostSummary>> {
        let key = format!("posts:{address}");
        if let Some(cached) = self.cache.get(&key) {
            return Ok(serde_json::from_value(cached)?);
        }

        let peer = self
            .peers
            .get(address)
            .ok_or_else(|| SyncError::NotConnected(address.to_string()))?;
        let value = self
            .client
            .send(&peer, "posts", &Value::Null, RequestMethod::Get)?;
        let listing: Vec<PostSummary> = serde_json::from_value(value.clone())?;
        self.cache.set(&key, value, Some(REMOTE_LISTING_TTL));
        Ok(listing)
    }

    /// Fetches one remote post, cached for up to ten minutes.
    pub fn post(&self, address: &str, id: u64) -> SyncResult<Value> {
        let key = format!("post:{address}:{id}");
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }

        let peer = self
            .peers
            .get(address)
            .ok_or_else(|| SyncError::NotConnected(address.to_string()))?;
        let value = self.client.send(
            &peer,
            &format!("posts/{id}"),
            &Value::Null,
            RequestMethod::Get,
        )?;
        self.cache.set(&key, value.clone(), Some(REMOTE_OBJECT_TTL));
        Ok(value)
    }

    /// Drops the cached listing of a peer.
    pub fn invalidate_listing(&self, address: &str) {
        self.cache.invalidate(&format!("posts:{address}"));
    }

    /// Drops one cached post.
    pub fn invalidate_post(&self, address: &str, id: u64) {
        self.cache.invalidate(&format!("post:{address}:{id}"));
    }
}
