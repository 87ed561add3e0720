//! Cache abstraction.
//!
//! Two lifetimes exist: request-scoped caches covering one request with
//! no expiry, and cross-request caches with time-boxed entries. Callers
//! of the TTL cache must tolerate staleness within the window and must
//! not assume cross-node read-after-write consistency.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Expiry window for a single remote object lookup.
pub const REMOTE_OBJECT_TTL: Duration = Duration::from_secs(10 * 60);

/// Expiry window for a remote listing.
pub const REMOTE_LISTING_TTL: Duration = Duration::from_secs(60 * 60);

/// A keyed cache of JSON values.
pub trait Cache: Send + Sync {
    /// Gets a cached value.
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores a value, optionally bounded by a time-to-live.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    /// Removes a value. Returns whether it was present.
    fn invalidate(&self, key: &str) -> bool;
}

/// An in-memory cache covering one request; entries never expire.
pub struct RequestCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl RequestCache {
    /// Creates an empty request cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for RequestCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value, _ttl: Option<Duration>) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn invalidate(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }
}

/// A cross-request cache with per-entry expiry.
pub struct TtlCache {
    entries: RwLock<HashMap<String, (Value, Option<Instant>)>>,
    default_ttl: Duration,
}

impl TtlCache {
    /// Creates a cache whose unspecified entries expire after `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Drops all expired entries.
    pub fn prune(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .retain(|_, (_, deadline)| deadline.map(|d| d > now).unwrap_or(true));
    }
}

impl Cache for TtlCache {
    fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read();
        let (value, deadline) = entries.get(key)?;
        if let Some(deadline) = deadline {
            if *deadline <= Instant::now() {
                return None;
            }
        }
        Some(value.clone())
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let deadline = Instant::now() + ttl.unwrap_or(self.default_ttl);
        self.entries
            .write()
            .insert(key.to_string(), (value, Some(deadline)));
    }

    fn invalidate(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_cache_never_expires() {
        let cache = RequestCache::new();
        cache.set("k", json!(1), Some(Duration::from_nanos(1)));
        assert_eq!(cache.get("k"), Some(json!(1)));
        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn ttl_cache_expires_entries() {
        let cache = TtlCache::new(Duration::from_secs(600));
        cache.set("short", json!("a"), Some(Duration::from_millis(0)));
        cache.set("long", json!("b"), Some(Duration::from_secs(600)));

        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("short"), None);
        assert_eq!(cache.get("long"), Some(json!("b")));
    }

    #[test]
    fn ttl_cache_prune_removes_dead_entries() {
        let cache = TtlCache::new(Duration::from_secs(600));
        cache.set("short", json!("a"), Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        cache.prune();
        assert!(cache.entries.read().is_empty());
    }
}
