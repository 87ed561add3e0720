//! Meta key conventions and the export exclusion policy.

use serde_json::Value;
use std::collections::BTreeSet;

/// Meta keys the synchronization machinery writes on content objects.
pub mod sync_meta {
    /// GID of the object this copy tracks (string form).
    pub const GID: &str = "_sync_gid";
    /// Synchronization status: `root` or `linked`.
    pub const STATUS: &str = "_sync_status";
    /// Connection map of a root object (JSON).
    pub const CONNECTIONS: &str = "_sync_connections";
    /// Translation sibling links written by the meta-backed provider.
    pub const TRANSLATIONS: &str = "_sync_translations";
    /// Language code written by the meta-backed provider.
    pub const LANGUAGE: &str = "_sync_language";
}

/// Meta keys excluded from export.
///
/// Always excluded: internal cache/lock/legacy keys and the
/// synchronization bookkeeping itself; a transferred copy must never
/// carry its source's connection map or status. Callers can extend the
/// set with keys belonging to inactive optional subsystems.
#[derive(Debug, Clone)]
pub struct MetaExclusions {
    keys: BTreeSet<String>,
    prefixes: Vec<String>,
}

impl MetaExclusions {
    /// Creates the standard exclusion set.
    pub fn standard() -> Self {
        let keys = [
            "_edit_lock",
            "_edit_last",
            "_legacy_layout",
            "_object_cache",
            sync_meta::GID,
            sync_meta::STATUS,
            sync_meta::CONNECTIONS,
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            keys,
            prefixes: vec!["_cache_".into(), "_tmp_".into()],
        }
    }

    /// Creates an empty exclusion set.
    pub fn none() -> Self {
        Self {
            keys: BTreeSet::new(),
            prefixes: Vec::new(),
        }
    }

    /// Adds a key to the exclusion set.
    pub fn exclude(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    /// Adds a key prefix to the exclusion set.
    pub fn exclude_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Returns true if the key must not travel.
    pub fn is_excluded(&self, key: &str) -> bool {
        self.keys.contains(key) || self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }

    /// Returns true if the value is empty enough to skip exporting.
    pub fn is_skippable_value(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }
}

impl Default for MetaExclusions {
    fn default() -> Self {
        Self::standard()
    }
}
