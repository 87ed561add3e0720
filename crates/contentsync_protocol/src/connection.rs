//! Connection-map records and destination keys.

use contentsync_gid::canonicalize_address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where one linked copy of a root object lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Content id of the copy on its node.
    pub content_id: u64,
    /// Edit URL of the copy.
    pub edit_url: String,
    /// Site URL of the node holding the copy.
    pub site_url: String,
    /// Public display URL of the copy.
    pub display_url: String,
}

/// One fan-out destination: a node of the local network, or a node of a
/// remote network.
///
/// Encodes as `"3"` for local node 3 and `"3|example.org"` for node 3
/// of the network at `example.org`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DestinationKey {
    /// Node id on the destination network.
    pub node_id: u64,
    /// Canonical address of the destination network; `None` for the
    /// local network.
    pub network_address: Option<String>,
}

impl DestinationKey {
    /// Creates a key for a node of the local network.
    pub fn local(node_id: u64) -> Self {
        Self {
            node_id,
            network_address: None,
        }
    }

    /// Creates a key for a node of a remote network.
    ///
    /// The address is canonicalized; an empty address means local.
    pub fn remote(node_id: u64, network_address: impl AsRef<str>) -> Self {
        let canonical = canonicalize_address(network_address.as_ref());
        Self {
            node_id,
            network_address: if canonical.is_empty() {
                None
            } else {
                Some(canonical)
            },
        }
    }

    /// Returns true for local-network destinations.
    pub fn is_local(&self) -> bool {
        self.network_address.is_none()
    }

    /// Encodes the key to its string form.
    pub fn encode(&self) -> String {
        match &self.network_address {
            Some(address) => format!("{}|{}", self.node_id, address),
            None => self.node_id.to_string(),
        }
    }

    /// Parses a key from its string form.
    pub fn parse(input: &str) -> Option<Self> {
        match input.split_once('|') {
            Some((node, address)) => {
                let node_id = node.parse().ok()?;
                if address.is_empty() {
                    return None;
                }
                Some(Self::remote(node_id, address))
            }
            None => input.parse().ok().map(Self::local),
        }
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<DestinationKey> for String {
    fn from(key: DestinationKey) -> Self {
        key.encode()
    }
}

impl TryFrom<String> for DestinationKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DestinationKey::parse(&value).ok_or_else(|| format!("invalid destination key: {value}"))
    }
}

/// The connection map of one root object.
///
/// Local entries are keyed by node id directly; remote entries are
/// keyed by canonical network address and nest another map keyed by
/// node id, because one remote network can itself be a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntries {
    /// Copies on the local network.
    #[serde(default)]
    pub local: BTreeMap<u64, LinkRecord>,
    /// Copies on remote networks.
    #[serde(default)]
    pub remote: BTreeMap<String, BTreeMap<u64, LinkRecord>>,
}

impl ConnectionEntries {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the entry for a destination.
    pub fn add(&mut self, key: &DestinationKey, record: LinkRecord) {
        match &key.network_address {
            Some(address) => {
                self.remote
                    .entry(address.clone())
                    .or_default()
                    .insert(key.node_id, record);
            }
            None => {
                self.local.insert(key.node_id, record);
            }
        }
    }

    /// Removes the entry for a destination. Returns whether it existed.
    pub fn remove(&mut self, key: &DestinationKey) -> bool {
        match &key.network_address {
            Some(address) => {
                let Some(nodes) = self.remote.get_mut(address) else {
                    return false;
                };
                let removed = nodes.remove(&key.node_id).is_some();
                if nodes.is_empty() {
                    self.remote.remove(address);
                }
                removed
            }
            None => self.local.remove(&key.node_id).is_some(),
        }
    }

    /// Gets the entry for a destination.
    pub fn get(&self, key: &DestinationKey) -> Option<&LinkRecord> {
        match &key.network_address {
            Some(address) => self.remote.get(address)?.get(&key.node_id),
            None => self.local.get(&key.node_id),
        }
    }

    /// Returns every destination key in the map.
    pub fn keys(&self) -> Vec<DestinationKey> {
        let mut keys: Vec<DestinationKey> =
            self.local.keys().map(|id| DestinationKey::local(*id)).collect();
        for (address, nodes) in &self.remote {
            for node_id in nodes.keys() {
                keys.push(DestinationKey::remote(*node_id, address));
            }
        }
        keys
    }

    /// Returns the number of entries across both levels.
    pub fn len(&self) -> usize {
        self.local.len() + self.remote.values().map(BTreeMap::len).sum::<usize>()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}
