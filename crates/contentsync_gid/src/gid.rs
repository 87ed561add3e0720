//! The global identifier type and its codec.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A global identifier for one synchronized content object.
///
/// Minted once when an object is first marked as a synchronization root;
/// immutable thereafter and never reused after deletion.
#[derive(Debug, Clone, Eq)]
pub struct Gid {
    /// Node id of the network the object is rooted on.
    origin_node_id: u64,
    /// Content id of the root copy on its origin node.
    content_id: u64,
    /// Network address of the origin network; `None` means the current
    /// network.
    network_address: Option<String>,
}

impl Gid {
    /// Creates a GID rooted on the current network.
    pub fn local(origin_node_id: u64, content_id: u64) -> Self {
        Self {
            origin_node_id,
            content_id,
            network_address: None,
        }
    }

    /// Creates a GID rooted on a remote network.
    ///
    /// An empty address is treated as local, mirroring the encoded form
    /// where the third segment is simply omitted.
    pub fn remote(origin_node_id: u64, content_id: u64, network_address: impl Into<String>) -> Self {
        let address = network_address.into();
        Self {
            origin_node_id,
            content_id,
            network_address: if address.is_empty() {
                None
            } else {
                Some(address)
            },
        }
    }

    /// Returns the origin node id.
    pub fn origin_node_id(&self) -> u64 {
        self.origin_node_id
    }

    /// Returns the content id on the origin node.
    pub fn content_id(&self) -> u64 {
        self.content_id
    }

    /// Returns the raw network address, if any.
    pub fn network_address(&self) -> Option<&str> {
        self.network_address.as_deref()
    }

    /// Returns the canonicalized network address, if any.
    pub fn canonical_address(&self) -> Option<String> {
        self.network_address
            .as_deref()
            .map(canonicalize_address)
            .filter(|a| !a.is_empty())
    }

    /// Returns true if the object is rooted on the current network.
    pub fn is_local(&self) -> bool {
        self.network_address.is_none()
    }

    /// Returns true if the object is rooted on a remote network.
    pub fn is_remote(&self) -> bool {
        self.network_address.is_some()
    }

    /// Encodes the GID to its canonical string form.
    ///
    /// The network address segment is omitted for local GIDs.
    pub fn encode(&self) -> String {
        match &self.network_address {
            Some(address) => format!("{}-{}-{}", self.origin_node_id, self.content_id, address),
            None => format!("{}-{}", self.origin_node_id, self.content_id),
        }
    }

    /// Decodes a GID from its string form.
    ///
    /// Splits on the first two `-` occurrences; node and content ids are
    /// non-negative integers, while the address segment may itself
    /// contain `-`. Returns `None` for malformed input.
    pub fn parse(input: &str) -> Option<Self> {
        let (origin, rest) = input.split_once('-')?;
        let origin_node_id: u64 = origin.parse().ok()?;

        match rest.split_once('-') {
            Some((content, address)) => {
                let content_id: u64 = content.parse().ok()?;
                if address.is_empty() {
                    return None;
                }
                Some(Self {
                    origin_node_id,
                    content_id,
                    network_address: Some(address.to_string()),
                })
            }
            None => {
                let content_id: u64 = rest.parse().ok()?;
                Some(Self {
                    origin_node_id,
                    content_id,
                    network_address: None,
                })
            }
        }
    }

    /// Returns true if `other` names the same object.
    ///
    /// Alias of `==`; reads better at call sites comparing stored meta
    /// against freshly minted identifiers.
    pub fn matches(&self, other: &Gid) -> bool {
        self == other
    }
}

impl PartialEq for Gid {
    fn eq(&self, other: &Self) -> bool {
        self.origin_node_id == other.origin_node_id
            && self.content_id == other.content_id
            && self.canonical_address() == other.canonical_address()
    }
}

impl Hash for Gid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.origin_node_id.hash(state);
        self.content_id.hash(state);
        self.canonical_address().hash(state);
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Gid {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gid::parse(s).ok_or(())
    }
}

/// Canonicalizes a network address for comparison.
///
/// Strips the `http://`/`https://` scheme, a leading `www.`, and any
/// trailing `/`. Addresses that differ only in those parts name the same
/// network.
pub fn canonicalize_address(address: &str) -> String {
    let stripped = address
        .strip_prefix("https://")
        .or_else(|| address.strip_prefix("http://"))
        .unwrap_or(address);
    let stripped = stripped.strip_prefix("www.").unwrap_or(stripped);
    stripped.trim_end_matches('/').to_string()
}

/// Validates the wire form of a GID without allocating.
///
/// The accepted grammar is `\d+-\d+(-[host-chars]+)?` where host
/// characters are alphanumerics plus `. - : / _ %`.
pub fn is_valid_wire_gid(input: &str) -> bool {
    let Some((origin, rest)) = input.split_once('-') else {
        return false;
    };
    if origin.is_empty() || !origin.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let (content, address) = match rest.split_once('-') {
        Some((content, address)) => (content, Some(address)),
        None => (rest, None),
    };
    if content.is_empty() || !content.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match address {
        None => true,
        Some(address) => {
            !address.is_empty()
                && address
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b':' | b'/' | b'_' | b'%'))
        }
    }
}
