//! Request/response bodies of the peer endpoints.

use crate::config::ExportConfig;
use crate::conflict::ConflictDecision;
use crate::connection::LinkRecord;
use crate::status::DestinationState;
use crate::unit::ExportSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `add_connection`: the caller asks for a bidirectional
/// connection, presenting its own canonical network address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddConnectionRequest {
    /// Canonical network address of the calling network.
    pub address: String,
}

/// Body of `posts/prepare`: prepare one root object for transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRequest {
    /// Root content id on the serving node.
    pub id: u64,
    /// Export configuration.
    #[serde(default)]
    pub config: ExportConfig,
}

/// Body of connection-map mutations (`posts/{gid}/connections`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionMutation {
    /// Node holding the copy, on the destination network.
    pub node_id: u64,
    /// Network address of the copy's network; `None` when the copy
    /// lives on the GID owner's own network.
    #[serde(default)]
    pub network_address: Option<String>,
    /// Link record of the copy.
    pub record: LinkRecord,
}

/// One live copy reported by `connected_posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedCopy {
    /// Node holding the copy.
    pub node_id: u64,
    /// Link record of the copy.
    pub record: LinkRecord,
}

/// Body of `distribution/distribute-item`: one inbound transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributeItemRequest {
    /// Distribution item id on the origin network.
    pub item_id: u64,
    /// Destination key the origin used for this delivery; echoed back
    /// in the completion callback.
    pub destination: String,
    /// Node id on the receiving network that should import the set.
    pub node_id: u64,
    /// The prepared units.
    pub units: ExportSet,
    /// Caller-supplied conflict decisions, keyed by source id.
    #[serde(default)]
    pub decisions: BTreeMap<u64, ConflictDecision>,
    /// Asset bytes keyed by export-time filename, base64-encoded.
    #[serde(default)]
    pub media: BTreeMap<String, String>,
}

/// Body of `distribution/update-item`: a destination reports its
/// terminal state back to the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    /// Distribution item id on the origin network.
    pub item_id: u64,
    /// Destination key, as given in the distribute request.
    pub destination: String,
    /// The destination's state.
    pub state: DestinationState,
    /// Failure detail, when the state is `failed`.
    #[serde(default)]
    pub message: Option<String>,
}

/// One object in a `posts` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSummary {
    /// Content id on the serving node.
    pub id: u64,
    /// Name (slug).
    pub name: String,
    /// Title.
    pub title: String,
    /// Object type.
    pub object_type: String,
    /// Publication status.
    pub status: String,
    /// GID, when the object is synchronized.
    #[serde(default)]
    pub gid: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictAction;

    #[test]
    fn distribute_request_defaults() {
        let json = r#"{
            "item_id": 4,
            "destination": "2",
            "node_id": 2,
            "units": []
        }"#;
        let request: DistributeItemRequest = serde_json::from_str(json).unwrap();
        assert!(request.decisions.is_empty());
        assert!(request.units.is_empty());
        assert!(request.media.is_empty());
    }

    #[test]
    fn update_request_roundtrip() {
        let request = UpdateItemRequest {
            item_id: 4,
            destination: "2|peer.example".into(),
            state: DestinationState::Failed,
            message: Some("disk full".into()),
        };
        let json = serde_json::to_string(&request).unwrap();
        let back: UpdateItemRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn decisions_key_by_source_id() {
        let mut decisions = BTreeMap::new();
        decisions.insert(10u64, ConflictDecision::matched(5, ConflictAction::Replace));
        let json = serde_json::to_value(&decisions).unwrap();
        assert_eq!(json["10"]["action"], "replace");
    }
}
