//! Synchronization status and distribution tracking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Synchronization status of one content object.
///
/// Unset (an ordinary object) is represented as `Option<SyncStatus>`
/// being `None`. Exactly one object per GID holds `Root` on its origin
/// node; every `Linked` copy resolves back to exactly one root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// This copy is the canonical origin.
    Root,
    /// This copy was imported from elsewhere and is read-mostly.
    Linked,
}

impl SyncStatus {
    /// Returns the wire string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Root => "root",
            SyncStatus::Linked => "linked",
        }
    }

    /// Parses a wire string.
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "root" => Some(SyncStatus::Root),
            "linked" => Some(SyncStatus::Linked),
            _ => None,
        }
    }
}

/// Delivery state of one destination within a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationState {
    /// Queued, nothing sent yet.
    Init,
    /// Accepted by the destination, completion pending.
    Started,
    /// Import completed.
    Success,
    /// Delivery or import failed.
    Failed,
}

impl DestinationState {
    /// Returns true for states that will not change anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DestinationState::Success | DestinationState::Failed)
    }
}

/// One fan-out job: a source set pushed to N destinations.
///
/// Created when a root object's changes are queued for propagation,
/// mutated as destinations acknowledge, retained until every
/// destination reports a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionItem {
    /// Item id, unique per origin node.
    pub id: u64,
    /// GID of the distributed root object.
    pub root_gid: String,
    /// Per-destination delivery state, keyed by destination key.
    pub destinations: BTreeMap<String, DestinationState>,
}

impl DistributionItem {
    /// Creates an item with every destination in `Init`.
    pub fn new(id: u64, root_gid: impl Into<String>, destinations: &[String]) -> Self {
        Self {
            id,
            root_gid: root_gid.into(),
            destinations: destinations
                .iter()
                .map(|key| (key.clone(), DestinationState::Init))
                .collect(),
        }
    }

    /// Sets one destination's state. Returns false for unknown keys.
    pub fn set_state(&mut self, destination: &str, state: DestinationState) -> bool {
        match self.destinations.get_mut(destination) {
            Some(slot) => {
                *slot = state;
                true
            }
            None => false,
        }
    }

    /// Aggregate status across all destinations.
    ///
    /// `Failed` dominates; else any non-terminal destination keeps the
    /// whole item pending; else `Success`.
    pub fn aggregate(&self) -> DestinationState {
        let mut pending = None;
        for state in self.destinations.values() {
            match state {
                DestinationState::Failed => return DestinationState::Failed,
                DestinationState::Started => pending = Some(DestinationState::Started),
                DestinationState::Init => {
                    pending.get_or_insert(DestinationState::Init);
                }
                DestinationState::Success => {}
            }
        }
        pending.unwrap_or(DestinationState::Success)
    }

    /// Returns true once every destination is terminal.
    pub fn is_settled(&self) -> bool {
        self.destinations.values().all(DestinationState::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(states: &[(&str, DestinationState)]) -> DistributionItem {
        let keys: Vec<String> = states.iter().map(|(k, _)| k.to_string()).collect();
        let mut item = DistributionItem::new(1, "1-10", &keys);
        for (key, state) in states {
            item.set_state(key, *state);
        }
        item
    }

    #[test]
    fn failed_dominates() {
        let item = item(&[
            ("a", DestinationState::Success),
            ("b", DestinationState::Failed),
            ("c", DestinationState::Started),
        ]);
        assert_eq!(item.aggregate(), DestinationState::Failed);
    }

    #[test]
    fn pending_dominates_success() {
        let item = item(&[
            ("a", DestinationState::Success),
            ("b", DestinationState::Started),
        ]);
        assert_eq!(item.aggregate(), DestinationState::Started);
        assert!(!item.is_settled());
    }

    #[test]
    fn all_success() {
        let item = item(&[
            ("a", DestinationState::Success),
            ("b", DestinationState::Success),
        ]);
        assert_eq!(item.aggregate(), DestinationState::Success);
        assert!(item.is_settled());
    }

    #[test]
    fn untouched_destinations_stay_init() {
        let item = DistributionItem::new(1, "1-10", &["a".into(), "b".into()]);
        assert_eq!(item.aggregate(), DestinationState::Init);
    }

    #[test]
    fn set_state_rejects_unknown_destination() {
        let mut item = DistributionItem::new(1, "1-10", &["a".into()]);
        assert!(!item.set_state("zzz", DestinationState::Success));
    }

    #[test]
    fn status_wire_strings() {
        assert_eq!(SyncStatus::parse("root"), Some(SyncStatus::Root));
        assert_eq!(SyncStatus::parse("linked"), Some(SyncStatus::Linked));
        assert_eq!(SyncStatus::parse("other"), None);
        assert_eq!(SyncStatus::Root.as_str(), "root");
    }
}
