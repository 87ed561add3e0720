//! Conflict actions and decisions.

use serde::{Deserialize, Serialize};

/// What the importer should do with one incoming unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictAction {
    /// Create a new object (the default when nothing matched).
    Insert,
    /// Overwrite the matched local object.
    Replace,
    /// Leave the matched local object untouched; only record the id
    /// mapping for reference rewriting.
    Skip,
    /// Insert as a new object without attempting to deduplicate,
    /// leaving the matched local object in place.
    Keep,
    /// Move the matched local object to trash instead of writing.
    Trash,
    /// Permanently delete the matched local object instead of writing.
    Delete,
}

impl ConflictAction {
    /// Returns the wire string for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictAction::Insert => "insert",
            ConflictAction::Replace => "replace",
            ConflictAction::Skip => "skip",
            ConflictAction::Keep => "keep",
            ConflictAction::Trash => "trash",
            ConflictAction::Delete => "delete",
        }
    }

    /// Parses a wire string.
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "insert" => Some(ConflictAction::Insert),
            "replace" => Some(ConflictAction::Replace),
            "skip" => Some(ConflictAction::Skip),
            "keep" => Some(ConflictAction::Keep),
            "trash" => Some(ConflictAction::Trash),
            "delete" => Some(ConflictAction::Delete),
            _ => None,
        }
    }

    /// Returns true if the action writes new content.
    pub fn writes(&self) -> bool {
        matches!(
            self,
            ConflictAction::Insert | ConflictAction::Replace | ConflictAction::Keep
        )
    }
}

/// Resolution of one incoming unit against the destination catalog.
///
/// Advisory input to the import engine, which still re-validates
/// before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDecision {
    /// The matched local object, when one exists.
    #[serde(default)]
    pub local_id: Option<u64>,
    /// The action to take.
    pub action: ConflictAction,
}

impl ConflictDecision {
    /// Creates a decision bound to a matched local object.
    pub fn matched(local_id: u64, action: ConflictAction) -> Self {
        Self {
            local_id: Some(local_id),
            action,
        }
    }

    /// Creates a decision with no local match.
    pub fn unmatched(action: ConflictAction) -> Self {
        Self {
            local_id: None,
            action,
        }
    }
}

/// A bare name+type collision that requires an explicit caller decision.
///
/// The system never auto-decides these; the caller supplies `keep`,
/// `replace` or `skip` per conflict before importing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameConflict {
    /// Export-time id of the incoming unit.
    pub incoming_id: u64,
    /// Id of the colliding local object.
    pub local_id: u64,
    /// Shared name (slug).
    pub name: String,
    /// Shared object type.
    pub object_type: String,
}
