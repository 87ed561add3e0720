//! Prepared units and the ordered export set.

use crate::config::ExportConfig;
use crate::conflict::ConflictAction;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A fully self-describing snapshot of one content object, ready for
/// transfer.
///
/// Owned by the export/import engines during a single transfer; it is
/// serialized over the wire or into an archive, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedUnit {
    /// Content id on the exporting node.
    pub source_id: u64,
    /// GID of the object.
    pub gid: String,
    /// True when this unit is the synchronization root of the transfer.
    #[serde(default)]
    pub is_root: bool,
    /// Name (slug).
    pub name: String,
    /// Title.
    pub title: String,
    /// Object type.
    pub object_type: String,
    /// Publication status.
    pub status: String,
    /// Body with nested references and dynamic strings replaced by
    /// placeholders.
    pub body: String,
    /// Excerpt.
    #[serde(default)]
    pub excerpt: String,
    /// Creation time in unix milliseconds.
    pub created_at_ms: u64,
    /// Last modification time in unix milliseconds.
    pub modified_at_ms: u64,
    /// Thumbnail reference (source id on the exporting node).
    #[serde(default)]
    pub thumbnail: Option<u64>,
    /// Meta pairs that survived the export exclusion list.
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
    /// Terms assigned to the object, parent chains inlined.
    #[serde(default)]
    pub terms: Vec<PreparedTerm>,
    /// Terms referenced from the body, parent chains inlined.
    #[serde(default)]
    pub referenced_terms: Vec<PreparedTerm>,
    /// Binary asset descriptor when the object wraps a file.
    #[serde(default)]
    pub asset: Option<PreparedAsset>,
    /// Language descriptor.
    #[serde(default)]
    pub language: Option<PreparedLanguage>,
    /// Hierarchy descriptor.
    #[serde(default)]
    pub hierarchy: Option<PreparedHierarchy>,
    /// Export configuration this unit was prepared under.
    pub config: ExportConfig,
    /// Import action resolved for this unit, if any.
    #[serde(default)]
    pub action: Option<ConflictAction>,
    /// Source ids of nested references discovered in the body.
    #[serde(default)]
    pub nested: Vec<u64>,
}

impl PreparedUnit {
    /// Requalifies the unit's GID with the origin network address,
    /// for transfers that cross networks.
    ///
    /// The address is canonicalized; a GID that already carries an
    /// address is left alone.
    pub fn qualify_gid(&mut self, network_address: &str) {
        let canonical = contentsync_gid::canonicalize_address(network_address);
        if canonical.is_empty() {
            return;
        }
        if let Some(gid) = contentsync_gid::Gid::parse(&self.gid) {
            if gid.is_local() {
                self.gid =
                    contentsync_gid::Gid::remote(gid.origin_node_id(), gid.content_id(), canonical)
                        .encode();
            }
        }
    }
}

/// A taxonomy term with its parent chain inlined.
///
/// Inlining the chain means the import side never needs a second
/// round-trip to resolve a dangling parent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTerm {
    /// Term id on the exporting node.
    pub source_id: u64,
    /// Taxonomy name.
    pub taxonomy: String,
    /// Display name.
    pub name: String,
    /// Slug.
    pub slug: String,
    /// Parent term, inlined recursively.
    #[serde(default)]
    pub parent: Option<Box<PreparedTerm>>,
}

/// Asset descriptor of a prepared unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedAsset {
    /// Bare file name.
    pub file_name: String,
    /// Path relative to the uploads root.
    pub relative_path: String,
    /// Canonicalized source URL (any `-scaled` variant stripped).
    pub url: String,
}

/// Language descriptor of a prepared unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedLanguage {
    /// Language code.
    pub code: String,
    /// Name of the translation tool that produced the descriptor, if
    /// one was active.
    #[serde(default)]
    pub tool: Option<String>,
    /// Sibling translations as `code -> GID`.
    #[serde(default)]
    pub siblings: BTreeMap<String, String>,
    /// Tool-specific arguments, carried opaquely.
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

/// Parent/children snapshot used to re-establish tree shape by
/// name+type matching (raw ids are not portable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedHierarchy {
    /// Parent reference, if any.
    #[serde(default)]
    pub parent: Option<RelatedRef>,
    /// Direct children.
    #[serde(default)]
    pub children: Vec<RelatedRef>,
}

/// A name+type reference to a related object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedRef {
    /// Content id on the exporting node.
    pub source_id: u64,
    /// Name (slug).
    pub name: String,
    /// Object type.
    pub object_type: String,
}

/// The ordered collection of prepared units of one export.
///
/// Keyed by the origin local id so any object touched more than once is
/// processed exactly once. Reserving a position before preparing and
/// filling it in afterwards is what breaks reference cycles: an object
/// already being processed counts as seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<PreparedUnit>", from = "Vec<PreparedUnit>")]
pub struct ExportSet {
    order: Vec<u64>,
    units: BTreeMap<u64, Option<PreparedUnit>>,
}

impl ExportSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a position for the given source id.
    ///
    /// Returns false if the id is already reserved or filled.
    pub fn reserve(&mut self, source_id: u64) -> bool {
        if self.units.contains_key(&source_id) {
            return false;
        }
        self.order.push(source_id);
        self.units.insert(source_id, None);
        true
    }

    /// Fills a reserved position with its prepared unit.
    pub fn fill(&mut self, unit: PreparedUnit) {
        let source_id = unit.source_id;
        if !self.units.contains_key(&source_id) {
            self.order.push(source_id);
        }
        self.units.insert(source_id, Some(unit));
    }

    /// Releases a reserved position that will not be filled.
    pub fn release(&mut self, source_id: u64) {
        if let Some(None) = self.units.get(&source_id) {
            self.units.remove(&source_id);
            self.order.retain(|id| *id != source_id);
        }
    }

    /// Returns true if the id is reserved or filled.
    pub fn contains(&self, source_id: u64) -> bool {
        self.units.contains_key(&source_id)
    }

    /// Gets a filled unit by source id.
    pub fn get(&self, source_id: u64) -> Option<&PreparedUnit> {
        self.units.get(&source_id).and_then(Option::as_ref)
    }

    /// Gets a filled unit mutably by source id.
    pub fn get_mut(&mut self, source_id: u64) -> Option<&mut PreparedUnit> {
        self.units.get_mut(&source_id).and_then(Option::as_mut)
    }

    /// Iterates filled units in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PreparedUnit> {
        self.order
            .iter()
            .filter_map(|id| self.units.get(id).and_then(Option::as_ref))
    }

    /// Returns the filled unit count.
    pub fn len(&self) -> usize {
        self.units.values().filter(|u| u.is_some()).count()
    }

    /// Returns true if no units are filled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the source ids of filled units in insertion order.
    pub fn source_ids(&self) -> Vec<u64> {
        self.iter().map(|u| u.source_id).collect()
    }
}

impl From<ExportSet> for Vec<PreparedUnit> {
    fn from(set: ExportSet) -> Self {
        let mut units = set.units;
        set.order
            .into_iter()
            .filter_map(|id| units.remove(&id).flatten())
            .collect()
    }
}

impl From<Vec<PreparedUnit>> for ExportSet {
    fn from(units: Vec<PreparedUnit>) -> Self {
        let mut set = ExportSet::new();
        for unit in units {
            set.fill(unit);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(source_id: u64) -> PreparedUnit {
        PreparedUnit {
            source_id,
            gid: format!("1-{source_id}"),
            is_root: false,
            name: format!("unit-{source_id}"),
            title: String::new(),
            object_type: "post".into(),
            status: "publish".into(),
            body: String::new(),
            excerpt: String::new(),
            created_at_ms: 0,
            modified_at_ms: 0,
            thumbnail: None,
            meta: BTreeMap::new(),
            terms: Vec::new(),
            referenced_terms: Vec::new(),
            asset: None,
            language: None,
            hierarchy: None,
            config: ExportConfig::default(),
            action: None,
            nested: Vec::new(),
        }
    }

    #[test]
    fn reserve_then_fill_preserves_order() {
        let mut set = ExportSet::new();
        assert!(set.reserve(10));
        assert!(set.reserve(7));
        assert!(!set.reserve(10));

        set.fill(unit(7));
        set.fill(unit(10));

        assert_eq!(set.source_ids(), vec![10, 7]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn reserved_counts_as_contained() {
        let mut set = ExportSet::new();
        set.reserve(10);
        assert!(set.contains(10));
        assert!(set.get(10).is_none());
    }

    #[test]
    fn release_drops_unfilled_reservation() {
        let mut set = ExportSet::new();
        set.reserve(10);
        set.reserve(7);
        set.fill(unit(10));

        set.release(7);
        assert!(!set.contains(7));

        // Filled positions are not released.
        set.release(10);
        assert!(set.contains(10));
        assert_eq!(set.source_ids(), vec![10]);
    }

    #[test]
    fn serde_as_ordered_array() {
        let mut set = ExportSet::new();
        set.reserve(10);
        set.reserve(7);
        set.fill(unit(7));
        set.fill(unit(10));

        let json = serde_json::to_value(&set).unwrap();
        let ids: Vec<u64> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["source_id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![10, 7]);

        let back: ExportSet = serde_json::from_value(json).unwrap();
        assert_eq!(back.source_ids(), vec![10, 7]);
    }

    #[test]
    fn qualify_gid_adds_address_once() {
        let mut u = unit(10);
        u.qualify_gid("https://www.one.example/");
        assert_eq!(u.gid, "1-10-one.example");

        // Already qualified; a second call leaves it alone.
        u.qualify_gid("two.example");
        assert_eq!(u.gid, "1-10-one.example");
    }

    #[test]
    fn term_parent_chain_nests() {
        let term = PreparedTerm {
            source_id: 3,
            taxonomy: "category".into(),
            name: "Local".into(),
            slug: "local".into(),
            parent: Some(Box::new(PreparedTerm {
                source_id: 1,
                taxonomy: "category".into(),
                name: "News".into(),
                slug: "news".into(),
                parent: None,
            })),
        };
        let json = serde_json::to_value(&term).unwrap();
        assert_eq!(json["parent"]["slug"], "news");
        assert!(json["parent"]["parent"].is_null());
    }
}
