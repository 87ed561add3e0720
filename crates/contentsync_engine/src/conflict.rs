//! Conflict detection against a destination catalog.

use crate::error::SyncResult;
use contentsync_gid::Gid;
use contentsync_protocol::{ConflictAction, ConflictDecision, ExportSet, NameConflict};
use contentsync_store::{sync_meta, PostStore};
use std::collections::{BTreeMap, BTreeSet};

/// What the resolver concluded about an incoming set.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReport {
    /// Decisions keyed by incoming source id. Advisory: the import
    /// engine re-validates before writing.
    pub decisions: BTreeMap<u64, ConflictDecision>,
    /// Bare name+type collisions the caller must decide explicitly.
    pub conflicts: Vec<NameConflict>,
}

impl ResolutionReport {
    /// Merges caller-supplied decisions over the resolver's own.
    pub fn merge_overrides(&mut self, overrides: &BTreeMap<u64, ConflictDecision>) {
        for (source_id, decision) in overrides {
            self.decisions.insert(*source_id, *decision);
        }
    }
}

/// Decides per-unit actions by matching global identity and name+type
/// collisions against the destination node's existing content.
pub struct ConflictResolver<'a> {
    store: &'a dyn PostStore,
}

impl<'a> ConflictResolver<'a> {
    /// Creates a resolver over the destination store.
    pub fn new(store: &'a dyn PostStore) -> Self {
        Self { store }
    }

    /// Resolves an incoming set in two passes.
    ///
    /// GID pass: a local object with the same GID proposes `replace`
    /// when the incoming unit is the transfer root, `skip` otherwise.
    /// Name+type pass (no GID match only): a collision is surfaced as a
    /// conflict requiring an explicit caller decision, never
    /// auto-decided. Two incoming units resolving to the same local
    /// object count once; later duplicates become plain skips.
    pub fn resolve(&self, set: &ExportSet) -> SyncResult<ResolutionReport> {
        let catalog = self.gid_catalog()?;
        let mut report = ResolutionReport::default();
        let mut claimed: BTreeSet<u64> = BTreeSet::new();

        for unit in set.iter() {
            if let Some(incoming_gid) = Gid::parse(&unit.gid) {
                let matched = catalog
                    .iter()
                    .find(|(_, local_gid)| *local_gid == incoming_gid)
                    .map(|(local_id, _)| *local_id);

                if let Some(local_id) = matched {
                    let decision = if !claimed.insert(local_id) {
                        // Reached again via another path; the first
                        // resolution already counts.
                        ConflictDecision::matched(local_id, ConflictAction::Skip)
                    } else if unit.is_root {
                        ConflictDecision::matched(local_id, ConflictAction::Replace)
                    } else {
                        ConflictDecision::matched(local_id, ConflictAction::Skip)
                    };
                    report.decisions.insert(unit.source_id, decision);
                    continue;
                }
            }

            if let Some(local) = self
                .store
                .find_by_name_type(&unit.name, &unit.object_type)?
            {
                report.conflicts.push(NameConflict {
                    incoming_id: unit.source_id,
                    local_id: local.id.as_u64(),
                    name: unit.name.clone(),
                    object_type: unit.object_type.clone(),
                });
            }
        }

        Ok(report)
    }

    /// Lists local objects carrying a GID, as `(local id, gid)`.
    fn gid_catalog(&self) -> SyncResult<Vec<(u64, Gid)>> {
        let mut catalog = Vec::new();
        for object in self.store.list()? {
            if let Some(gid) = object.meta_str(sync_meta::GID).and_then(Gid::parse) {
                catalog.push((object.id.as_u64(), gid));
            }
        }
        Ok(catalog)
    }
}
