//! The import engine.
//!
//! Takes a prepared export set plus conflict decisions, re-internalizes
//! placeholders to the destination node's own URLs and ids, persists
//! content through the post store, restores hierarchy, and updates the
//! post-import bookkeeping (synchronization status, connection map,
//! translation links). A failed unit is recorded and the batch
//! continues; nothing is rolled back.

use crate::archive::MediaBag;
use crate::connections::ConnectionMaps;
use crate::error::{SyncError, SyncResult};
use crate::placeholders::{resolve_id_placeholders, DynamicStrings};
use contentsync_gid::Gid;
use contentsync_protocol::{
    ConflictAction, ConflictDecision, DestinationKey, ExportSet, PreparedTerm, PreparedUnit,
};
use contentsync_store::{
    sync_meta, AssetFile, ContentId, ContentObject, LocalNetwork, MetaExclusions, NodeId,
    NodeSettings, PostStore, Term, TranslationRegistry,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one unit of a batch.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    /// Export-time id of the unit.
    pub source_id: u64,
    /// Action that was applied.
    pub action: ConflictAction,
    /// Local id the unit now maps to, if any.
    pub new_id: Option<u64>,
    /// Failure detail; `None` means the unit succeeded.
    pub error: Option<String>,
}

/// Result of one import batch.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// Per-unit outcomes in processing order.
    pub outcomes: Vec<UnitOutcome>,
    /// Accumulated `source id -> local id` mapping.
    pub id_map: BTreeMap<u64, u64>,
    /// First per-unit error, when any unit failed.
    pub first_error: Option<String>,
}

impl ImportReport {
    /// Returns true when every unit succeeded.
    pub fn success(&self) -> bool {
        self.first_error.is_none()
    }

    /// Admin-surface message for this report.
    pub fn admin_message(&self) -> String {
        match &self.first_error {
            None => format!("success::imported {} units", self.outcomes.len()),
            Some(error) => format!("error::{error}"),
        }
    }
}

/// Imports prepared sets onto one destination node.
pub struct ImportEngine {
    network: Arc<LocalNetwork>,
    node_id: NodeId,
    connections: Arc<ConnectionMaps>,
    translations: Arc<TranslationRegistry>,
    exclusions: MetaExclusions,
}

impl ImportEngine {
    /// Creates an engine for the given destination node.
    pub fn new(
        network: Arc<LocalNetwork>,
        node_id: NodeId,
        connections: Arc<ConnectionMaps>,
        translations: Arc<TranslationRegistry>,
    ) -> Self {
        Self {
            network,
            node_id,
            connections,
            translations,
            exclusions: MetaExclusions::standard(),
        }
    }

    /// Replaces the meta exclusion list applied defensively on import.
    pub fn with_exclusions(mut self, exclusions: MetaExclusions) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Imports a prepared set under the given decisions.
    ///
    /// `media` carries asset bytes keyed by export-time filename;
    /// units whose file is absent are imported without the file copy.
    pub fn import(
        &self,
        set: &ExportSet,
        decisions: &BTreeMap<u64, ConflictDecision>,
        media: &MediaBag,
    ) -> SyncResult<ImportReport> {
        let node = self
            .network
            .node(self.node_id)
            .ok_or(contentsync_store::StoreError::UnknownNode(self.node_id))?;
        let settings = node.settings().clone();
        let store = Arc::clone(node.store());
        let dynamic = DynamicStrings::for_node(&settings);

        let mut report = ImportReport::default();
        let mut term_map: BTreeMap<u64, u64> = BTreeMap::new();

        for unit in set.iter() {
            let decision = decisions.get(&unit.source_id).copied();
            let action = decision
                .map(|d| d.action)
                .or(unit.action)
                .unwrap_or(ConflictAction::Insert);
            debug!(source_id = unit.source_id, action = action.as_str(), "importing unit");

            let result = self.apply_unit(
                store.as_ref(),
                &settings,
                &dynamic,
                unit,
                action,
                decision,
                &mut report.id_map,
                &mut term_map,
                media,
            );
            match result {
                Ok(new_id) => report.outcomes.push(UnitOutcome {
                    source_id: unit.source_id,
                    action,
                    new_id,
                    error: None,
                }),
                Err(error) => {
                    let message = error.to_string();
                    warn!(source_id = unit.source_id, %message, "unit failed, continuing batch");
                    if report.first_error.is_none() {
                        report.first_error = Some(message.clone());
                    }
                    report.outcomes.push(UnitOutcome {
                        source_id: unit.source_id,
                        action,
                        new_id: None,
                        error: Some(message),
                    });
                }
            }
        }

        self.finalize_references(store.as_ref(), set, &report, &term_map)?;
        Ok(report)
    }

    /// Second pass: placeholders referencing units imported later in
    /// the batch resolve once the full id map is known.
    fn finalize_references(
        &self,
        store: &dyn PostStore,
        set: &ExportSet,
        report: &ImportReport,
        term_map: &BTreeMap<u64, u64>,
    ) -> SyncResult<()> {
        for outcome in &report.outcomes {
            if !outcome.action.writes() {
                continue;
            }
            let Some(new_id) = outcome.new_id else {
                continue;
            };
            let Some(mut object) = store.get(ContentId::new(new_id))? else {
                continue;
            };

            let mut changed = false;
            let resolved = resolve_id_placeholders(&object.body, &report.id_map, term_map);
            if resolved != object.body {
                object.body = resolved;
                changed = true;
            }

            if object.thumbnail.is_none() {
                let mapped = set
                    .get(outcome.source_id)
                    .and_then(|unit| unit.thumbnail)
                    .and_then(|thumbnail| report.id_map.get(&thumbnail))
                    .map(|id| ContentId::new(*id));
                if mapped.is_some() {
                    object.thumbnail = mapped;
                    changed = true;
                }
            }

            if changed {
                store.update(&object)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_unit(
        &self,
        store: &dyn PostStore,
        settings: &NodeSettings,
        dynamic: &DynamicStrings,
        unit: &PreparedUnit,
        action: ConflictAction,
        decision: Option<ConflictDecision>,
        id_map: &mut BTreeMap<u64, u64>,
        term_map: &mut BTreeMap<u64, u64>,
        media: &MediaBag,
    ) -> SyncResult<Option<u64>> {
        match action {
            ConflictAction::Skip => {
                let local = decision.and_then(|d| d.local_id);
                if let Some(local) = local {
                    id_map.insert(unit.source_id, local);
                }
                Ok(local)
            }
            ConflictAction::Trash | ConflictAction::Delete => {
                let target = self.locate_existing(store, unit, decision)?;
                match target {
                    Some(target) => {
                        store.delete(target, action == ConflictAction::Delete)?;
                        Ok(Some(target.as_u64()))
                    }
                    None => {
                        warn!(gid = %unit.gid, "no local object to {}", action.as_str());
                        Ok(None)
                    }
                }
            }
            ConflictAction::Insert | ConflictAction::Replace | ConflictAction::Keep => self
                .write_unit(
                    store, settings, dynamic, unit, action, decision, id_map, term_map, media,
                ),
        }
    }

    /// Re-validated lookup of the local object a decision points at.
    fn locate_existing(
        &self,
        store: &dyn PostStore,
        unit: &PreparedUnit,
        decision: Option<ConflictDecision>,
    ) -> SyncResult<Option<ContentId>> {
        if let Some(local) = decision.and_then(|d| d.local_id) {
            let id = ContentId::new(local);
            if store.get(id)?.is_some() {
                return Ok(Some(id));
            }
        }
        let copies = store.find_by_meta(sync_meta::GID, &json!(unit.gid))?;
        Ok(copies.first().map(|o| o.id))
    }

    #[allow(clippy::too_many_arguments)]
    fn write_unit(
        &self,
        store: &dyn PostStore,
        settings: &NodeSettings,
        dynamic: &DynamicStrings,
        unit: &PreparedUnit,
        action: ConflictAction,
        decision: Option<ConflictDecision>,
        id_map: &mut BTreeMap<u64, u64>,
        term_map: &mut BTreeMap<u64, u64>,
        media: &MediaBag,
    ) -> SyncResult<Option<u64>> {
        let body = resolve_id_placeholders(&dynamic.internalize(&unit.body), id_map, term_map);
        let excerpt = dynamic.internalize(&unit.excerpt);

        // The export already filtered meta; filter again in case the
        // set came from an untrusted peer.
        let mut meta = BTreeMap::new();
        for (key, value) in &unit.meta {
            if !self.exclusions.is_excluded(key) {
                meta.insert(key.clone(), value.clone());
            }
        }

        let asset = unit.asset.as_ref().map(|a| AssetFile {
            file_name: a.file_name.clone(),
            relative_path: a.relative_path.clone(),
            url: dynamic.internalize(&a.url),
        });

        let thumbnail = unit
            .thumbnail
            .and_then(|t| id_map.get(&t).copied())
            .map(ContentId::new);

        let mut object = ContentObject::new(&unit.name, &unit.object_type);
        object.title = unit.title.clone();
        object.status = unit.status.clone();
        object.body = body;
        object.excerpt = excerpt;
        object.thumbnail = thumbnail;
        object.created_at_ms = unit.created_at_ms;
        object.modified_at_ms = unit.modified_at_ms;
        object.meta = meta;
        object.asset = asset;

        let written = match action {
            ConflictAction::Replace => match self.locate_existing(store, unit, decision)? {
                Some(existing_id) => {
                    // Keep what is not part of the transfer snapshot.
                    if let Some(existing) = store.get(existing_id)? {
                        object.parent = existing.parent;
                    }
                    object.id = existing_id;
                    store.update(&object)?;
                    existing_id
                }
                None => store.create(object)?.id,
            },
            _ => store.create(object)?.id,
        };
        id_map.insert(unit.source_id, written.as_u64());

        if let Some(asset) = &unit.asset {
            match media.get(&asset.file_name) {
                Some(bytes) => store.store_asset(&asset.relative_path, bytes.clone())?,
                None => {
                    warn!(file = %asset.file_name, "asset bytes unavailable, skipping file copy")
                }
            }
        }

        // Terms: create missing ones parent-first, then attach.
        let mut by_taxonomy: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for term in &unit.terms {
            let local_term = ensure_term(store, term, term_map)?;
            by_taxonomy
                .entry(term.taxonomy.clone())
                .or_default()
                .push(local_term);
        }
        for (taxonomy, term_ids) in by_taxonomy {
            store.set_object_terms(written, &taxonomy, &term_ids)?;
        }
        for term in &unit.referenced_terms {
            ensure_term(store, term, term_map)?;
        }

        self.restore_hierarchy(store, unit, written, id_map)?;
        self.record_sync_status(store, settings, unit, written)?;
        self.link_translations(store, unit, written, id_map)?;

        Ok(Some(written.as_u64()))
    }

    /// Re-establishes tree shape using name+type matching.
    fn restore_hierarchy(
        &self,
        store: &dyn PostStore,
        unit: &PreparedUnit,
        written: ContentId,
        id_map: &BTreeMap<u64, u64>,
    ) -> SyncResult<()> {
        let Some(hierarchy) = &unit.hierarchy else {
            return Ok(());
        };

        if let Some(parent_ref) = &hierarchy.parent {
            let parent_id = match id_map.get(&parent_ref.source_id) {
                Some(mapped) => Some(ContentId::new(*mapped)),
                None => store
                    .find_by_name_type(&parent_ref.name, &parent_ref.object_type)?
                    .map(|p| p.id),
            };
            match parent_id {
                Some(parent_id) if parent_id != written => {
                    if let Some(mut object) = store.get(written)? {
                        object.parent = Some(parent_id);
                        store.update(&object)?;
                    }
                }
                _ => debug!(
                    name = %parent_ref.name,
                    "no destination parent matched, leaving object at top level"
                ),
            }
        }

        for child_ref in &hierarchy.children {
            let child_id = match id_map.get(&child_ref.source_id) {
                Some(mapped) => Some(ContentId::new(*mapped)),
                None => store
                    .find_by_name_type(&child_ref.name, &child_ref.object_type)?
                    .map(|c| c.id),
            };
            if let Some(child_id) = child_id {
                if child_id == written {
                    continue;
                }
                if let Some(mut child) = store.get(child_id)? {
                    child.parent = Some(written);
                    store.update(&child)?;
                }
            }
        }

        Ok(())
    }

    /// Post-persist bookkeeping: root, linked or orphan.
    fn record_sync_status(
        &self,
        store: &dyn PostStore,
        settings: &NodeSettings,
        unit: &PreparedUnit,
        written: ContentId,
    ) -> SyncResult<()> {
        let unit_gid = Gid::parse(&unit.gid)
            .ok_or_else(|| SyncError::MalformedGid(unit.gid.clone()))?;
        let home = Gid::local(settings.id.as_u64(), written.as_u64());

        if unit_gid == home {
            // The canonical copy came back to its origin.
            store.set_meta(written, sync_meta::GID, json!(unit_gid.encode()))?;
            store.set_meta(written, sync_meta::STATUS, json!("root"))?;
            return Ok(());
        }

        let origin_node = NodeId::new(unit_gid.origin_node_id());
        if unit_gid.is_local() && self.network.node(origin_node).is_none() {
            // The origin is unknown on this cluster: orphan cleanup.
            warn!(gid = %unit.gid, "origin node unknown, purging synchronization meta");
            store.delete_meta(written, sync_meta::GID)?;
            store.delete_meta(written, sync_meta::STATUS)?;
            store.delete_meta(written, sync_meta::CONNECTIONS)?;
            return Ok(());
        }

        store.set_meta(written, sync_meta::GID, json!(unit.gid.clone()))?;
        store.set_meta(written, sync_meta::STATUS, json!("linked"))?;

        let record = self.connections.local_record(self.node_id, written)?;
        let destination = DestinationKey::local(self.node_id.as_u64());
        if let Err(error) = self.connections.register(&unit_gid, &destination, record) {
            // Registration is best-effort here; the reconciliation
            // pass picks up whatever was missed.
            warn!(gid = %unit.gid, %error, "could not register copy with origin");
        }
        Ok(())
    }

    /// Establishes translation relationships among freshly imported
    /// siblings using the accumulated id mapping.
    fn link_translations(
        &self,
        store: &dyn PostStore,
        unit: &PreparedUnit,
        written: ContentId,
        id_map: &BTreeMap<u64, u64>,
    ) -> SyncResult<()> {
        let Some(language) = &unit.language else {
            return Ok(());
        };
        if language.siblings.is_empty() {
            return Ok(());
        }
        let Some((_tool, provider)) = self.translations.active(store) else {
            return Ok(());
        };

        let mut siblings = BTreeMap::new();
        for (code, sibling_gid) in &language.siblings {
            let Some(gid) = Gid::parse(sibling_gid) else {
                continue;
            };
            if let Some(new_id) = id_map.get(&gid.content_id()) {
                siblings.insert(code.clone(), ContentId::new(*new_id));
            }
        }
        if !siblings.is_empty() {
            provider.set_translations(store, written, &language.code, &siblings)?;
        }
        Ok(())
    }
}

/// Finds or creates a term, materializing its parent chain first.
fn ensure_term(
    store: &dyn PostStore,
    prepared: &PreparedTerm,
    term_map: &mut BTreeMap<u64, u64>,
) -> SyncResult<u64> {
    if let Some(existing) = term_map.get(&prepared.source_id) {
        return Ok(*existing);
    }

    let parent_id = match &prepared.parent {
        Some(parent) => Some(ensure_term(store, parent, term_map)?),
        None => None,
    };

    let local = match store.find_term(&prepared.taxonomy, &prepared.slug)? {
        Some(term) => term,
        None => {
            let mut draft = Term::new(&prepared.taxonomy, &prepared.name, &prepared.slug);
            draft.parent = parent_id;
            store.create_term(draft)?
        }
    };

    term_map.insert(prepared.source_id, local.id);
    Ok(local.id)
}
