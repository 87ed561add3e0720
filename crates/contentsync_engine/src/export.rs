//! The export engine.
//!
//! Orchestrates the preparer over a root object and its transitive
//! closure: thumbnails (always), nested references (when configured)
//! and local sibling translations (when configured). The result map is
//! keyed by origin local id; positions are reserved before preparing so
//! reference cycles terminate.

use crate::error::{SyncError, SyncResult};
use crate::prepare::ContentPreparer;
use contentsync_gid::Gid;
use contentsync_protocol::{ExportConfig, ExportSet};
use contentsync_store::{ContentId, PostStore};
use tracing::warn;

/// Builds complete export sets for root objects.
pub struct ExportEngine<'a> {
    preparer: &'a ContentPreparer,
    store: &'a dyn PostStore,
}

impl<'a> ExportEngine<'a> {
    /// Creates an engine over a node's preparer and store.
    pub fn new(preparer: &'a ContentPreparer, store: &'a dyn PostStore) -> Self {
        Self { preparer, store }
    }

    /// Exports one root object and its closure.
    pub fn export(&self, root_id: u64, config: &ExportConfig) -> SyncResult<ExportSet> {
        self.export_many(&[root_id], config)
    }

    /// Exports several roots into one set.
    ///
    /// An object reached from more than one root is still prepared
    /// exactly once.
    pub fn export_many(&self, root_ids: &[u64], config: &ExportConfig) -> SyncResult<ExportSet> {
        let mut set = ExportSet::new();
        for root_id in root_ids {
            self.process(*root_id, config, &mut set, true)?;
        }
        Ok(set)
    }

    fn process(
        &self,
        id: u64,
        config: &ExportConfig,
        set: &mut ExportSet,
        is_root: bool,
    ) -> SyncResult<()> {
        // Reserving first means an object already being processed is
        // treated as seen, which breaks reference cycles.
        if !set.reserve(id) {
            return Ok(());
        }

        let prepared = self
            .preparer
            .prepare(self.store, ContentId::new(id), config)?;

        let mut unit = match prepared {
            Some(unit) => unit,
            None if is_root => return Err(SyncError::RootNotFound(id)),
            None => {
                warn!(id, "referenced object vanished during export, dropping");
                set.release(id);
                return Ok(());
            }
        };
        unit.is_root = is_root;

        let thumbnail = unit.thumbnail;
        let nested = unit.nested.clone();
        let sibling_gids: Vec<String> = unit
            .language
            .as_ref()
            .map(|language| language.siblings.values().cloned().collect())
            .unwrap_or_default();

        set.fill(unit);

        // The destination must have the thumbnail to render, so it is
        // always part of the closure.
        if let Some(thumbnail) = thumbnail {
            self.process(thumbnail, config, set, false)?;
        }

        if config.append_nested {
            for nested_id in nested {
                self.process(nested_id, config, set, false)?;
            }
        }

        if config.translations {
            let own_node = self.preparer.settings().id.as_u64();
            for sibling in sibling_gids {
                let Some(gid) = Gid::parse(&sibling) else {
                    continue;
                };
                if gid.is_local() && gid.origin_node_id() == own_node {
                    self.process(gid.content_id(), config, set, false)?;
                }
            }
        }

        Ok(())
    }
}
