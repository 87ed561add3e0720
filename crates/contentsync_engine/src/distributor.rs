//! The distributor.
//!
//! Fans one export set out to N destinations. Local destinations run
//! the import synchronously inside a node-switch guard; remote
//! destinations receive the serialized set and report true completion
//! later through the update-item callback, because the peer answers as
//! soon as it has accepted the work.

use crate::archive::MediaBag;
use crate::client::{PeerRegistry, RemoteClient, RequestMethod};
use crate::conflict::ConflictResolver;
use crate::connections::ConnectionMaps;
use crate::error::{SyncError, SyncResult};
use crate::export::ExportEngine;
use crate::import::ImportEngine;
use crate::prepare::ContentPreparer;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use contentsync_gid::Gid;
use contentsync_protocol::{
    DestinationKey, DestinationState, DistributeItemRequest, DistributionItem, ExportConfig,
    ExportSet,
};
use contentsync_store::{
    sync_meta, ContentId, LocalNetwork, NodeId, PostStore, TranslationRegistry,
};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-destination options of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct DistributionOptions {
    /// Caller-supplied conflict decisions, merged over the resolver's.
    pub decisions: BTreeMap<u64, contentsync_protocol::ConflictDecision>,
}

/// Marks a content object as the synchronization root, minting its GID
/// if it does not already carry one.
pub fn mark_as_root(
    store: &dyn PostStore,
    node_id: NodeId,
    content_id: ContentId,
) -> SyncResult<Gid> {
    let object = store
        .get(content_id)?
        .ok_or(SyncError::RootNotFound(content_id.as_u64()))?;

    if let Some(existing) = object.meta_str(sync_meta::GID).and_then(Gid::parse) {
        return Ok(existing);
    }

    let gid = Gid::local(node_id.as_u64(), content_id.as_u64());
    store.set_meta(content_id, sync_meta::GID, json!(gid.encode()))?;
    store.set_meta(content_id, sync_meta::STATUS, json!("root"))?;
    Ok(gid)
}

/// Per-root mutex domain.
///
/// No two concurrent imports may write the same root's content or
/// connection map; locks are keyed by encoded root GID and held only
/// around local mutation, never across network I/O.
struct RootLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RootLocks {
    fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    fn acquire(&self, gid: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock();
        Arc::clone(locks.entry(gid.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))))
    }
}

/// Pushes export sets to destinations and tracks delivery state.
pub struct Distributor {
    network: Arc<LocalNetwork>,
    client: Arc<dyn RemoteClient>,
    peers: Arc<PeerRegistry>,
    connections: Arc<ConnectionMaps>,
    translations: Arc<TranslationRegistry>,
    items: RwLock<BTreeMap<u64, DistributionItem>>,
    next_item_id: AtomicU64,
    locks: RootLocks,
}

impl Distributor {
    /// Creates a distributor for a network.
    pub fn new(
        network: Arc<LocalNetwork>,
        client: Arc<dyn RemoteClient>,
        peers: Arc<PeerRegistry>,
        connections: Arc<ConnectionMaps>,
        translations: Arc<TranslationRegistry>,
    ) -> Self {
        Self {
            network,
            client,
            peers,
            connections,
            translations,
            items: RwLock::new(BTreeMap::new()),
            next_item_id: AtomicU64::new(1),
            locks: RootLocks::new(),
        }
    }

    /// Distributes one root object to the given destinations.
    ///
    /// The root is marked synced first, then exported once; every
    /// destination receives the same set. A failed destination is
    /// marked `failed` and the fan-out moves on; callers re-trigger
    /// manually if they want a retry.
    pub fn distribute(
        &self,
        source_node: NodeId,
        root_id: ContentId,
        config: &ExportConfig,
        destinations: &BTreeMap<DestinationKey, DistributionOptions>,
    ) -> SyncResult<DistributionItem> {
        let node = self
            .network
            .node(source_node)
            .ok_or(contentsync_store::StoreError::UnknownNode(source_node))?;
        let store = Arc::clone(node.store());

        let gid = mark_as_root(store.as_ref(), source_node, root_id)?;
        let preparer = ContentPreparer::for_node(node.settings())?
            .with_translations(Arc::clone(&self.translations));
        let set = ExportEngine::new(&preparer, store.as_ref()).export(root_id.as_u64(), config)?;
        let media = self.collect_media(store.as_ref(), &set)?;

        let keys: Vec<String> = destinations.keys().map(DestinationKey::encode).collect();
        let item_id = self.next_item_id.fetch_add(1, Ordering::SeqCst);
        let item = DistributionItem::new(item_id, gid.encode(), &keys);
        self.items.write().insert(item_id, item);

        for (destination, options) in destinations {
            let key = destination.encode();
            self.set_state(item_id, &key, DestinationState::Started);

            if destination.is_local() {
                let state = match self.deliver_local(&gid, &set, destination, options, &media) {
                    Ok(()) => DestinationState::Success,
                    Err(error) => {
                        warn!(%key, %error, "local delivery failed");
                        DestinationState::Failed
                    }
                };
                self.set_state(item_id, &key, state);
            } else {
                match self.deliver_remote(item_id, &set, destination, options, &media) {
                    // The peer has only accepted the work; completion
                    // arrives through the update-item callback, which
                    // with a fast peer may already have landed, so a
                    // successful send changes nothing here.
                    Ok(()) => {}
                    Err(error) => {
                        warn!(%key, %error, "remote delivery failed");
                        self.set_state(item_id, &key, DestinationState::Failed);
                    }
                }
            }
        }

        Ok(self
            .item(item_id)
            .unwrap_or_else(|| DistributionItem::new(item_id, gid.encode(), &keys)))
    }

    /// Applies a destination's status callback. Returns false for
    /// unknown items or destinations.
    pub fn update_item(
        &self,
        item_id: u64,
        destination: &str,
        state: DestinationState,
        message: Option<&str>,
    ) -> bool {
        if let Some(message) = message {
            debug!(item_id, destination, %message, "destination reported status");
        }
        match self.items.write().get_mut(&item_id) {
            Some(item) => item.set_state(destination, state),
            None => false,
        }
    }

    /// Returns a snapshot of one distribution item.
    pub fn item(&self, item_id: u64) -> Option<DistributionItem> {
        self.items.read().get(&item_id).cloned()
    }

    fn set_state(&self, item_id: u64, destination: &str, state: DestinationState) {
        if let Some(item) = self.items.write().get_mut(&item_id) {
            item.set_state(destination, state);
        }
    }

    fn collect_media(&self, store: &dyn PostStore, set: &ExportSet) -> SyncResult<MediaBag> {
        let mut media = MediaBag::new();
        for unit in set.iter() {
            let Some(asset) = &unit.asset else {
                continue;
            };
            match store.asset_bytes(&asset.relative_path)? {
                Some(bytes) => {
                    media.insert(asset.file_name.clone(), bytes);
                }
                None => warn!(path = %asset.relative_path, "asset file missing at export time"),
            }
        }
        Ok(media)
    }

    fn deliver_local(
        &self,
        gid: &Gid,
        set: &ExportSet,
        destination: &DestinationKey,
        options: &DistributionOptions,
        media: &MediaBag,
    ) -> SyncResult<()> {
        let dest_node = NodeId::new(destination.node_id);

        // Local mutation of one root is serialized; the lock is not
        // held around any remote call.
        let lock = self.locks.acquire(&gid.encode());
        let _lock_guard = lock.lock();

        let context = self.network.switch_to(dest_node)?;
        let store = Arc::clone(context.node().store());

        let mut resolution = ConflictResolver::new(store.as_ref()).resolve(set)?;
        resolution.merge_overrides(&options.decisions);

        let engine = ImportEngine::new(
            Arc::clone(&self.network),
            dest_node,
            Arc::clone(&self.connections),
            Arc::clone(&self.translations),
        );
        let report = engine.import(set, &resolution.decisions, media)?;
        if report.success() {
            Ok(())
        } else {
            Err(SyncError::ImportFailed {
                message: report
                    .first_error
                    .unwrap_or_else(|| "unknown import failure".into()),
            })
        }
    }

    fn deliver_remote(
        &self,
        item_id: u64,
        set: &ExportSet,
        destination: &DestinationKey,
        options: &DistributionOptions,
        media: &MediaBag,
    ) -> SyncResult<()> {
        let address = destination
            .network_address
            .as_deref()
            .ok_or_else(|| SyncError::UnknownDestination(destination.encode()))?;
        let peer = self
            .peers
            .get(address)
            .ok_or_else(|| SyncError::NotConnected(address.to_string()))?;

        // Qualify every GID with our own address so the peer can route
        // identity back to this network.
        let mut qualified = set.clone();
        for source_id in qualified.source_ids() {
            if let Some(unit) = qualified.get_mut(source_id) {
                unit.qualify_gid(&peer.origin_address);
            }
        }

        let request = DistributeItemRequest {
            item_id,
            destination: destination.encode(),
            node_id: destination.node_id,
            units: qualified,
            decisions: options.decisions.clone(),
            media: media
                .iter()
                .map(|(file_name, bytes)| (file_name.clone(), BASE64.encode(bytes)))
                .collect(),
        };

        self.client.send(
            &peer,
            "distribution/distribute-item",
            &serde_json::to_value(&request)?,
            RequestMethod::Post,
        )?;
        Ok(())
    }
}
