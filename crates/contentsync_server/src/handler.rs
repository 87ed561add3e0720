//! Request handlers for the peer endpoints.

use crate::auth::{ConnectionLedger, CredentialStore};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use contentsync_engine::{
    ConflictResolver, ConnectionMaps, ContentPreparer, Distributor, ExportEngine, ImportEngine,
    MediaBag, PeerRegistry, RemoteClient, RequestMethod,
};
use contentsync_gid::{is_valid_wire_gid, Gid};
use contentsync_protocol::{
    AddConnectionRequest, ConnectedCopy, ConnectionMutation, DestinationKey, DestinationState,
    DistributeItemRequest, ExportSet, LinkRecord, PostSummary, PrepareRequest, UpdateItemRequest,
};
use contentsync_store::{
    sync_meta, ContentId, LocalNetwork, Node, NodeId, TranslationRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;

/// Shared state of all handlers of one serving node.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// The local network.
    pub network: Arc<LocalNetwork>,
    /// Distributor owning the distribution items of this network.
    pub distributor: Arc<Distributor>,
    /// Connection-map manager.
    pub connections: Arc<ConnectionMaps>,
    /// Outbound peer connections.
    pub peers: Arc<PeerRegistry>,
    /// Translation providers.
    pub translations: Arc<TranslationRegistry>,
    /// Client used for completion callbacks.
    pub client: Arc<dyn RemoteClient>,
    /// Accepted inbound credentials.
    pub credentials: CredentialStore,
    /// Mutual-connection ledger.
    pub ledger: ConnectionLedger,
}

impl HandlerContext {
    /// Creates a context.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ServerConfig,
        network: Arc<LocalNetwork>,
        distributor: Arc<Distributor>,
        connections: Arc<ConnectionMaps>,
        peers: Arc<PeerRegistry>,
        translations: Arc<TranslationRegistry>,
        client: Arc<dyn RemoteClient>,
    ) -> Self {
        Self {
            config,
            network,
            distributor,
            connections,
            peers,
            translations,
            client,
            credentials: CredentialStore::new(),
            ledger: ConnectionLedger::new(),
        }
    }

    fn serving_node(&self) -> ServerResult<Arc<Node>> {
        self.network
            .node(self.config.node_id)
            .ok_or_else(|| ServerError::NotFound(format!("node {}", self.config.node_id)))
    }

    /// Strips this network's own address off a GID.
    fn localize(&self, gid: &Gid) -> Gid {
        match gid.canonical_address() {
            Some(address) if address == self.config.network_address => {
                Gid::local(gid.origin_node_id(), gid.content_id())
            }
            _ => gid.clone(),
        }
    }
}

/// Handler for peer requests.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a handler over a context.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// `site_name`: the serving site's display name.
    pub fn handle_site_name(&self) -> ServerResult<Value> {
        Ok(json!(self.context.config.site_name))
    }

    /// `check_auth`: reached only after credential verification.
    pub fn handle_check_auth(&self) -> ServerResult<Value> {
        Ok(json!(true))
    }

    /// `add_connection`: records the caller in the connection ledger.
    pub fn handle_add_connection(&self, body: &Value) -> ServerResult<Value> {
        let request: AddConnectionRequest = serde_json::from_value(body.clone())?;
        if request.address.is_empty() {
            return Err(ServerError::InvalidRequest("address must not be empty".into()));
        }
        self.context.ledger.add(&request.address);
        Ok(json!(true))
    }

    /// `posts` (GET): lists the serving node's content.
    pub fn handle_posts_list(&self) -> ServerResult<Value> {
        let node = self.context.serving_node()?;
        let mut listing = Vec::new();
        for object in node.store().list()? {
            listing.push(PostSummary {
                id: object.id.as_u64(),
                name: object.name.clone(),
                title: object.title.clone(),
                object_type: object.object_type.clone(),
                status: object.status.clone(),
                gid: object.meta_str(sync_meta::GID).map(str::to_string),
            });
        }
        Ok(serde_json::to_value(listing)?)
    }

    /// `posts/{id}` (GET): one content object.
    pub fn handle_posts_get(&self, id: &str) -> ServerResult<Value> {
        let id: u64 = id
            .parse()
            .map_err(|_| ServerError::InvalidRequest(format!("invalid content id: {id}")))?;
        let node = self.context.serving_node()?;
        let object = node
            .store()
            .get(ContentId::new(id))?
            .ok_or_else(|| ServerError::NotFound(format!("content {id}")))?;
        Ok(serde_json::to_value(object)?)
    }

    /// `posts/prepare` (POST): prepares a root for transfer.
    pub fn handle_posts_prepare(&self, body: &Value) -> ServerResult<Value> {
        let request: PrepareRequest = serde_json::from_value(body.clone())?;
        let node = self.context.serving_node()?;
        if node.store().get(ContentId::new(request.id))?.is_none() {
            return Err(ServerError::NotFound(format!("content {}", request.id)));
        }

        let preparer = ContentPreparer::for_node(node.settings())?
            .with_translations(Arc::clone(&self.context.translations));
        let set = ExportEngine::new(&preparer, node.store().as_ref())
            .export(request.id, &request.config)?;
        Ok(serde_json::to_value(set)?)
    }

    /// `posts/{gid}/connections` (GET): the root's connection map.
    pub fn handle_connections_get(&self, gid: &str) -> ServerResult<Value> {
        let gid = self.owned_gid(gid)?;
        let entries = self.context.connections.get(
            NodeId::new(gid.origin_node_id()),
            ContentId::new(gid.content_id()),
        )?;
        Ok(serde_json::to_value(entries)?)
    }

    /// `posts/{gid}/connections` (POST): registers a copy.
    pub fn handle_connections_add(&self, gid: &str, body: &Value) -> ServerResult<Value> {
        let gid = self.owned_gid(gid)?;
        let mutation: ConnectionMutation = serde_json::from_value(body.clone())?;
        let destination = destination_of(&mutation);
        let recorded =
            self.context
                .connections
                .register(&gid, &destination, mutation.record)?;
        Ok(json!(recorded))
    }

    /// `posts/{gid}/connections` (DELETE): removes a copy.
    pub fn handle_connections_remove(&self, gid: &str, body: &Value) -> ServerResult<Value> {
        let gid = self.owned_gid(gid)?;
        let mutation: ConnectionMutation = serde_json::from_value(body.clone())?;
        let destination = destination_of(&mutation);
        let removed = self.context.connections.unregister(&gid, &destination)?;
        Ok(json!(removed))
    }

    /// `connected_posts`: lists this network's live copies of a GID.
    pub fn handle_connected_posts(&self, body: &Value) -> ServerResult<Value> {
        let gid = body
            .get("gid")
            .and_then(Value::as_str)
            .ok_or_else(|| ServerError::InvalidRequest("missing gid".into()))?;
        if !is_valid_wire_gid(gid) {
            return Err(ServerError::InvalidRequest(format!("malformed gid: {gid}")));
        }
        let parsed = Gid::parse(gid)
            .ok_or_else(|| ServerError::InvalidRequest(format!("malformed gid: {gid}")))?;
        let localized = self.context.localize(&parsed);

        let mut copies = Vec::new();
        for node_id in self.context.network.node_ids() {
            let Some(node) = self.context.network.node(node_id) else {
                continue;
            };
            let found = node
                .store()
                .find_by_meta(sync_meta::GID, &json!(localized.encode()))?;
            if let Some(object) = found.first() {
                copies.push(ConnectedCopy {
                    node_id: node_id.as_u64(),
                    record: LinkRecord {
                        content_id: object.id.as_u64(),
                        edit_url: node.settings().edit_url(object.id),
                        site_url: node.settings().site_url.clone(),
                        display_url: node.settings().display_url(object.id),
                    },
                });
            }
        }
        Ok(serde_json::to_value(copies)?)
    }

    /// `distribution/distribute-item`: imports an inbound transfer and
    /// reports completion back to the origin.
    ///
    /// The response only acknowledges acceptance; the true terminal
    /// state travels through the separate update-item callback, since
    /// background execution is unavailable inside a request cycle.
    pub fn handle_distribute_item(
        &self,
        body: &Value,
        origin: Option<&str>,
    ) -> ServerResult<Value> {
        let request: DistributeItemRequest = serde_json::from_value(body.clone())?;
        let dest_node = NodeId::new(request.node_id);
        let node = self
            .context
            .network
            .node(dest_node)
            .ok_or_else(|| ServerError::NotFound(format!("node {dest_node}")))?;

        // GIDs that carry our own address describe content rooted
        // here; localize them before matching.
        let mut set: ExportSet = request.units.clone();
        for source_id in set.source_ids() {
            if let Some(unit) = set.get_mut(source_id) {
                if let Some(parsed) = Gid::parse(&unit.gid) {
                    unit.gid = self.context.localize(&parsed).encode();
                }
            }
        }
        let mut resolution = ConflictResolver::new(node.store().as_ref()).resolve(&set)?;
        resolution.merge_overrides(&request.decisions);

        let mut media = MediaBag::new();
        for (file_name, encoded) in &request.media {
            let bytes = BASE64.decode(encoded).map_err(|_| {
                ServerError::InvalidRequest(format!("undecodable media entry: {file_name}"))
            })?;
            media.insert(file_name.clone(), bytes);
        }

        let importer = ImportEngine::new(
            Arc::clone(&self.context.network),
            dest_node,
            Arc::clone(&self.context.connections),
            Arc::clone(&self.context.translations),
        );
        let report = importer.import(&set, &resolution.decisions, &media)?;

        let state = if report.success() {
            DestinationState::Success
        } else {
            DestinationState::Failed
        };
        self.send_completion(&request, origin, state, report.first_error.as_deref());

        Ok(json!({
            "accepted": true,
            "imported": report.outcomes.len(),
            "status": state,
        }))
    }

    /// `distribution/update-item`: a destination reports completion.
    pub fn handle_update_item(&self, body: &Value) -> ServerResult<Value> {
        let request: UpdateItemRequest = serde_json::from_value(body.clone())?;
        let updated = self.context.distributor.update_item(
            request.item_id,
            &request.destination,
            request.state,
            request.message.as_deref(),
        );
        if updated {
            Ok(json!(true))
        } else {
            Err(ServerError::NotFound(format!(
                "distribution item {} destination {}",
                request.item_id, request.destination
            )))
        }
    }

    /// Validates a path GID and checks this network owns it.
    fn owned_gid(&self, gid: &str) -> ServerResult<Gid> {
        if !is_valid_wire_gid(gid) {
            return Err(ServerError::InvalidRequest(format!("malformed gid: {gid}")));
        }
        let parsed = Gid::parse(gid)
            .ok_or_else(|| ServerError::InvalidRequest(format!("malformed gid: {gid}")))?;
        let localized = self.context.localize(&parsed);
        if localized.is_remote() {
            return Err(ServerError::InvalidRequest(format!(
                "gid {gid} is not owned by this network"
            )));
        }
        if self
            .context
            .network
            .node(NodeId::new(localized.origin_node_id()))
            .is_none()
        {
            return Err(ServerError::NotFound(format!(
                "origin node {}",
                localized.origin_node_id()
            )));
        }
        Ok(localized)
    }

    fn send_completion(
        &self,
        request: &DistributeItemRequest,
        origin: Option<&str>,
        state: DestinationState,
        message: Option<&str>,
    ) {
        let Some(origin) = origin else {
            warn!("distribute-item request carried no origin, skipping completion callback");
            return;
        };
        let Some(peer) = self.context.peers.get(origin) else {
            warn!(%origin, "no peer connection for origin, skipping completion callback");
            return;
        };

        let callback = UpdateItemRequest {
            item_id: request.item_id,
            destination: request.destination.clone(),
            state,
            message: message.map(str::to_string),
        };
        let body = match serde_json::to_value(&callback) {
            Ok(body) => body,
            Err(error) => {
                warn!(%error, "could not serialize completion callback");
                return;
            }
        };
        if let Err(error) =
            self.context
                .client
                .send(&peer, "distribution/update-item", &body, RequestMethod::Post)
        {
            warn!(%origin, %error, "completion callback failed");
        }
    }
}

fn destination_of(mutation: &ConnectionMutation) -> DestinationKey {
    match &mutation.network_address {
        Some(address) if !address.is_empty() => {
            DestinationKey::remote(mutation.node_id, address)
        }
        _ => DestinationKey::local(mutation.node_id),
    }
}
