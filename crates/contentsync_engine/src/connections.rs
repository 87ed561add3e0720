//! Connection maps.
//!
//! A connection map is the per-root registry of every node holding a
//! linked copy, stored as metadata on the root object. Only the origin
//! owns the authoritative map: mutations for remote roots are proxied
//! to the origin network. Reconciliation recomputes the map from
//! ground truth but never drops entries for peers that are merely
//! unreachable.

use crate::client::{PeerRegistry, RemoteClient, RequestMethod};
use crate::error::{SyncError, SyncResult};
use contentsync_gid::Gid;
use contentsync_protocol::{
    ConnectedCopy, ConnectionEntries, ConnectionMutation, DestinationKey, LinkRecord,
};
use contentsync_store::{sync_meta, ContentId, LocalNetwork, NodeId};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Result of one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// The reconciled map, as saved.
    pub entries: ConnectionEntries,
    /// Destinations dropped because their target no longer exists.
    pub dropped: Vec<String>,
    /// Discrepancies that could not be verified (unreachable peers).
    pub warnings: Vec<String>,
}

impl CheckReport {
    /// Returns true when every entry was verified against a live copy.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Admin-surface message for this report.
    pub fn message(&self) -> String {
        if self.warnings.is_empty() {
            format!(
                "success::connection map verified, {} entries ({} dropped)",
                self.entries.len(),
                self.dropped.len()
            )
        } else {
            format!(
                "success::connection map partially verified, {} entries kept unverified: {}",
                self.entries.len(),
                self.warnings.join("; ")
            )
        }
    }
}

/// Manages the connection maps of a network's root objects.
pub struct ConnectionMaps {
    network: Arc<LocalNetwork>,
    client: Arc<dyn RemoteClient>,
    peers: Arc<PeerRegistry>,
}

impl ConnectionMaps {
    /// Creates a manager for a network.
    pub fn new(
        network: Arc<LocalNetwork>,
        client: Arc<dyn RemoteClient>,
        peers: Arc<PeerRegistry>,
    ) -> Self {
        Self {
            network,
            client,
            peers,
        }
    }

    /// Reads the stored map of a root object.
    ///
    /// Missing objects and objects without a map read as empty.
    pub fn get(&self, node_id: NodeId, root_id: ContentId) -> SyncResult<ConnectionEntries> {
        let node = self
            .network
            .node(node_id)
            .ok_or(contentsync_store::StoreError::UnknownNode(node_id))?;
        let Some(object) = node.store().get(root_id)? else {
            return Ok(ConnectionEntries::new());
        };
        match object.meta_value(sync_meta::CONNECTIONS) {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(ConnectionEntries::new()),
        }
    }

    fn save(
        &self,
        node_id: NodeId,
        root_id: ContentId,
        entries: &ConnectionEntries,
    ) -> SyncResult<()> {
        let node = self
            .network
            .node(node_id)
            .ok_or(contentsync_store::StoreError::UnknownNode(node_id))?;
        node.store().set_meta(
            root_id,
            sync_meta::CONNECTIONS,
            serde_json::to_value(entries)?,
        )?;
        Ok(())
    }

    /// Registers a copy into a root's map.
    ///
    /// For a root local to this network the metadata is written
    /// directly. For a remote root the mutation is proxied to the
    /// origin network, which alone owns the map; the destination must
    /// then be a node of this network. Returns whether anything was
    /// recorded.
    pub fn register(
        &self,
        gid: &Gid,
        destination: &DestinationKey,
        record: LinkRecord,
    ) -> SyncResult<bool> {
        match gid.canonical_address() {
            None => self.mutate_local(gid, |entries| {
                entries.add(destination, record.clone());
            }),
            Some(address) => {
                self.mutate_remote(gid, &address, destination, record, RequestMethod::Post)
            }
        }
    }

    /// Removes a copy from a root's map. Returns whether it existed.
    pub fn unregister(&self, gid: &Gid, destination: &DestinationKey) -> SyncResult<bool> {
        match gid.canonical_address() {
            None => self.mutate_local(gid, |entries| {
                entries.remove(destination);
            }),
            Some(address) => {
                let placeholder = LinkRecord {
                    content_id: 0,
                    edit_url: String::new(),
                    site_url: String::new(),
                    display_url: String::new(),
                };
                self.mutate_remote(gid, &address, destination, placeholder, RequestMethod::Delete)
            }
        }
    }

    fn mutate_local(
        &self,
        gid: &Gid,
        mutate: impl FnOnce(&mut ConnectionEntries),
    ) -> SyncResult<bool> {
        let node_id = NodeId::new(gid.origin_node_id());
        let Some(node) = self.network.node(node_id) else {
            warn!(%gid, "connection map mutation for unknown origin node dropped");
            return Ok(false);
        };
        let root_id = ContentId::new(gid.content_id());
        if node.store().get(root_id)?.is_none() {
            warn!(%gid, "connection map mutation for missing root object dropped");
            return Ok(false);
        }

        let mut entries = self.get(node_id, root_id)?;
        mutate(&mut entries);
        self.save(node_id, root_id, &entries)?;
        Ok(true)
    }

    fn mutate_remote(
        &self,
        gid: &Gid,
        address: &str,
        destination: &DestinationKey,
        record: LinkRecord,
        method: RequestMethod,
    ) -> SyncResult<bool> {
        // The copy being (un)registered lives on this network; the
        // origin keys it under our address.
        let peer = self
            .peers
            .get(address)
            .ok_or_else(|| SyncError::NotConnected(address.to_string()))?;

        let localized = Gid::local(gid.origin_node_id(), gid.content_id()).encode();
        let mutation = ConnectionMutation {
            node_id: destination.node_id,
            network_address: Some(peer.origin_address.clone()),
            record,
        };

        self.client.send(
            &peer,
            &format!("posts/{localized}/connections"),
            &serde_json::to_value(&mutation)?,
            method,
        )?;
        Ok(true)
    }

    /// Reconciles a root's map against live reality.
    ///
    /// Local nodes are scanned for objects whose synced GID equals the
    /// root's; every configured remote peer is queried for the same.
    /// Local entries whose target is gone are dropped. Remote entries
    /// belonging to unreachable peers are preserved with a warning;
    /// a transient outage must not lose map data.
    pub fn check(&self, node_id: NodeId, root_id: ContentId) -> SyncResult<CheckReport> {
        let node = self
            .network
            .node(node_id)
            .ok_or(contentsync_store::StoreError::UnknownNode(node_id))?;
        let object = node
            .store()
            .get(root_id)?
            .ok_or(SyncError::RootNotFound(root_id.as_u64()))?;
        let gid = object
            .meta_str(sync_meta::GID)
            .and_then(Gid::parse)
            .ok_or_else(|| SyncError::MalformedGid(format!("object {root_id} has no valid gid")))?;

        let stored = self.get(node_id, root_id)?;
        let mut report = CheckReport::default();

        // Ground truth on the local network.
        for other_id in self.network.node_ids() {
            if other_id == node_id {
                continue;
            }
            let Some(other) = self.network.node(other_id) else {
                continue;
            };
            let copies = other
                .store()
                .find_by_meta(sync_meta::GID, &json!(gid.encode()))?;
            if let Some(copy) = copies.first() {
                report.entries.add(
                    &DestinationKey::local(other_id.as_u64()),
                    LinkRecord {
                        content_id: copy.id.as_u64(),
                        edit_url: other.settings().edit_url(copy.id),
                        site_url: other.settings().site_url.clone(),
                        display_url: other.settings().display_url(copy.id),
                    },
                );
            }
        }
        for (local_node, record) in &stored.local {
            let key = DestinationKey::local(*local_node);
            if report.entries.get(&key).is_none() {
                report
                    .dropped
                    .push(format!("node {local_node} (content {})", record.content_id));
            }
        }

        // Ground truth on remote peers.
        for address in self.peers.addresses() {
            let Some(peer) = self.peers.get(&address) else {
                continue;
            };
            let qualified = Gid::remote(
                gid.origin_node_id(),
                gid.content_id(),
                peer.origin_address.clone(),
            );
            let body = json!({ "gid": qualified.encode() });
            match self
                .client
                .send(&peer, "connected_posts", &body, RequestMethod::Get)
            {
                Ok(value) => {
                    let copies: Vec<ConnectedCopy> = serde_json::from_value(value)?;
                    for copy in copies {
                        report.entries.add(
                            &DestinationKey::remote(copy.node_id, &address),
                            copy.record,
                        );
                    }
                }
                Err(error) => {
                    warn!(%address, %error, "peer unreachable during reconciliation, preserving entries");
                    if let Some(nodes) = stored.remote.get(&address) {
                        for (remote_node, record) in nodes {
                            report.entries.add(
                                &DestinationKey::remote(*remote_node, &address),
                                record.clone(),
                            );
                        }
                    }
                    report
                        .warnings
                        .push(format!("{address} unreachable: {error}"));
                }
            }
        }

        // Entries for networks we no longer have a connection for are
        // unverifiable, not deletable.
        for (address, nodes) in &stored.remote {
            if self.peers.get(address).is_none() {
                for (remote_node, record) in nodes {
                    report
                        .entries
                        .add(&DestinationKey::remote(*remote_node, address), record.clone());
                }
                report
                    .warnings
                    .push(format!("{address} is not configured as a peer"));
            }
        }

        self.save(node_id, root_id, &report.entries)?;
        Ok(report)
    }

    /// Returns the peer registry.
    pub fn peers(&self) -> &Arc<PeerRegistry> {
        &self.peers
    }

    /// Returns the client used for proxied mutations.
    pub fn client(&self) -> &Arc<dyn RemoteClient> {
        &self.client
    }

    /// Builds the link record for a copy held on a local node.
    pub fn local_record(&self, node_id: NodeId, content_id: ContentId) -> SyncResult<LinkRecord> {
        let node = self
            .network
            .node(node_id)
            .ok_or(contentsync_store::StoreError::UnknownNode(node_id))?;
        Ok(LinkRecord {
            content_id: content_id.as_u64(),
            edit_url: node.settings().edit_url(content_id),
            site_url: node.settings().site_url.clone(),
            display_url: node.settings().display_url(content_id),
        })
    }

    /// Exposes the network for collaborators that need node lookups.
    pub fn network(&self) -> &Arc<LocalNetwork> {
        &self.network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ConnectionCredential, MockRemoteClient, PeerConnection};
    use contentsync_store::{ContentObject, NodeSettings, PostStore};

    struct Fixture {
        network: Arc<LocalNetwork>,
        client: Arc<MockRemoteClient>,
        peers: Arc<PeerRegistry>,
        maps: ConnectionMaps,
    }

    fn fixture() -> Fixture {
        let network = Arc::new(LocalNetwork::new());
        network.add_memory_node(NodeSettings::new(NodeId::new(1), "https://one.example"));
        network.add_memory_node(NodeSettings::new(NodeId::new(2), "https://two.example"));

        let client = Arc::new(MockRemoteClient::new());
        let peers = Arc::new(PeerRegistry::new());
        let maps = ConnectionMaps::new(
            Arc::clone(&network),
            Arc::clone(&client) as Arc<dyn RemoteClient>,
            Arc::clone(&peers),
        );
        Fixture {
            network,
            client,
            peers,
            maps,
        }
    }

    fn seed_root(fixture: &Fixture) -> ContentId {
        let node = fixture.network.node(NodeId::new(1)).unwrap();
        let root = node
            .store()
            .create(
                ContentObject::new("hello", "post")
                    .with_meta(sync_meta::GID, json!("1-1"))
                    .with_meta(sync_meta::STATUS, json!("root")),
            )
            .unwrap();
        root.id
    }

    fn seed_linked_copy(fixture: &Fixture, gid: &str) -> ContentId {
        let node = fixture.network.node(NodeId::new(2)).unwrap();
        let copy = node
            .store()
            .create(
                ContentObject::new("hello", "post")
                    .with_meta(sync_meta::GID, json!(gid))
                    .with_meta(sync_meta::STATUS, json!("linked")),
            )
            .unwrap();
        copy.id
    }

    #[test]
    fn register_and_get_local() {
        let fixture = fixture();
        let root_id = seed_root(&fixture);
        let gid = Gid::local(1, root_id.as_u64());

        let record = fixture.maps.local_record(NodeId::new(2), ContentId::new(50)).unwrap();
        assert!(fixture
            .maps
            .register(&gid, &DestinationKey::local(2), record)
            .unwrap());

        let entries = fixture.maps.get(NodeId::new(1), root_id).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(&DestinationKey::local(2)).unwrap().content_id, 50);

        assert!(fixture
            .maps
            .unregister(&gid, &DestinationKey::local(2))
            .unwrap());
        assert!(fixture.maps.get(NodeId::new(1), root_id).unwrap().is_empty());
    }

    #[test]
    fn register_for_unknown_origin_is_dropped() {
        let fixture = fixture();
        let record = fixture.maps.local_record(NodeId::new(2), ContentId::new(50)).unwrap();
        assert!(!fixture
            .maps
            .register(&Gid::local(9, 1), &DestinationKey::local(2), record)
            .unwrap());
    }

    #[test]
    fn remote_registration_is_proxied_to_origin() {
        let fixture = fixture();
        fixture.peers.add(PeerConnection::new(
            "peer.example",
            ConnectionCredential::new("login", "secret"),
            "one.example",
        ));
        fixture.client.respond("posts/", json!(true));

        let gid = Gid::remote(3, 12, "peer.example");
        let record = fixture.maps.local_record(NodeId::new(2), ContentId::new(50)).unwrap();
        assert!(fixture
            .maps
            .register(&gid, &DestinationKey::local(2), record)
            .unwrap());

        let calls = fixture.client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "posts/3-12/connections");
        assert_eq!(calls[0].2["node_id"], 2);
        assert_eq!(calls[0].2["network_address"], "one.example");
    }

    #[test]
    fn remote_registration_without_connection_fails() {
        let fixture = fixture();
        let gid = Gid::remote(3, 12, "peer.example");
        let record = fixture.maps.local_record(NodeId::new(2), ContentId::new(50)).unwrap();
        let err = fixture
            .maps
            .register(&gid, &DestinationKey::local(2), record)
            .unwrap_err();
        assert!(matches!(err, SyncError::NotConnected(_)));
    }

    #[test]
    fn check_rebuilds_live_local_entries() {
        let fixture = fixture();
        let root_id = seed_root(&fixture);
        let gid = Gid::local(1, root_id.as_u64());
        let copy_id = seed_linked_copy(&fixture, &gid.encode());

        let report = fixture.maps.check(NodeId::new(1), root_id).unwrap();
        assert!(report.is_clean());
        assert!(report.dropped.is_empty());
        assert_eq!(
            report
                .entries
                .get(&DestinationKey::local(2))
                .unwrap()
                .content_id,
            copy_id.as_u64()
        );
    }

    #[test]
    fn check_drops_local_entries_whose_target_is_gone() {
        let fixture = fixture();
        let root_id = seed_root(&fixture);
        let gid = Gid::local(1, root_id.as_u64());
        let copy_id = seed_linked_copy(&fixture, &gid.encode());

        let record = fixture.maps.local_record(NodeId::new(2), copy_id).unwrap();
        fixture
            .maps
            .register(&gid, &DestinationKey::local(2), record)
            .unwrap();

        // The copy disappears behind the map's back.
        let node = fixture.network.node(NodeId::new(2)).unwrap();
        node.store().delete(copy_id, true).unwrap();

        let report = fixture.maps.check(NodeId::new(1), root_id).unwrap();
        assert!(report.is_clean());
        assert!(report.entries.is_empty());
        assert_eq!(report.dropped.len(), 1);

        // The reconciled (empty) map was saved back.
        let stored = fixture.maps.get(NodeId::new(1), root_id).unwrap();
        assert!(stored.is_empty());
    }

    #[test]
    fn check_preserves_remote_entries_when_peer_unreachable() {
        let fixture = fixture();
        let root_id = seed_root(&fixture);
        let gid = Gid::local(1, root_id.as_u64());
        let copy_id = seed_linked_copy(&fixture, &gid.encode());

        fixture.peers.add(PeerConnection::new(
            "peer.example",
            ConnectionCredential::new("login", "secret"),
            "one.example",
        ));
        // No scripted response: every call to the peer fails.

        let local = fixture.maps.local_record(NodeId::new(2), copy_id).unwrap();
        fixture
            .maps
            .register(&gid, &DestinationKey::local(2), local)
            .unwrap();
        let remote_record = LinkRecord {
            content_id: 9,
            edit_url: "https://peer.example/admin/content/9".into(),
            site_url: "https://peer.example".into(),
            display_url: "https://peer.example/?p=9".into(),
        };
        fixture
            .maps
            .mutate_local(&gid, |entries| {
                entries.add(&DestinationKey::remote(1, "peer.example"), remote_record.clone());
            })
            .unwrap();

        let report = fixture.maps.check(NodeId::new(1), root_id).unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.warnings.len(), 1);
        // The remote entry survived the outage; the local entry
        // reflects live verification.
        assert_eq!(
            report
                .entries
                .get(&DestinationKey::remote(1, "peer.example"))
                .unwrap()
                .content_id,
            9
        );
        assert!(report.entries.get(&DestinationKey::local(2)).is_some());
        assert!(report.message().contains("unverified"));
    }

    #[test]
    fn check_refreshes_remote_entries_from_reachable_peer() {
        let fixture = fixture();
        let root_id = seed_root(&fixture);
        let gid = Gid::local(1, root_id.as_u64());

        fixture.peers.add(PeerConnection::new(
            "peer.example",
            ConnectionCredential::new("login", "secret"),
            "one.example",
        ));
        fixture.client.respond(
            "connected_posts",
            json!([{
                "node_id": 4,
                "record": {
                    "content_id": 77,
                    "edit_url": "https://peer.example/admin/content/77",
                    "site_url": "https://peer.example",
                    "display_url": "https://peer.example/?p=77"
                }
            }]),
        );

        let report = fixture.maps.check(NodeId::new(1), root_id).unwrap();
        assert!(report.is_clean());
        assert_eq!(
            report
                .entries
                .get(&DestinationKey::remote(4, "peer.example"))
                .unwrap()
                .content_id,
            77
        );

        // The query carried the GID qualified with our own address.
        let calls = fixture.client.calls();
        assert_eq!(calls[0].2["gid"], format!("1-{}-one.example", root_id.as_u64()));
    }
}
