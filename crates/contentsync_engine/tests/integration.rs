//! End-to-end flows across the engine: export on one node, distribute,
//! import on another, bookkeeping on both ends.

use contentsync_engine::{
    read_archive, write_archive, ConflictResolver, ConnectionMaps, ContentPreparer,
    DistributionOptions, Distributor, ExportEngine, ImportEngine, MediaBag, MockRemoteClient,
    RemoteClient,
};
use contentsync_engine::PeerRegistry;
use contentsync_gid::Gid;
use contentsync_protocol::{
    ConflictAction, DestinationKey, DestinationState, ExportConfig,
};
use contentsync_store::{
    sync_meta, AssetFile, ContentObject, LocalNetwork, NodeId, NodeSettings, PostStore,
    TranslationRegistry,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

struct Cluster {
    network: Arc<LocalNetwork>,
    connections: Arc<ConnectionMaps>,
    distributor: Distributor,
}

fn cluster() -> Cluster {
    let network = Arc::new(LocalNetwork::new());
    network.add_memory_node(NodeSettings::new(NodeId::new(1), "https://one.example"));
    network.add_memory_node(NodeSettings::new(NodeId::new(2), "https://two.example"));

    let client: Arc<dyn RemoteClient> = Arc::new(MockRemoteClient::new());
    let peers = Arc::new(PeerRegistry::new());
    let connections = Arc::new(ConnectionMaps::new(
        Arc::clone(&network),
        Arc::clone(&client),
        Arc::clone(&peers),
    ));
    let distributor = Distributor::new(
        Arc::clone(&network),
        client,
        peers,
        Arc::clone(&connections),
        Arc::new(TranslationRegistry::new()),
    );

    Cluster {
        network,
        connections,
        distributor,
    }
}

#[test]
fn post_with_image_travels_between_nodes() {
    let cluster = cluster();
    let node1 = cluster.network.node(NodeId::new(1)).unwrap();
    let store1 = node1.store();

    store1.store_asset("2024/01/photo.jpg", vec![0xAA, 0xBB]).unwrap();
    let photo = store1
        .create(ContentObject::new("photo", "attachment").with_asset(AssetFile {
            file_name: "photo.jpg".into(),
            relative_path: "2024/01/photo.jpg".into(),
            url: "https://one.example/media/2024/01/photo.jpg".into(),
        }))
        .unwrap();
    let post = store1
        .create(
            ContentObject::new("hello-world", "post")
                .with_title("Hello World")
                .with_body(format!(r#"<img class="media-{}">"#, photo.id.as_u64())),
        )
        .unwrap();

    // Export: the prepared set covers the post and its image.
    let preparer = ContentPreparer::for_node(node1.settings()).unwrap();
    let set = ExportEngine::new(&preparer, store1.as_ref())
        .export(post.id.as_u64(), &ExportConfig::default().with_append_nested(true))
        .unwrap();

    assert_eq!(set.source_ids(), vec![post.id.as_u64(), photo.id.as_u64()]);
    assert!(set
        .get(post.id.as_u64())
        .unwrap()
        .body
        .contains(&format!("{{{{{}}}}}", photo.id.as_u64())));
    assert!(set.get(photo.id.as_u64()).unwrap().asset.is_some());

    // Distribute to node 2.
    let mut destinations = BTreeMap::new();
    destinations.insert(DestinationKey::local(2), DistributionOptions::default());
    let item = cluster
        .distributor
        .distribute(NodeId::new(1), post.id, &ExportConfig::default(), &destinations)
        .unwrap();
    assert_eq!(item.aggregate(), DestinationState::Success);

    // Node 2 holds a linked copy whose body points at the new image id.
    let node2 = cluster.network.node(NodeId::new(2)).unwrap();
    let store2 = node2.store();
    let gid = Gid::local(1, post.id.as_u64()).encode();
    let copies = store2.find_by_meta(sync_meta::GID, &json!(gid)).unwrap();
    assert_eq!(copies.len(), 1);
    let copy = &copies[0];
    assert_eq!(copy.meta_str(sync_meta::STATUS), Some("linked"));

    let image_copies = store2
        .find_by_meta(sync_meta::GID, &json!(Gid::local(1, photo.id.as_u64()).encode()))
        .unwrap();
    assert_eq!(image_copies.len(), 1);
    let image_copy = &image_copies[0];
    assert!(copy
        .body
        .contains(&format!(r#"class="media-{}""#, image_copy.id.as_u64())));

    // The image file landed in node 2's asset store.
    assert_eq!(
        store2.asset_bytes("2024/01/photo.jpg").unwrap(),
        Some(vec![0xAA, 0xBB])
    );

    // Node 1's connection map gained node 2.
    let entries = cluster.connections.get(NodeId::new(1), post.id).unwrap();
    assert_eq!(
        entries.get(&DestinationKey::local(2)).unwrap().content_id,
        copy.id.as_u64()
    );
}

#[test]
fn second_distribution_updates_the_same_copy() {
    let cluster = cluster();
    let node1 = cluster.network.node(NodeId::new(1)).unwrap();
    let post = node1
        .store()
        .create(ContentObject::new("hello", "post").with_title("v1"))
        .unwrap();

    let mut destinations = BTreeMap::new();
    destinations.insert(DestinationKey::local(2), DistributionOptions::default());

    cluster
        .distributor
        .distribute(NodeId::new(1), post.id, &ExportConfig::default(), &destinations)
        .unwrap();

    let mut updated = node1.store().get(post.id).unwrap().unwrap();
    updated.title = "v2".into();
    node1.store().update(&updated).unwrap();

    let item = cluster
        .distributor
        .distribute(NodeId::new(1), post.id, &ExportConfig::default(), &destinations)
        .unwrap();
    assert_eq!(item.aggregate(), DestinationState::Success);

    let node2 = cluster.network.node(NodeId::new(2)).unwrap();
    let copies = node2
        .store()
        .find_by_meta(sync_meta::GID, &json!(Gid::local(1, post.id.as_u64()).encode()))
        .unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].title, "v2");
}

#[test]
fn name_conflicts_respect_caller_decisions() {
    let cluster = cluster();
    let node1 = cluster.network.node(NodeId::new(1)).unwrap();
    let node2 = cluster.network.node(NodeId::new(2)).unwrap();

    let post = node1
        .store()
        .create(ContentObject::new("about", "page").with_title("About (new)"))
        .unwrap();
    let existing = node2
        .store()
        .create(ContentObject::new("about", "page").with_title("About (old)"))
        .unwrap();

    // Export and resolve against node 2's catalog.
    let preparer = ContentPreparer::for_node(node1.settings()).unwrap();
    let set = ExportEngine::new(&preparer, node1.store().as_ref())
        .export(post.id.as_u64(), &ExportConfig::default())
        .unwrap();

    let report = ConflictResolver::new(node2.store().as_ref())
        .resolve(&set)
        .unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].local_id, existing.id.as_u64());

    // The caller decides: replace the old page.
    let mut decisions = report.decisions.clone();
    decisions.insert(
        post.id.as_u64(),
        contentsync_protocol::ConflictDecision::matched(
            existing.id.as_u64(),
            ConflictAction::Replace,
        ),
    );

    let importer = ImportEngine::new(
        Arc::clone(&cluster.network),
        NodeId::new(2),
        Arc::clone(&cluster.connections),
        Arc::new(TranslationRegistry::new()),
    );
    let result = importer.import(&set, &decisions, &MediaBag::new()).unwrap();
    assert!(result.success());

    let replaced = node2.store().get(existing.id).unwrap().unwrap();
    assert_eq!(replaced.title, "About (new)");
    assert_eq!(node2.store().list().unwrap().len(), 1);
}

#[test]
fn archive_can_rehydrate_on_another_node() {
    let cluster = cluster();
    let node1 = cluster.network.node(NodeId::new(1)).unwrap();
    let store1 = node1.store();

    store1.store_asset("2024/01/photo.jpg", vec![1, 2, 3]).unwrap();
    let photo = store1
        .create(ContentObject::new("photo", "attachment").with_asset(AssetFile {
            file_name: "photo.jpg".into(),
            relative_path: "2024/01/photo.jpg".into(),
            url: "https://one.example/media/2024/01/photo.jpg".into(),
        }))
        .unwrap();
    let post = store1
        .create(
            ContentObject::new("bundled", "post")
                .with_body(format!(r#"<img class="media-{}">"#, photo.id.as_u64())),
        )
        .unwrap();

    let preparer = ContentPreparer::for_node(node1.settings()).unwrap();
    let set = ExportEngine::new(&preparer, store1.as_ref())
        .export(post.id.as_u64(), &ExportConfig::default())
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.zip");
    write_archive(&set, store1.as_ref(), &path).unwrap();

    let (rehydrated, media) = read_archive(&path).unwrap();
    assert_eq!(rehydrated.source_ids(), set.source_ids());

    let importer = ImportEngine::new(
        Arc::clone(&cluster.network),
        NodeId::new(2),
        Arc::clone(&cluster.connections),
        Arc::new(TranslationRegistry::new()),
    );
    let report = importer
        .import(&rehydrated, &BTreeMap::new(), &media)
        .unwrap();
    assert!(report.success());

    let node2 = cluster.network.node(NodeId::new(2)).unwrap();
    assert_eq!(
        node2.store().asset_bytes("2024/01/photo.jpg").unwrap(),
        Some(vec![1, 2, 3])
    );
}
