//! The node and network model.
//!
//! A network is a cluster of nodes sharing one connection-map authority.
//! Operating "as" a node is a scoped critical section: `switch_to`
//! returns a guard, and the previous context is restored when the guard
//! drops, on every exit path, including panics.

use crate::error::{StoreError, StoreResult};
use crate::store::{MemoryPostStore, PostStore};
use crate::types::{ContentId, NodeId};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-node settings the synchronization engine needs: the URLs and
/// theme that get externalized into placeholders, and the default
/// language code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    /// Node id within its network.
    pub id: NodeId,
    /// Base site URL, without trailing slash.
    pub site_url: String,
    /// Base URL of the uploads/media root, without trailing slash.
    pub uploads_url: String,
    /// Active theme name.
    pub theme: String,
    /// Default language code, used when no translation tool is active.
    pub language: String,
}

impl NodeSettings {
    /// Creates settings with conventional defaults derived from the
    /// site URL.
    pub fn new(id: NodeId, site_url: impl Into<String>) -> Self {
        let site_url = site_url.into();
        let site_url = site_url.trim_end_matches('/').to_string();
        Self {
            uploads_url: format!("{site_url}/media"),
            id,
            site_url,
            theme: "default".into(),
            language: "en".into(),
        }
    }

    /// Sets the uploads root URL.
    pub fn with_uploads_url(mut self, uploads_url: impl Into<String>) -> Self {
        self.uploads_url = uploads_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the theme name.
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    /// Sets the default language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Returns the edit URL for a content object on this node.
    pub fn edit_url(&self, id: ContentId) -> String {
        format!("{}/admin/content/{}", self.site_url, id.as_u64())
    }

    /// Returns the public display URL for a content object on this node.
    pub fn display_url(&self, id: ContentId) -> String {
        format!("{}/?p={}", self.site_url, id.as_u64())
    }
}

/// One node: settings plus its post store.
pub struct Node {
    settings: NodeSettings,
    store: Arc<dyn PostStore>,
}

impl Node {
    /// Creates a node over the given store.
    pub fn new(settings: NodeSettings, store: Arc<dyn PostStore>) -> Self {
        Self { settings, store }
    }

    /// Returns the node id.
    pub fn id(&self) -> NodeId {
        self.settings.id
    }

    /// Returns the node settings.
    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    /// Returns the node's post store.
    pub fn store(&self) -> &Arc<dyn PostStore> {
        &self.store
    }
}

/// The local cluster of nodes.
///
/// Tracks which node is the current execution context. Only one logical
/// current node is active at a time; switches nest and always unwind.
pub struct LocalNetwork {
    nodes: RwLock<BTreeMap<NodeId, Arc<Node>>>,
    context: Mutex<Vec<NodeId>>,
}

impl LocalNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
            context: Mutex::new(Vec::new()),
        }
    }

    /// Adds a node over an existing store.
    pub fn add_node(&self, settings: NodeSettings, store: Arc<dyn PostStore>) -> Arc<Node> {
        let node = Arc::new(Node::new(settings, store));
        self.nodes.write().insert(node.id(), Arc::clone(&node));
        node
    }

    /// Adds a node backed by a fresh in-memory store.
    pub fn add_memory_node(&self, settings: NodeSettings) -> Arc<Node> {
        self.add_node(settings, Arc::new(MemoryPostStore::new()))
    }

    /// Gets a node by id.
    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(&id).cloned()
    }

    /// Returns all node ids, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.read().keys().copied().collect()
    }

    /// Returns the node currently active as execution context, if any.
    pub fn current(&self) -> Option<Arc<Node>> {
        let context = self.context.lock();
        context.last().and_then(|id| self.node(*id))
    }

    /// Enters the given node's context.
    ///
    /// The returned guard restores the previous context when dropped.
    pub fn switch_to(&self, id: NodeId) -> StoreResult<NodeSwitchGuard<'_>> {
        let node = self.node(id).ok_or(StoreError::UnknownNode(id))?;
        self.context.lock().push(id);
        Ok(NodeSwitchGuard {
            network: self,
            node,
        })
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped guard for an active node context.
///
/// Dropping the guard pops this context and restores the previous one.
pub struct NodeSwitchGuard<'a> {
    network: &'a LocalNetwork,
    node: Arc<Node>,
}

impl NodeSwitchGuard<'_> {
    /// Returns the node this guard entered.
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }
}

impl Drop for NodeSwitchGuard<'_> {
    fn drop(&mut self) {
        let mut context = self.network.context.lock();
        if let Some(position) = context.iter().rposition(|id| *id == self.node.id()) {
            context.remove(position);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_with_nodes() -> LocalNetwork {
        let network = LocalNetwork::new();
        network.add_memory_node(NodeSettings::new(NodeId::new(1), "https://one.example"));
        network.add_memory_node(NodeSettings::new(NodeId::new(2), "https://two.example"));
        network
    }

    #[test]
    fn settings_urls() {
        let settings = NodeSettings::new(NodeId::new(1), "https://one.example/");
        assert_eq!(settings.site_url, "https://one.example");
        assert_eq!(settings.uploads_url, "https://one.example/media");
        assert_eq!(settings.edit_url(ContentId::new(5)), "https://one.example/admin/content/5");
        assert_eq!(settings.display_url(ContentId::new(5)), "https://one.example/?p=5");
    }

    #[test]
    fn switch_restores_on_drop() {
        let network = network_with_nodes();
        assert!(network.current().is_none());

        {
            let outer = network.switch_to(NodeId::new(1)).unwrap();
            assert_eq!(network.current().unwrap().id(), NodeId::new(1));
            assert_eq!(outer.node().id(), NodeId::new(1));

            {
                let _inner = network.switch_to(NodeId::new(2)).unwrap();
                assert_eq!(network.current().unwrap().id(), NodeId::new(2));
            }

            assert_eq!(network.current().unwrap().id(), NodeId::new(1));
        }

        assert!(network.current().is_none());
    }

    #[test]
    fn switch_to_unknown_node_fails() {
        let network = network_with_nodes();
        assert!(matches!(
            network.switch_to(NodeId::new(9)),
            Err(StoreError::UnknownNode(_))
        ));
        assert!(network.current().is_none());
    }

    #[test]
    fn switch_restores_on_panic() {
        let network = network_with_nodes();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = network.switch_to(NodeId::new(2)).unwrap();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(network.current().is_none());
    }

    #[test]
    fn nodes_are_isolated() {
        let network = network_with_nodes();
        let one = network.node(NodeId::new(1)).unwrap();
        let two = network.node(NodeId::new(2)).unwrap();

        one.store()
            .create(crate::object::ContentObject::new("a", "post"))
            .unwrap();

        assert_eq!(one.store().list().unwrap().len(), 1);
        assert!(two.store().list().unwrap().is_empty());
    }
}
