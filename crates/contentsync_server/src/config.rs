//! Server configuration.

use contentsync_gid::canonicalize_address;
use contentsync_store::NodeId;

/// Configuration of one serving node.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Human-readable site name returned by `site_name`.
    pub site_name: String,
    /// Node of the local network this server serves.
    pub node_id: NodeId,
    /// This network's own canonical address. Inbound GIDs carrying it
    /// are localized before processing.
    pub network_address: String,
}

impl ServerConfig {
    /// Creates a configuration.
    pub fn new(
        site_name: impl Into<String>,
        node_id: NodeId,
        network_address: impl AsRef<str>,
    ) -> Self {
        Self {
            site_name: site_name.into(),
            node_id,
            network_address: canonicalize_address(network_address.as_ref()),
        }
    }

    /// Sets the serving node.
    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = node_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_canonicalized() {
        let config = ServerConfig::new("One", NodeId::new(1), "https://www.one.example/");
        assert_eq!(config.network_address, "one.example");
        assert_eq!(config.site_name, "One");
    }
}
