//! Node fixtures.
//!
//! A fixture is a JSON snapshot of one node: its settings, content
//! objects, terms, and asset files (base64). It backs the offline
//! export command.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use contentsync_store::{ContentObject, MemoryPostStore, NodeId, NodeSettings, PostStore, Term};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Node settings as written in a fixture file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureNode {
    /// Node id.
    pub id: u64,
    /// Site URL.
    pub site_url: String,
    /// Uploads URL; derived from the site URL when absent.
    #[serde(default)]
    pub uploads_url: Option<String>,
    /// Theme name.
    #[serde(default)]
    pub theme: Option<String>,
    /// Default language code.
    #[serde(default)]
    pub language: Option<String>,
}

/// One node's content as a JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    /// The node settings.
    pub node: FixtureNode,
    /// Content objects, with their fixture-assigned ids.
    #[serde(default)]
    pub objects: Vec<ContentObject>,
    /// Taxonomy terms, with their fixture-assigned ids.
    #[serde(default)]
    pub terms: Vec<Term>,
    /// Asset files: uploads-relative path to base64 bytes.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
}

impl Fixture {
    /// Loads a fixture from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns the node settings of this fixture.
    pub fn settings(&self) -> NodeSettings {
        let mut settings = NodeSettings::new(NodeId::new(self.node.id), &self.node.site_url);
        if let Some(uploads_url) = &self.node.uploads_url {
            settings = settings.with_uploads_url(uploads_url);
        }
        if let Some(theme) = &self.node.theme {
            settings = settings.with_theme(theme);
        }
        if let Some(language) = &self.node.language {
            settings = settings.with_language(language);
        }
        settings
    }

    /// Materializes the fixture into an in-memory store.
    pub fn build_store(&self) -> Result<MemoryPostStore, Box<dyn std::error::Error>> {
        let store = MemoryPostStore::new();
        for object in &self.objects {
            store.insert_with_id(object.id.as_u64(), object.clone());
        }
        for term in &self.terms {
            store.insert_term_with_id(term.id, term.clone());
        }
        for (path, encoded) in &self.assets {
            let bytes = BASE64.decode(encoded)?;
            store.store_asset(path, bytes)?;
        }
        Ok(store)
    }
}
