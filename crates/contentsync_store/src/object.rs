//! The content object model.

use crate::types::ContentId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One content object: a post, template, media item, navigation menu or
/// any other typed unit of content.
///
/// The core schema is fixed; everything else lives in the open `meta`
/// bag. Nothing here is CMS-specific; the synchronization engine only
/// reasons about these fields generically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentObject {
    /// Store-assigned identifier, only meaningful on its own node.
    pub id: ContentId,
    /// URL-safe name (slug). Together with `object_type` it identifies
    /// collision candidates across nodes.
    pub name: String,
    /// Human-readable title.
    pub title: String,
    /// Object type, e.g. `post`, `template`, `attachment`, `navigation`.
    pub object_type: String,
    /// Publication status, e.g. `publish`, `draft`, `trash`.
    pub status: String,
    /// Body text. May embed references to other objects and terms.
    pub body: String,
    /// Short excerpt.
    #[serde(default)]
    pub excerpt: String,
    /// Parent object on the same node, if any.
    #[serde(default)]
    pub parent: Option<ContentId>,
    /// Thumbnail object on the same node, if any.
    #[serde(default)]
    pub thumbnail: Option<ContentId>,
    /// Creation time in unix milliseconds.
    pub created_at_ms: u64,
    /// Last modification time in unix milliseconds.
    pub modified_at_ms: u64,
    /// Open meta bag. Keys are plain strings, values arbitrary JSON.
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
    /// Assigned term ids, keyed by taxonomy.
    #[serde(default)]
    pub terms: BTreeMap<String, Vec<u64>>,
    /// Binary asset descriptor when this object wraps a file.
    #[serde(default)]
    pub asset: Option<AssetFile>,
}

impl ContentObject {
    /// Creates a minimal object of the given type.
    ///
    /// The id is a placeholder until the store assigns one on `create`.
    pub fn new(name: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            id: ContentId::new(0),
            name: name.into(),
            title: String::new(),
            object_type: object_type.into(),
            status: "publish".into(),
            body: String::new(),
            excerpt: String::new(),
            parent: None,
            thumbnail: None,
            created_at_ms: 0,
            modified_at_ms: 0,
            meta: BTreeMap::new(),
            terms: BTreeMap::new(),
            asset: None,
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a meta value.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Sets the asset descriptor.
    pub fn with_asset(mut self, asset: AssetFile) -> Self {
        self.asset = Some(asset);
        self
    }

    /// Returns a meta value by key.
    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Returns a meta value as a string slice, if it is one.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(Value::as_str)
    }
}

/// Descriptor of a binary asset attached to a content object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFile {
    /// Bare file name, e.g. `photo.jpg`.
    pub file_name: String,
    /// Path relative to the node's uploads root, e.g. `2024/01/photo.jpg`.
    pub relative_path: String,
    /// Absolute URL on the owning node.
    pub url: String,
}

/// One taxonomy term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Store-assigned term id.
    pub id: u64,
    /// Taxonomy the term belongs to, e.g. `category`.
    pub taxonomy: String,
    /// Display name.
    pub name: String,
    /// URL-safe slug.
    pub slug: String,
    /// Parent term on the same node, if any.
    #[serde(default)]
    pub parent: Option<u64>,
}

impl Term {
    /// Creates a root term.
    pub fn new(taxonomy: impl Into<String>, name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: 0,
            taxonomy: taxonomy.into(),
            name: name.into(),
            slug: slug.into(),
            parent: None,
        }
    }

    /// Sets the parent term id.
    pub fn with_parent(mut self, parent: u64) -> Self {
        self.parent = Some(parent);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_roundtrip() {
        let object = ContentObject::new("hello-world", "post")
            .with_title("Hello World")
            .with_body("First post.")
            .with_meta("color", json!("blue"));

        assert_eq!(object.name, "hello-world");
        assert_eq!(object.object_type, "post");
        assert_eq!(object.meta_str("color"), Some("blue"));
        assert_eq!(object.meta_value("missing"), None);
    }

    #[test]
    fn serde_defaults_optional_fields() {
        let json = r#"{
            "id": 7,
            "name": "a",
            "title": "A",
            "object_type": "post",
            "status": "publish",
            "body": "",
            "created_at_ms": 0,
            "modified_at_ms": 0
        }"#;
        let object: ContentObject = serde_json::from_str(json).unwrap();
        assert_eq!(object.id, ContentId::new(7));
        assert!(object.meta.is_empty());
        assert!(object.asset.is_none());
        assert!(object.parent.is_none());
    }

    #[test]
    fn term_builder() {
        let term = Term::new("category", "News", "news").with_parent(3);
        assert_eq!(term.taxonomy, "category");
        assert_eq!(term.parent, Some(3));
    }
}
