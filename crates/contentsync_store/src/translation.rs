//! Translation provider abstraction.
//!
//! Concrete translation tools are external collaborators; the engine
//! only talks to this trait. The registry resolves which tool (if any)
//! is active on a node, with the node's default language as fallback.

use crate::error::StoreResult;
use crate::meta::sync_meta;
use crate::store::PostStore;
use crate::types::ContentId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Language metadata of one content object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LanguageInfo {
    /// Language code, e.g. `en`, `de-DE`.
    pub code: String,
    /// Tool-specific arguments carried opaquely through a transfer.
    pub args: BTreeMap<String, Value>,
}

impl LanguageInfo {
    /// Creates language info with just a code.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            args: BTreeMap::new(),
        }
    }
}

/// Per-node translation tool behavior.
pub trait TranslationProvider: Send + Sync {
    /// Returns the tool name when the tool is active on this store.
    fn detect(&self, store: &dyn PostStore) -> Option<String>;

    /// Returns language metadata for an object, if the tool tracks it.
    fn language_info(
        &self,
        store: &dyn PostStore,
        id: ContentId,
    ) -> StoreResult<Option<LanguageInfo>>;

    /// Returns the object's sibling translations as `code -> local id`.
    fn translations(
        &self,
        store: &dyn PostStore,
        id: ContentId,
    ) -> StoreResult<BTreeMap<String, ContentId>>;

    /// Establishes translation relationships among local objects.
    fn set_translations(
        &self,
        store: &dyn PostStore,
        id: ContentId,
        code: &str,
        siblings: &BTreeMap<String, ContentId>,
    ) -> StoreResult<()>;
}

/// Registry of translation providers.
///
/// The first provider whose `detect` succeeds is the active tool.
pub struct TranslationRegistry {
    providers: Vec<Arc<dyn TranslationProvider>>,
}

impl TranslationRegistry {
    /// Creates an empty registry (no translation tool available).
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Registers a provider. Registration order is probe order.
    pub fn register(&mut self, provider: Arc<dyn TranslationProvider>) {
        self.providers.push(provider);
    }

    /// Returns the active provider and its tool name, if any.
    pub fn active(&self, store: &dyn PostStore) -> Option<(String, Arc<dyn TranslationProvider>)> {
        self.providers
            .iter()
            .find_map(|p| p.detect(store).map(|tool| (tool, Arc::clone(p))))
    }
}

impl Default for TranslationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A provider that keeps language data in object meta.
///
/// Reference implementation used by tests and fixtures; real tool
/// adapters live outside this crate.
pub struct MetaTranslationProvider {
    tool: String,
}

impl MetaTranslationProvider {
    /// Creates the provider under the given tool name.
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }
}

impl TranslationProvider for MetaTranslationProvider {
    fn detect(&self, _store: &dyn PostStore) -> Option<String> {
        Some(self.tool.clone())
    }

    fn language_info(
        &self,
        store: &dyn PostStore,
        id: ContentId,
    ) -> StoreResult<Option<LanguageInfo>> {
        let Some(object) = store.get(id)? else {
            return Ok(None);
        };
        Ok(object
            .meta_str(sync_meta::LANGUAGE)
            .map(LanguageInfo::new))
    }

    fn translations(
        &self,
        store: &dyn PostStore,
        id: ContentId,
    ) -> StoreResult<BTreeMap<String, ContentId>> {
        let Some(object) = store.get(id)? else {
            return Ok(BTreeMap::new());
        };
        let mut result = BTreeMap::new();
        if let Some(Value::Object(map)) = object.meta_value(sync_meta::TRANSLATIONS) {
            for (code, value) in map {
                if let Some(sibling) = value.as_u64() {
                    result.insert(code.clone(), ContentId::new(sibling));
                }
            }
        }
        Ok(result)
    }

    fn set_translations(
        &self,
        store: &dyn PostStore,
        id: ContentId,
        code: &str,
        siblings: &BTreeMap<String, ContentId>,
    ) -> StoreResult<()> {
        store.set_meta(id, sync_meta::LANGUAGE, Value::String(code.to_string()))?;
        let map: serde_json::Map<String, Value> = siblings
            .iter()
            .map(|(code, sibling)| (code.clone(), Value::from(sibling.as_u64())))
            .collect();
        store.set_meta(id, sync_meta::TRANSLATIONS, Value::Object(map))?;

        // Mirror the link onto every sibling so lookups work from any
        // member of the group.
        for (sibling_code, sibling_id) in siblings {
            let mut mirrored: serde_json::Map<String, Value> = siblings
                .iter()
                .filter(|(c, _)| *c != sibling_code)
                .map(|(c, s)| (c.clone(), Value::from(s.as_u64())))
                .collect();
            mirrored.insert(code.to_string(), Value::from(id.as_u64()));
            store.set_meta(
                *sibling_id,
                sync_meta::LANGUAGE,
                Value::String(sibling_code.clone()),
            )?;
            store.set_meta(*sibling_id, sync_meta::TRANSLATIONS, Value::Object(mirrored))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ContentObject;
    use crate::store::MemoryPostStore;

    #[test]
    fn empty_registry_has_no_active_provider() {
        let registry = TranslationRegistry::new();
        let store = MemoryPostStore::new();
        assert!(registry.active(&store).is_none());
    }

    #[test]
    fn registry_probes_in_order() {
        let mut registry = TranslationRegistry::new();
        registry.register(Arc::new(MetaTranslationProvider::new("first")));
        registry.register(Arc::new(MetaTranslationProvider::new("second")));

        let store = MemoryPostStore::new();
        let (tool, _) = registry.active(&store).unwrap();
        assert_eq!(tool, "first");
    }

    #[test]
    fn meta_provider_roundtrip() {
        let provider = MetaTranslationProvider::new("meta");
        let store = MemoryPostStore::new();

        let en = store.create(ContentObject::new("hello", "post")).unwrap();
        let de = store.create(ContentObject::new("hallo", "post")).unwrap();

        let mut siblings = BTreeMap::new();
        siblings.insert("de".to_string(), de.id);
        provider
            .set_translations(&store, en.id, "en", &siblings)
            .unwrap();

        let info = provider.language_info(&store, en.id).unwrap().unwrap();
        assert_eq!(info.code, "en");

        let translations = provider.translations(&store, en.id).unwrap();
        assert_eq!(translations.get("de"), Some(&de.id));

        // The sibling sees the link back.
        let back = provider.translations(&store, de.id).unwrap();
        assert_eq!(back.get("en"), Some(&en.id));
        let info = provider.language_info(&store, de.id).unwrap().unwrap();
        assert_eq!(info.code, "de");
    }

    #[test]
    fn language_info_for_missing_object_is_none() {
        let provider = MetaTranslationProvider::new("meta");
        let store = MemoryPostStore::new();
        assert!(provider
            .language_info(&store, ContentId::new(9))
            .unwrap()
            .is_none());
    }
}
