//! The content preparer.
//!
//! Walks one content object and produces a self-contained prepared
//! unit: nested references resolved into the closure, dynamic strings
//! externalized into placeholders, meta/terms/asset/language/hierarchy
//! snapshots attached. A single unresolved reference is never fatal;
//! only a missing root object fails the unit.

use crate::error::SyncResult;
use crate::placeholders::DynamicStrings;
use crate::rules::{extract_filter_expressions, normalize_nav_blocks, NestedReferenceRule, ReferenceRuleSet};
use contentsync_gid::Gid;
use contentsync_protocol::{
    ExportConfig, PreparedAsset, PreparedLanguage, PreparedTerm, PreparedUnit, PreparedHierarchy,
    RelatedRef,
};
use contentsync_store::{
    sync_meta, ContentId, MetaExclusions, NodeSettings, PostStore, Term, TranslationRegistry,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Transform applied to one meta value during export.
pub type MetaTransform = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Extension point for per-field meta transforms, keyed by meta key.
///
/// Integrations register a transform for the fields they own; values
/// with no registered transform pass through unchanged.
#[derive(Default)]
pub struct MetaTransformRegistry {
    transforms: BTreeMap<String, MetaTransform>,
}

impl MetaTransformRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transform for a meta key.
    pub fn register(&mut self, key: impl Into<String>, transform: MetaTransform) {
        self.transforms.insert(key.into(), transform);
    }

    /// Applies the transform registered for `key`, if any.
    pub fn apply(&self, key: &str, value: &Value) -> Value {
        match self.transforms.get(key) {
            Some(transform) => transform(value),
            None => value.clone(),
        }
    }
}

/// Prepares content objects of one node for transfer.
pub struct ContentPreparer {
    settings: NodeSettings,
    rules: ReferenceRuleSet,
    dynamic: DynamicStrings,
    exclusions: MetaExclusions,
    transforms: MetaTransformRegistry,
    translations: Arc<TranslationRegistry>,
    taxonomy_containers: BTreeMap<String, String>,
}

impl ContentPreparer {
    /// Creates a preparer with the standard rule set for a node.
    pub fn for_node(settings: &NodeSettings) -> SyncResult<Self> {
        Ok(Self {
            rules: ReferenceRuleSet::standard(settings)?,
            dynamic: DynamicStrings::for_node(settings),
            settings: settings.clone(),
            exclusions: MetaExclusions::standard(),
            transforms: MetaTransformRegistry::new(),
            translations: Arc::new(TranslationRegistry::new()),
            taxonomy_containers: BTreeMap::new(),
        })
    }

    /// Replaces the reference rule set.
    pub fn with_rules(mut self, rules: ReferenceRuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Replaces the meta exclusion list.
    pub fn with_exclusions(mut self, exclusions: MetaExclusions) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// Replaces the meta transform registry.
    pub fn with_transforms(mut self, transforms: MetaTransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }

    /// Sets the translation registry.
    pub fn with_translations(mut self, translations: Arc<TranslationRegistry>) -> Self {
        self.translations = translations;
        self
    }

    /// Declares an object type as a taxonomy-term container.
    ///
    /// Containers export the terms of their taxonomy instead of their
    /// own assigned terms.
    pub fn with_taxonomy_container(
        mut self,
        object_type: impl Into<String>,
        taxonomy: impl Into<String>,
    ) -> Self {
        self.taxonomy_containers
            .insert(object_type.into(), taxonomy.into());
        self
    }

    /// Returns the node settings this preparer was built for.
    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    /// Prepares one content object.
    ///
    /// Returns `Ok(None)` when the id does not resolve.
    pub fn prepare(
        &self,
        store: &dyn PostStore,
        id: ContentId,
        config: &ExportConfig,
    ) -> SyncResult<Option<PreparedUnit>> {
        let Some(object) = store.get(id)? else {
            return Ok(None);
        };

        // Nested references in the body text.
        let mut body = object.body.clone();
        let mut nested = Vec::new();
        for rule in self.rules.content_rules() {
            let (rewritten, ids) = rule.apply(&body, |id_capture, slug| {
                resolve_content_ref(store, rule, id_capture, slug)
            });
            body = rewritten;
            nested.extend(ids);
        }

        // Structured filter expressions carry content and term ids.
        let (rewritten, filter_content, mut referenced_term_ids) = extract_filter_expressions(
            &body,
            |content_id| {
                store
                    .get(ContentId::new(content_id))
                    .ok()
                    .flatten()
                    .map(|o| o.id.as_u64())
            },
            |term_id| store.term(term_id).ok().flatten().map(|t| t.id),
        );
        body = rewritten;
        nested.extend(filter_content);

        // Term references in the body text.
        for rule in self.rules.term_rules() {
            let (rewritten, ids) = rule.apply(&body, |id_capture, slug| {
                resolve_term_ref(store, rule, id_capture, slug)
            });
            body = rewritten;
            referenced_term_ids.extend(ids);
        }
        let referenced_terms = self.term_chains_by_id(store, &referenced_term_ids)?;

        // Dynamic strings.
        body = self.dynamic.externalize(&body);
        let excerpt = self.dynamic.externalize(&object.excerpt);

        // Meta projection.
        let mut meta = BTreeMap::new();
        for (key, value) in &object.meta {
            if self.exclusions.is_excluded(key) || MetaExclusions::is_skippable_value(value) {
                continue;
            }
            meta.insert(key.clone(), self.transforms.apply(key, value));
        }

        // Term projection.
        let terms = self.project_terms(store, &object, config)?;

        // Asset projection.
        let asset = object.asset.as_ref().map(|a| PreparedAsset {
            file_name: a.file_name.clone(),
            relative_path: a.relative_path.clone(),
            url: strip_scaled_suffix(&self.dynamic.externalize(&a.url)),
        });

        // Language projection.
        let language = self.project_language(store, id)?;

        // Menu normalization.
        if config.resolve_menus {
            let (normalized, _) = normalize_nav_blocks(&body);
            body = normalized;
        }

        // Hierarchy projection.
        let hierarchy = self.project_hierarchy(store, &object)?;

        let gid = object
            .meta_str(sync_meta::GID)
            .filter(|g| Gid::parse(g).is_some())
            .map(str::to_string)
            .unwrap_or_else(|| {
                Gid::local(self.settings.id.as_u64(), id.as_u64()).encode()
            });

        let mut seen = BTreeSet::new();
        let nested: Vec<u64> = nested
            .into_iter()
            .filter(|n| *n != id.as_u64() && seen.insert(*n))
            .collect();

        Ok(Some(PreparedUnit {
            source_id: id.as_u64(),
            gid,
            is_root: false,
            name: object.name.clone(),
            title: object.title.clone(),
            object_type: object.object_type.clone(),
            status: object.status.clone(),
            body,
            excerpt,
            created_at_ms: object.created_at_ms,
            modified_at_ms: object.modified_at_ms,
            thumbnail: object.thumbnail.map(ContentId::as_u64),
            meta,
            terms,
            referenced_terms,
            asset,
            language,
            hierarchy,
            config: *config,
            action: None,
            nested,
        }))
    }

    fn project_terms(
        &self,
        store: &dyn PostStore,
        object: &contentsync_store::ContentObject,
        config: &ExportConfig,
    ) -> SyncResult<Vec<PreparedTerm>> {
        if let Some(taxonomy) = self.taxonomy_containers.get(&object.object_type) {
            let mut terms = Vec::new();
            for term in store.taxonomy_terms(taxonomy)? {
                terms.push(self.term_chain(store, &term));
            }
            return Ok(terms);
        }

        let assigned = store.object_terms(object.id)?;
        let source_terms = if config.all_terms {
            let taxonomies: BTreeSet<String> =
                assigned.iter().map(|t| t.taxonomy.clone()).collect();
            let mut all = Vec::new();
            for taxonomy in taxonomies {
                all.extend(store.taxonomy_terms(&taxonomy)?);
            }
            all
        } else {
            assigned
        };

        let mut terms = Vec::new();
        for term in &source_terms {
            terms.push(self.term_chain(store, term));
        }
        Ok(terms)
    }

    fn term_chain(&self, store: &dyn PostStore, term: &Term) -> PreparedTerm {
        let parent = term
            .parent
            .and_then(|parent_id| store.term(parent_id).ok().flatten())
            .map(|parent| Box::new(self.term_chain(store, &parent)));
        PreparedTerm {
            source_id: term.id,
            taxonomy: term.taxonomy.clone(),
            name: term.name.clone(),
            slug: term.slug.clone(),
            parent,
        }
    }

    fn term_chains_by_id(
        &self,
        store: &dyn PostStore,
        term_ids: &[u64],
    ) -> SyncResult<Vec<PreparedTerm>> {
        let mut seen = BTreeSet::new();
        let mut chains = Vec::new();
        for term_id in term_ids {
            if !seen.insert(*term_id) {
                continue;
            }
            if let Some(term) = store.term(*term_id)? {
                chains.push(self.term_chain(store, &term));
            }
        }
        Ok(chains)
    }

    fn project_language(
        &self,
        store: &dyn PostStore,
        id: ContentId,
    ) -> SyncResult<Option<PreparedLanguage>> {
        match self.translations.active(store) {
            Some((tool, provider)) => {
                let info = provider.language_info(store, id)?;
                let code = info
                    .as_ref()
                    .map(|i| i.code.clone())
                    .unwrap_or_else(|| self.settings.language.clone());
                let args = info.map(|i| i.args).unwrap_or_default();

                let mut siblings = BTreeMap::new();
                for (sibling_code, sibling_id) in provider.translations(store, id)? {
                    if sibling_id == id {
                        continue;
                    }
                    siblings.insert(
                        sibling_code,
                        Gid::local(self.settings.id.as_u64(), sibling_id.as_u64()).encode(),
                    );
                }

                Ok(Some(PreparedLanguage {
                    code,
                    tool: Some(tool),
                    siblings,
                    args,
                }))
            }
            None => Ok(Some(PreparedLanguage {
                code: self.settings.language.clone(),
                tool: None,
                siblings: BTreeMap::new(),
                args: BTreeMap::new(),
            })),
        }
    }

    fn project_hierarchy(
        &self,
        store: &dyn PostStore,
        object: &contentsync_store::ContentObject,
    ) -> SyncResult<Option<PreparedHierarchy>> {
        let parent = match object.parent {
            Some(parent_id) => store.get(parent_id)?.map(|p| RelatedRef {
                source_id: p.id.as_u64(),
                name: p.name,
                object_type: p.object_type,
            }),
            None => None,
        };

        let mut children = Vec::new();
        for candidate in store.list()? {
            if candidate.parent == Some(object.id) {
                children.push(RelatedRef {
                    source_id: candidate.id.as_u64(),
                    name: candidate.name,
                    object_type: candidate.object_type,
                });
            }
        }

        if parent.is_none() && children.is_empty() {
            return Ok(None);
        }
        Ok(Some(PreparedHierarchy { parent, children }))
    }
}

fn resolve_content_ref(
    store: &dyn PostStore,
    rule: &NestedReferenceRule,
    id_capture: Option<u64>,
    slug: Option<&str>,
) -> Option<u64> {
    if let Some(content_id) = id_capture {
        if let Ok(Some(object)) = store.get(ContentId::new(content_id)) {
            if rule.referenced_type().is_empty() || object.object_type == rule.referenced_type() {
                return Some(object.id.as_u64());
            }
        }
    }
    if let (Some(slug), false) = (slug, rule.referenced_type().is_empty()) {
        if let Ok(Some(object)) = store.find_by_name_type(slug, rule.referenced_type()) {
            return Some(object.id.as_u64());
        }
    }
    None
}

fn resolve_term_ref(
    store: &dyn PostStore,
    rule: &NestedReferenceRule,
    id_capture: Option<u64>,
    slug: Option<&str>,
) -> Option<u64> {
    if let Some(term_id) = id_capture {
        if let Ok(Some(term)) = store.term(term_id) {
            if rule.referenced_type().is_empty() || term.taxonomy == rule.referenced_type() {
                return Some(term.id);
            }
        }
    }
    if let (Some(slug), false) = (slug, rule.referenced_type().is_empty()) {
        if let Ok(Some(term)) = store.find_term(rule.referenced_type(), slug) {
            return Some(term.id);
        }
    }
    None
}

/// Strips the `-scaled` stem suffix some asset pipelines add.
fn strip_scaled_suffix(url: &str) -> String {
    match url.rsplit_once('.') {
        Some((stem, extension)) if stem.ends_with("-scaled") => {
            format!("{}.{}", stem.trim_end_matches("-scaled"), extension)
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contentsync_store::{
        AssetFile, ContentObject, MemoryPostStore, MetaTranslationProvider, NodeId,
        TranslationProvider,
    };
    use serde_json::json;

    fn settings() -> NodeSettings {
        NodeSettings::new(NodeId::new(1), "https://one.example")
    }

    fn preparer() -> ContentPreparer {
        ContentPreparer::for_node(&settings()).unwrap()
    }

    #[test]
    fn missing_object_prepares_to_none() {
        let store = MemoryPostStore::new();
        let unit = preparer()
            .prepare(&store, ContentId::new(9), &ExportConfig::default())
            .unwrap();
        assert!(unit.is_none());
    }

    #[test]
    fn resolved_reference_becomes_placeholder_and_nested() {
        let store = MemoryPostStore::new();
        store.insert_with_id(7, ContentObject::new("photo", "attachment"));
        store.insert_with_id(
            10,
            ContentObject::new("hello", "post")
                .with_body(r#"<img class="media-7"> and <!-- embed id="99" -->"#),
        );

        let unit = preparer()
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        assert!(unit.body.contains(r#"class="media-{{7}}""#));
        // The unresolved embed stays as-is.
        assert!(unit.body.contains(r#"<!-- embed id="99" -->"#));
        assert_eq!(unit.nested, vec![7]);
        assert_eq!(unit.gid, "1-10");
    }

    #[test]
    fn dynamic_strings_are_externalized() {
        let store = MemoryPostStore::new();
        store.insert_with_id(
            10,
            ContentObject::new("hello", "post")
                .with_body("visit https://one.example/about or https://one.example/media/x.png"),
        );

        let unit = preparer()
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(
            unit.body,
            "visit {{site_url}}/about or {{uploads_url}}/x.png"
        );
    }

    #[test]
    fn meta_projection_filters_and_transforms() {
        let store = MemoryPostStore::new();
        store.insert_with_id(
            10,
            ContentObject::new("hello", "post")
                .with_meta("color", json!("blue"))
                .with_meta("_edit_lock", json!("1:1"))
                .with_meta("empty", json!(""))
                .with_meta("views", json!(7)),
        );

        let mut transforms = MetaTransformRegistry::new();
        transforms.register("views", Arc::new(|_value: &Value| json!(0)));

        let unit = preparer()
            .with_transforms(transforms)
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(unit.meta.get("color"), Some(&json!("blue")));
        assert_eq!(unit.meta.get("views"), Some(&json!(0)));
        assert!(!unit.meta.contains_key("_edit_lock"));
        assert!(!unit.meta.contains_key("empty"));
    }

    #[test]
    fn assigned_terms_carry_parent_chains() {
        let store = MemoryPostStore::new();
        store.insert_term_with_id(1, Term::new("category", "News", "news"));
        store.insert_term_with_id(3, Term::new("category", "Local", "local").with_parent(1));
        let mut object = ContentObject::new("hello", "post");
        object.terms.insert("category".into(), vec![3]);
        store.insert_with_id(10, object);

        let unit = preparer()
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(unit.terms.len(), 1);
        assert_eq!(unit.terms[0].slug, "local");
        assert_eq!(unit.terms[0].parent.as_ref().unwrap().slug, "news");
    }

    #[test]
    fn taxonomy_container_exports_whole_taxonomy() {
        let store = MemoryPostStore::new();
        store.insert_term_with_id(1, Term::new("category", "News", "news"));
        store.insert_term_with_id(2, Term::new("category", "Sport", "sport"));
        store.insert_with_id(10, ContentObject::new("categories", "term_set"));

        let unit = preparer()
            .with_taxonomy_container("term_set", "category")
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        let slugs: Vec<&str> = unit.terms.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["news", "sport"]);
    }

    #[test]
    fn asset_url_strips_scaled_suffix() {
        let store = MemoryPostStore::new();
        store.insert_with_id(
            7,
            ContentObject::new("photo", "attachment").with_asset(AssetFile {
                file_name: "photo.jpg".into(),
                relative_path: "2024/01/photo.jpg".into(),
                url: "https://one.example/media/2024/01/photo-scaled.jpg".into(),
            }),
        );

        let unit = preparer()
            .prepare(&store, ContentId::new(7), &ExportConfig::default())
            .unwrap()
            .unwrap();

        let asset = unit.asset.unwrap();
        assert_eq!(asset.url, "{{uploads_url}}/2024/01/photo.jpg");
        assert_eq!(asset.relative_path, "2024/01/photo.jpg");
    }

    #[test]
    fn language_falls_back_to_node_default() {
        let store = MemoryPostStore::new();
        store.insert_with_id(10, ContentObject::new("hello", "post"));

        let unit = preparer()
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        let language = unit.language.unwrap();
        assert_eq!(language.code, "en");
        assert_eq!(language.tool, None);
        assert!(language.siblings.is_empty());
    }

    #[test]
    fn language_uses_active_provider_and_sibling_gids() {
        let store = MemoryPostStore::new();
        store.insert_with_id(10, ContentObject::new("hello", "post"));
        store.insert_with_id(11, ContentObject::new("hallo", "post"));

        let provider = MetaTranslationProvider::new("langtool");
        let mut siblings = BTreeMap::new();
        siblings.insert("de".to_string(), ContentId::new(11));
        provider
            .set_translations(&store, ContentId::new(10), "en", &siblings)
            .unwrap();

        let mut registry = TranslationRegistry::new();
        registry.register(Arc::new(provider));

        let unit = preparer()
            .with_translations(Arc::new(registry))
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        let language = unit.language.unwrap();
        assert_eq!(language.code, "en");
        assert_eq!(language.tool.as_deref(), Some("langtool"));
        assert_eq!(language.siblings.get("de").map(String::as_str), Some("1-11"));
    }

    #[test]
    fn nav_blocks_normalized_only_when_configured() {
        let store = MemoryPostStore::new();
        let body = r#"<!-- nav {"id":12,"type":"page","label":"About","url":"https://one.example/about"} -->"#;
        store.insert_with_id(10, ContentObject::new("menu", "navigation").with_body(body));

        let untouched = preparer()
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();
        assert!(untouched.body.contains(r#""id":12"#));

        let normalized = preparer()
            .prepare(
                &store,
                ContentId::new(10),
                &ExportConfig::default().with_resolve_menus(true),
            )
            .unwrap()
            .unwrap();
        assert!(normalized.body.contains(r#""kind":"custom""#));
        assert!(!normalized.body.contains(r#""id""#));
        // The URL inside the custom link was externalized.
        assert!(normalized.body.contains("{{site_url}}/about"));
    }

    #[test]
    fn hierarchy_projects_parent_and_children() {
        let store = MemoryPostStore::new();
        store.insert_with_id(1, ContentObject::new("docs", "page"));
        let mut child = ContentObject::new("install", "page");
        child.parent = Some(ContentId::new(10));
        store.insert_with_id(11, child);
        let mut object = ContentObject::new("guide", "page");
        object.parent = Some(ContentId::new(1));
        store.insert_with_id(10, object);

        let unit = preparer()
            .prepare(&store, ContentId::new(10), &ExportConfig::default())
            .unwrap()
            .unwrap();

        let hierarchy = unit.hierarchy.unwrap();
        assert_eq!(hierarchy.parent.unwrap().name, "docs");
        assert_eq!(hierarchy.children.len(), 1);
        assert_eq!(hierarchy.children[0].name, "install");
    }

    #[test]
    fn existing_gid_meta_wins_over_minting() {
        let store = MemoryPostStore::new();
        store.insert_with_id(
            50,
            ContentObject::new("hello", "post").with_meta(sync_meta::GID, json!("1-10")),
        );

        let settings = NodeSettings::new(NodeId::new(2), "https://two.example");
        let unit = ContentPreparer::for_node(&settings)
            .unwrap()
            .prepare(&store, ContentId::new(50), &ExportConfig::default())
            .unwrap()
            .unwrap();

        assert_eq!(unit.gid, "1-10");
    }
}
