//! The post store abstraction and its in-memory implementation.

use crate::error::{StoreError, StoreResult};
use crate::object::{ContentObject, Term};
use crate::types::ContentId;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;

/// Contract over the underlying CMS persistence layer.
///
/// The synchronization engine consumes this interface exclusively; the
/// real persistence layer (posts, meta, taxonomy, media library) is an
/// external collaborator. Lookups for absent objects return `Ok(None)`,
/// never an error.
pub trait PostStore: Send + Sync {
    /// Gets a content object by id.
    fn get(&self, id: ContentId) -> StoreResult<Option<ContentObject>>;

    /// Creates a content object, assigning a fresh id.
    ///
    /// The id carried by `draft` is ignored. Returns the stored object.
    fn create(&self, draft: ContentObject) -> StoreResult<ContentObject>;

    /// Updates an existing content object in place.
    fn update(&self, object: &ContentObject) -> StoreResult<()>;

    /// Deletes a content object.
    ///
    /// With `permanent` the object is removed outright; otherwise its
    /// status becomes `trash`. Returns whether the object existed.
    fn delete(&self, id: ContentId, permanent: bool) -> StoreResult<bool>;

    /// Finds an object by `(name, object_type)`.
    fn find_by_name_type(
        &self,
        name: &str,
        object_type: &str,
    ) -> StoreResult<Option<ContentObject>>;

    /// Finds all objects carrying the given meta key/value pair.
    fn find_by_meta(&self, key: &str, value: &Value) -> StoreResult<Vec<ContentObject>>;

    /// Lists every object in the store.
    fn list(&self) -> StoreResult<Vec<ContentObject>>;

    /// Sets one meta value on an object.
    fn set_meta(&self, id: ContentId, key: &str, value: Value) -> StoreResult<()>;

    /// Removes one meta value from an object. Returns whether it existed.
    fn delete_meta(&self, id: ContentId, key: &str) -> StoreResult<bool>;

    /// Gets a term by id.
    fn term(&self, id: u64) -> StoreResult<Option<Term>>;

    /// Finds a term by `(taxonomy, slug)`.
    fn find_term(&self, taxonomy: &str, slug: &str) -> StoreResult<Option<Term>>;

    /// Creates a term, assigning a fresh id. Returns the stored term.
    fn create_term(&self, draft: Term) -> StoreResult<Term>;

    /// Lists every term of one taxonomy.
    fn taxonomy_terms(&self, taxonomy: &str) -> StoreResult<Vec<Term>>;

    /// Returns the terms assigned to an object, across all taxonomies.
    fn object_terms(&self, id: ContentId) -> StoreResult<Vec<Term>>;

    /// Replaces the terms assigned to an object for one taxonomy.
    fn set_object_terms(&self, id: ContentId, taxonomy: &str, term_ids: &[u64]) -> StoreResult<()>;

    /// Reads the bytes of an asset file by uploads-relative path.
    fn asset_bytes(&self, relative_path: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Writes an asset file at the given uploads-relative path.
    fn store_asset(&self, relative_path: &str, bytes: Vec<u8>) -> StoreResult<()>;
}

/// An in-memory post store.
///
/// Backs node fixtures and tests; also serves as the reference
/// implementation of the `PostStore` contract.
pub struct MemoryPostStore {
    objects: RwLock<BTreeMap<u64, ContentObject>>,
    terms: RwLock<BTreeMap<u64, Term>>,
    assets: RwLock<BTreeMap<String, Vec<u8>>>,
    next_object_id: RwLock<u64>,
    next_term_id: RwLock<u64>,
}

impl MemoryPostStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            terms: RwLock::new(BTreeMap::new()),
            assets: RwLock::new(BTreeMap::new()),
            next_object_id: RwLock::new(1),
            next_term_id: RwLock::new(1),
        }
    }

    /// Inserts an object under a caller-chosen id.
    ///
    /// Fixture helper; the id counter is advanced past the given id.
    pub fn insert_with_id(&self, id: u64, mut object: ContentObject) {
        object.id = ContentId::new(id);
        let mut next = self.next_object_id.write();
        if *next <= id {
            *next = id + 1;
        }
        self.objects.write().insert(id, object);
    }

    /// Inserts a term under a caller-chosen id.
    pub fn insert_term_with_id(&self, id: u64, mut term: Term) {
        term.id = id;
        let mut next = self.next_term_id.write();
        if *next <= id {
            *next = id + 1;
        }
        self.terms.write().insert(id, term);
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if no objects are stored.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryPostStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PostStore for MemoryPostStore {
    fn get(&self, id: ContentId) -> StoreResult<Option<ContentObject>> {
        Ok(self.objects.read().get(&id.as_u64()).cloned())
    }

    fn create(&self, mut draft: ContentObject) -> StoreResult<ContentObject> {
        if draft.name.is_empty() {
            return Err(StoreError::invalid_object("name must not be empty"));
        }
        let id = {
            let mut next = self.next_object_id.write();
            let id = *next;
            *next += 1;
            id
        };
        draft.id = ContentId::new(id);
        self.objects.write().insert(id, draft.clone());
        Ok(draft)
    }

    fn update(&self, object: &ContentObject) -> StoreResult<()> {
        let mut objects = self.objects.write();
        if !objects.contains_key(&object.id.as_u64()) {
            return Err(StoreError::invalid_object(format!(
                "cannot update missing object {}",
                object.id
            )));
        }
        objects.insert(object.id.as_u64(), object.clone());
        Ok(())
    }

    fn delete(&self, id: ContentId, permanent: bool) -> StoreResult<bool> {
        let mut objects = self.objects.write();
        if permanent {
            Ok(objects.remove(&id.as_u64()).is_some())
        } else {
            match objects.get_mut(&id.as_u64()) {
                Some(object) => {
                    object.status = "trash".into();
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn find_by_name_type(
        &self,
        name: &str,
        object_type: &str,
    ) -> StoreResult<Option<ContentObject>> {
        Ok(self
            .objects
            .read()
            .values()
            .find(|o| o.name == name && o.object_type == object_type)
            .cloned())
    }

    fn find_by_meta(&self, key: &str, value: &Value) -> StoreResult<Vec<ContentObject>> {
        Ok(self
            .objects
            .read()
            .values()
            .filter(|o| o.meta.get(key) == Some(value))
            .cloned()
            .collect())
    }

    fn list(&self) -> StoreResult<Vec<ContentObject>> {
        Ok(self.objects.read().values().cloned().collect())
    }

    fn set_meta(&self, id: ContentId, key: &str, value: Value) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let object = objects.get_mut(&id.as_u64()).ok_or_else(|| {
            StoreError::invalid_object(format!("cannot set meta on missing object {id}"))
        })?;
        object.meta.insert(key.to_string(), value);
        Ok(())
    }

    fn delete_meta(&self, id: ContentId, key: &str) -> StoreResult<bool> {
        let mut objects = self.objects.write();
        match objects.get_mut(&id.as_u64()) {
            Some(object) => Ok(object.meta.remove(key).is_some()),
            None => Ok(false),
        }
    }

    fn term(&self, id: u64) -> StoreResult<Option<Term>> {
        Ok(self.terms.read().get(&id).cloned())
    }

    fn find_term(&self, taxonomy: &str, slug: &str) -> StoreResult<Option<Term>> {
        Ok(self
            .terms
            .read()
            .values()
            .find(|t| t.taxonomy == taxonomy && t.slug == slug)
            .cloned())
    }

    fn create_term(&self, mut draft: Term) -> StoreResult<Term> {
        let id = {
            let mut next = self.next_term_id.write();
            let id = *next;
            *next += 1;
            id
        };
        draft.id = id;
        self.terms.write().insert(id, draft.clone());
        Ok(draft)
    }

    fn taxonomy_terms(&self, taxonomy: &str) -> StoreResult<Vec<Term>> {
        Ok(self
            .terms
            .read()
            .values()
            .filter(|t| t.taxonomy == taxonomy)
            .cloned()
            .collect())
    }

    fn object_terms(&self, id: ContentId) -> StoreResult<Vec<Term>> {
        let assigned = match self.objects.read().get(&id.as_u64()) {
            Some(object) => object.terms.clone(),
            None => return Ok(Vec::new()),
        };
        let terms = self.terms.read();
        let mut result = Vec::new();
        for ids in assigned.values() {
            for term_id in ids {
                if let Some(term) = terms.get(term_id) {
                    result.push(term.clone());
                }
            }
        }
        Ok(result)
    }

    fn set_object_terms(&self, id: ContentId, taxonomy: &str, term_ids: &[u64]) -> StoreResult<()> {
        let mut objects = self.objects.write();
        let object = objects.get_mut(&id.as_u64()).ok_or_else(|| {
            StoreError::invalid_object(format!("cannot assign terms to missing object {id}"))
        })?;
        object
            .terms
            .insert(taxonomy.to_string(), term_ids.to_vec());
        Ok(())
    }

    fn asset_bytes(&self, relative_path: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.assets.read().get(relative_path).cloned())
    }

    fn store_asset(&self, relative_path: &str, bytes: Vec<u8>) -> StoreResult<()> {
        self.assets.write().insert(relative_path.to_string(), bytes);
        Ok(())
    }
}
