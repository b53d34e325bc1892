//! In-process document store
//!
//! Keeps every collection in memory. Used for tests and for sessions that
//! need no durability.

use super::{merge_set, DocumentStore, Filter};
use crate::error::StorageError;
use crate::types::{object_id, object_id_timestamp, DocId, ID_FIELD, OBJECT_ID_WIDTH};
use crate::value::{Document, Fields};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

type Collection = BTreeMap<DocId, Fields>;

pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Collection>>,
    counter: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(BTreeMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self) -> DocId {
        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        object_id(object_id_timestamp(), counter)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn id_width(&self) -> usize {
        OBJECT_ID_WIDTH
    }

    fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.collections.read().contains_key(name))
    }

    fn list_collections(&self) -> Result<BTreeSet<String>, StorageError> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    fn create_collection(&self, name: &str) -> Result<(), StorageError> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(StorageError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), Collection::new());
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<(), StorageError> {
        self.collections
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))
    }

    fn insert(&self, collection: &str, mut fields: Fields) -> Result<DocId, StorageError> {
        fields.remove(ID_FIELD);
        let mut collections = self.collections.write();
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        let id = self.next_id();
        docs.insert(id.clone(), fields);
        Ok(id)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StorageError> {
        let matcher = filter.compile()?;
        let collections = self.collections.read();
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        if let Some(id) = matcher.exact_id() {
            return Ok(docs
                .get(id)
                .filter(|_| limit != Some(0))
                .map(|fields| Document::new(id.to_string(), fields.clone()))
                .into_iter()
                .collect());
        }

        Ok(docs
            .iter()
            .filter(|(id, fields)| matcher.matches(id, fields))
            .take(limit.unwrap_or(usize::MAX))
            .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
            .collect())
    }

    fn update_set(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StorageError> {
        let mut collections = self.collections.write();
        let Some(existing) = collections.get_mut(collection).and_then(|c| c.get_mut(id)) else {
            return Ok(false);
        };
        merge_set(existing, fields);
        Ok(true)
    }

    fn remove(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let mut collections = self.collections.write();
        Ok(collections
            .get_mut(collection)
            .and_then(|c| c.remove(id))
            .is_some())
    }
}
