//! Sled-backed document store
//!
//! Each collection is one sled tree keyed by document id, holding the
//! document's fields as JSON. Ids come from `Db::generate_id`, which is
//! monotonic across restarts.

use super::{merge_set, DocumentStore, Filter};
use crate::error::StorageError;
use crate::types::{object_id, object_id_timestamp, DocId, ID_FIELD, OBJECT_ID_WIDTH};
use crate::value::{Document, Fields};
use std::collections::BTreeSet;
use std::path::Path;

/// Name sled gives its default tree; never exposed as a collection
const DEFAULT_TREE: &[u8] = b"__sled__default";

pub struct SledDocumentStore {
    db: sled::Db,
}

impl SledDocumentStore {
    /// Open (or create) a store at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(path)?;
        let db = sled::open(path)?;
        Ok(Self::from_db(db))
    }

    /// Open a throwaway store that is removed when dropped
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self::from_db(db))
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self { db }
    }

    fn existing_tree(&self, name: &str) -> Result<Option<sled::Tree>, StorageError> {
        if !self.collection_exists(name)? {
            return Ok(None);
        }
        Ok(Some(self.db.open_tree(name)?))
    }

    fn decode(key: &[u8], value: &[u8]) -> Result<Document, StorageError> {
        let id = String::from_utf8_lossy(key).into_owned();
        let fields: Fields = serde_json::from_slice(value)?;
        Ok(Document::new(id, fields))
    }
}

impl DocumentStore for SledDocumentStore {
    fn id_width(&self) -> usize {
        OBJECT_ID_WIDTH
    }

    fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        if name.as_bytes() == DEFAULT_TREE {
            return Ok(false);
        }
        Ok(self
            .db
            .tree_names()
            .iter()
            .any(|tree| &tree[..] == name.as_bytes()))
    }

    fn list_collections(&self) -> Result<BTreeSet<String>, StorageError> {
        Ok(self
            .db
            .tree_names()
            .into_iter()
            .filter(|tree| &tree[..] != DEFAULT_TREE)
            .map(|tree| String::from_utf8_lossy(&tree).into_owned())
            .collect())
    }

    fn create_collection(&self, name: &str) -> Result<(), StorageError> {
        if self.collection_exists(name)? || name.as_bytes() == DEFAULT_TREE {
            return Err(StorageError::CollectionExists(name.to_string()));
        }
        self.db.open_tree(name)?;
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<(), StorageError> {
        if !self.collection_exists(name)? {
            return Err(StorageError::CollectionNotFound(name.to_string()));
        }
        self.db.drop_tree(name)?;
        Ok(())
    }

    fn insert(&self, collection: &str, mut fields: Fields) -> Result<DocId, StorageError> {
        let tree = self
            .existing_tree(collection)?
            .ok_or_else(|| StorageError::CollectionNotFound(collection.to_string()))?;
        fields.remove(ID_FIELD);
        let id = object_id(object_id_timestamp(), self.db.generate_id()?);
        tree.insert(id.as_bytes(), serde_json::to_vec(&fields)?)?;
        Ok(id)
    }

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StorageError> {
        let matcher = filter.compile()?;
        let Some(tree) = self.existing_tree(collection)? else {
            return Ok(Vec::new());
        };
        let limit = limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return Ok(Vec::new());
        }

        if let Some(id) = matcher.exact_id() {
            return match tree.get(id.as_bytes())? {
                Some(value) => Ok(vec![Self::decode(id.as_bytes(), &value)?]),
                None => Ok(Vec::new()),
            };
        }

        let mut found = Vec::new();
        for entry in tree.iter() {
            let (key, value) = entry?;
            let document = Self::decode(&key, &value)?;
            if matcher.matches_document(&document) {
                found.push(document);
                if found.len() >= limit {
                    break;
                }
            }
        }
        Ok(found)
    }

    fn update_set(&self, collection: &str, id: &str, fields: Fields) -> Result<bool, StorageError> {
        let Some(tree) = self.existing_tree(collection)? else {
            return Ok(false);
        };
        let Some(current) = tree.get(id.as_bytes())? else {
            return Ok(false);
        };
        let mut merged: Fields = serde_json::from_slice(&current)?;
        merge_set(&mut merged, fields);
        let encoded = serde_json::to_vec(&merged)?;
        // Lost the race against a concurrent remove: report no match.
        let swapped = tree.compare_and_swap(id.as_bytes(), Some(current), Some(encoded))?;
        Ok(swapped.is_ok())
    }

    fn remove(&self, collection: &str, id: &str) -> Result<bool, StorageError> {
        let Some(tree) = self.existing_tree(collection)? else {
            return Ok(false);
        };
        Ok(tree.remove(id.as_bytes())?.is_some())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}
