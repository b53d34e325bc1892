//! Branch session
//!
//! A connected view of a document store as a tree. Callers address documents
//! by node path plus document id; every operation resolves the path first
//! and then delegates to the node's collection. Index-affecting operations
//! go through the `PathIndex`, which writes through to the cache mirror.

use crate::cache::{CacheMirror, CacheState};
use crate::config::{BranchConfig, CacheConfig};
use crate::error::ApiError;
use crate::index::{IndexEntry, PathIndex};
use crate::store::{DocumentStore, Filter, MemoryStore, SledDocumentStore};
use crate::structure::{Structure, StructureBuilder};
use crate::types::{DocId, Node, NodeId, INDEX_COLLECTION, ROOT_COLLECTION};
use crate::value::{Document, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct Branch {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheMirror>,
    index: PathIndex,
}

impl Branch {
    /// Connect to `store`, creating the `root` and `index` collections if missing
    pub fn connect(store: Arc<dyn DocumentStore>) -> Result<Self, ApiError> {
        for reserved in [ROOT_COLLECTION, INDEX_COLLECTION] {
            if !store.collection_exists(reserved)? {
                info!(collection = reserved, "Creating reserved collection");
                store.create_collection(reserved)?;
            }
        }
        let cache = Arc::new(CacheMirror::new());
        let index = PathIndex::new(store.clone(), cache.clone());
        debug!("Branch session ready");
        Ok(Self {
            store,
            cache,
            index,
        })
    }

    /// Connect and apply the cache settings
    pub fn connect_with(
        store: Arc<dyn DocumentStore>,
        cache: &CacheConfig,
    ) -> Result<Self, ApiError> {
        let branch = Self::connect(store)?;
        if cache.enabled {
            branch.cache_enable()?;
        }
        Ok(branch)
    }

    /// Open the configured store and connect
    pub fn open(config: &BranchConfig) -> Result<Self, ApiError> {
        let store: Arc<dyn DocumentStore> = match config.storage.backend.as_str() {
            "memory" => Arc::new(MemoryStore::new()),
            "sled" => {
                let path = config.storage.resolve_path()?;
                info!(path = %path.display(), "Opening sled store");
                Arc::new(SledDocumentStore::open(&path)?)
            }
            other => {
                return Err(ApiError::ConfigError(format!(
                    "Unknown storage backend: {} (must be 'sled' or 'memory')",
                    other
                )))
            }
        };
        Self::connect_with(store, &config.cache)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    // Collections

    pub fn collections(&self) -> Result<BTreeSet<String>, ApiError> {
        self.index.collections()
    }

    pub fn collection_exists(&self, name: &str) -> Result<bool, ApiError> {
        self.index.collection_exists(name)
    }

    /// Delete a childless, empty node by id, together with its index entry
    pub fn delete_node(&self, id: &str) -> Result<(), ApiError> {
        self.index.remove_node(id)
    }

    // Documents

    /// Insert a document into the node at `path` and return its id
    pub fn create_object(&self, value: impl Into<Value>, path: &str) -> Result<DocId, ApiError> {
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            return Err(ApiError::PermissionDenied(
                "index entries are created through create_child".to_string(),
            ));
        }
        let fields = value.into().into_fields()?;
        Ok(self.store.insert(node.collection(), fields)?)
    }

    /// Read document `id` from the node at `path`
    pub fn read_object(&self, id: &str, path: &str) -> Result<Document, ApiError> {
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            let entry_path = self
                .index
                .lookup_path(id)?
                .ok_or_else(|| not_found(id, path))?;
            return Ok(IndexEntry {
                id: id.to_string(),
                path: entry_path,
            }
            .to_document());
        }
        self.store
            .find(node.collection(), &Filter::id(id), Some(1))?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(id, path))
    }

    /// Merge `value` into document `id` at `path`; only supplied keys change
    pub fn update_object(
        &self,
        id: &str,
        value: impl Into<Value>,
        path: &str,
    ) -> Result<(), ApiError> {
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            return Err(ApiError::PermissionDenied(
                "index entries are immutable".to_string(),
            ));
        }
        let fields = value.into().into_fields()?;
        if !self.store.update_set(node.collection(), id, fields)? {
            return Err(not_found(id, path));
        }
        Ok(())
    }

    /// Delete document `id` at `path`. A document with a child node can't be
    /// deleted; deleting from `index` deletes the node the entry records.
    pub fn delete_object(&self, id: &str, path: &str) -> Result<(), ApiError> {
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            return match self.index.remove_node(id) {
                Err(ApiError::NotFound(_)) => Err(not_found(id, path)),
                other => other,
            };
        }
        if self
            .store
            .count_matching(node.collection(), &Filter::id(id), Some(1))?
            == 0
        {
            return Err(not_found(id, path));
        }
        if !self.index.remove_document(&node, id)? {
            return Err(not_found(id, path));
        }
        Ok(())
    }

    /// Whether any document at `path` matches `filter`
    pub fn object_exists(&self, filter: &Filter, path: &str) -> Result<bool, ApiError> {
        check_filter(filter)?;
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            return self.index.exists(filter);
        }
        Ok(self.store.count_matching(node.collection(), filter, Some(1))? > 0)
    }

    /// First document at `path` matching `filter`
    pub fn search_object(&self, filter: &Filter, path: &str) -> Result<Option<Document>, ApiError> {
        check_filter(filter)?;
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            return Err(ApiError::PermissionDenied(
                "index can't be searched".to_string(),
            ));
        }
        Ok(self
            .store
            .find(node.collection(), filter, Some(1))?
            .into_iter()
            .next())
    }

    /// Every document at `path`
    pub fn get_objects(&self, path: &str) -> Result<Vec<Document>, ApiError> {
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            return Ok(self
                .index
                .entries()?
                .iter()
                .map(|entry| entry.to_document())
                .collect());
        }
        Ok(self.store.find(node.collection(), &Filter::All, None)?)
    }

    /// Documents of the child node hanging from `id` at `path`
    pub fn get_children(&self, id: &str, path: &str) -> Result<Vec<Document>, ApiError> {
        let child = self
            .index
            .get_child(id, path)?
            .ok_or_else(|| ApiError::NotFound(format!("{} at {} doesn't have a child", id, path)))?;
        Ok(self.store.find(&child, &Filter::All, None)?)
    }

    // Hierarchy

    /// Resolve a path to its node
    pub fn resolve(&self, path: &str) -> Result<Node, ApiError> {
        self.index.resolve(path)
    }

    /// Create the child node hanging from document `id` at `path` and return
    /// its path. The document must exist.
    pub fn create_child(&self, id: &str, path: &str) -> Result<String, ApiError> {
        Ok(self.index.create_document_child(id, path)?.path)
    }

    /// Node id of the child hanging from `id` at `path`
    pub fn get_child(&self, id: &str, path: &str) -> Result<Option<NodeId>, ApiError> {
        self.index.get_child(id, path)
    }

    /// Whether `id` at `path` has a child node
    pub fn has_child(&self, id: &str, path: &str) -> Result<bool, ApiError> {
        self.index.has_child(id, path)
    }

    /// Delete the child node hanging from `id` at `path`
    pub fn delete_child(&self, id: &str, path: &str) -> Result<(), ApiError> {
        self.index.delete_child(id, path)
    }

    /// Whether the node named by `id` (node id, or child segment at `path`)
    /// has descendants
    pub fn is_ancestor(&self, id: &str, path: &str) -> Result<bool, ApiError> {
        self.index.is_ancestor(id, path)
    }

    /// Path of a node id; `root` is `/`
    pub fn get_path(&self, node: &str) -> Result<String, ApiError> {
        if node == INDEX_COLLECTION {
            return self.index.path_of(&Node::Index);
        }
        self.index.path_of_id(node)
    }

    /// Segment the node at `path` hangs from; empty for root
    pub fn get_parent(&self, path: &str) -> Result<String, ApiError> {
        self.index.parent_segment(path)
    }

    /// Nested structure of every node below `path`
    pub fn get_structure(&self, path: &str) -> Result<Structure, ApiError> {
        let node = self.index.resolve(path)?;
        if node == Node::Index {
            return Err(ApiError::PermissionDenied(
                "index has no structure".to_string(),
            ));
        }
        let root_path = self.index.path_of(&node)?;
        let paths = self.index.descendant_paths(&root_path)?;
        Ok(StructureBuilder::new(self.store.id_width()).build(&root_path, paths))
    }

    /// Nested structure below the child node hanging from `id` at `path`
    pub fn get_descendants(&self, id: &str, path: &str) -> Result<Structure, ApiError> {
        let child_path = self.index.child_path(id, path);
        if !self.index.path_exists(&child_path)? {
            return Err(ApiError::NotFound(format!(
                "{} at {} doesn't have a child",
                id, path
            )));
        }
        self.get_structure(&child_path)
    }

    // Cache

    pub fn cache_enable(&self) -> Result<(), ApiError> {
        self.cache.enable(self.store.as_ref())
    }

    pub fn cache_disable(&self) -> Result<(), ApiError> {
        self.cache.disable()
    }

    pub fn cache_update(&self) -> Result<(), ApiError> {
        self.cache.update(self.store.as_ref())
    }

    pub fn cache_status(&self) -> CacheState {
        self.cache.state()
    }

    /// Flush the store's buffered writes
    pub fn flush(&self) -> Result<(), ApiError> {
        Ok(self.store.flush()?)
    }
}

/// A filter that can't compile is a caller error, not a store failure
fn check_filter(filter: &Filter) -> Result<(), ApiError> {
    filter
        .compile()
        .map(|_| ())
        .map_err(|e| ApiError::InvalidValue(e.to_string()))
}

fn not_found(id: &str, path: &str) -> ApiError {
    ApiError::NotFound(format!("{} at {} doesn't exist", id, path))
}
