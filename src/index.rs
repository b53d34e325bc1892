//! Path Index
//!
//! Maps node identifiers to their absolute paths through the reserved
//! `index` collection, one `{_id, path}` document per non-root node, and
//! answers the parent/child/ancestor questions the hierarchy is built on.
//! Lookups are served from the cache mirror when it is enabled.

use crate::cache::CacheMirror;
use crate::error::ApiError;
use crate::store::{DocumentStore, Filter};
use crate::types::{
    child_path, descendant_prefix, is_valid_segment, normalize_path, Node, NodeId,
    INDEX_COLLECTION, INDEX_PATH, PATH_FIELD, PATH_SEPARATOR, ROOT_COLLECTION, ROOT_PATH,
};
use crate::value::{Document, Fields};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Position of a non-root node in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: NodeId,
    pub path: String,
}

impl IndexEntry {
    /// The entry as it is read back through the `index` node
    pub fn to_document(&self) -> Document {
        let mut fields = Fields::new();
        fields.insert(
            PATH_FIELD.to_string(),
            serde_json::Value::String(self.path.clone()),
        );
        Document::new(self.id.clone(), fields)
    }
}

pub struct PathIndex {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CacheMirror>,
}

impl PathIndex {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<CacheMirror>) -> Self {
        Self {
            store,
            cache,
        }
    }

    /// Resolve a path to its node. `/` is root, `index` the index node.
    pub fn resolve(&self, path: &str) -> Result<Node, ApiError> {
        let path = normalize_path(path);
        if path == ROOT_PATH {
            return Ok(Node::Root);
        }
        if path == INDEX_PATH {
            return Ok(Node::Index);
        }
        self.id_of_path(&path)?
            .map(Node::Collection)
            .ok_or_else(|| ApiError::NotFound(format!("path {} doesn't exist", path)))
    }

    /// Path of a node
    pub fn path_of(&self, node: &Node) -> Result<String, ApiError> {
        match node {
            Node::Root => Ok(ROOT_PATH.to_string()),
            Node::Index => Ok(INDEX_PATH.to_string()),
            Node::Collection(id) => self.path_of_id(id),
        }
    }

    /// Path recorded for a node id. `root` maps to `/`.
    pub fn path_of_id(&self, id: &str) -> Result<String, ApiError> {
        if id == ROOT_COLLECTION {
            return Ok(ROOT_PATH.to_string());
        }
        self.lookup_path(id)?
            .ok_or_else(|| ApiError::NotFound(format!("{} isn't a node", id)))
    }

    /// Path recorded in the index entry `id`, if there is one
    pub fn lookup_path(&self, id: &str) -> Result<Option<String>, ApiError> {
        if let Some(cached) = self.cache.read(|m| m.path_of(id).map(str::to_string)) {
            return Ok(cached);
        }
        let found = self
            .store
            .find(INDEX_COLLECTION, &Filter::id(id), Some(1))?;
        Ok(found.into_iter().next().and_then(|doc| {
            doc.fields
                .get(PATH_FIELD)
                .and_then(|p| p.as_str())
                .map(str::to_string)
        }))
    }

    /// Node id whose index entry records exactly `path`
    pub fn id_of_path(&self, path: &str) -> Result<Option<NodeId>, ApiError> {
        if let Some(cached) = self.cache.read(|m| m.id_of(path).cloned()) {
            return Ok(cached);
        }
        let found = self
            .store
            .find(INDEX_COLLECTION, &Filter::eq(PATH_FIELD, path), Some(1))?;
        Ok(found.into_iter().next().map(|doc| doc.id))
    }

    /// Whether a node with exactly this path exists
    pub fn path_exists(&self, path: &str) -> Result<bool, ApiError> {
        if let Some(cached) = self.cache.read(|m| m.contains_path(path)) {
            return Ok(cached);
        }
        let count =
            self.store
                .count_matching(INDEX_COLLECTION, &Filter::eq(PATH_FIELD, path), Some(1))?;
        Ok(count > 0)
    }

    /// Whether any index path lies strictly below `path`
    pub fn has_descendants(&self, path: &str) -> Result<bool, ApiError> {
        let prefix = descendant_prefix(path);
        if let Some(cached) = self.cache.read(|m| m.any_path_with_prefix(&prefix)) {
            return Ok(cached);
        }
        let count = self.store.count_matching(
            INDEX_COLLECTION,
            &Filter::prefix(PATH_FIELD, prefix),
            Some(1),
        )?;
        Ok(count > 0)
    }

    /// All index paths strictly below `path`
    pub fn descendant_paths(&self, path: &str) -> Result<BTreeSet<String>, ApiError> {
        let prefix = descendant_prefix(path);
        if let Some(cached) = self.cache.read(|m| m.paths_with_prefix(&prefix)) {
            return Ok(cached);
        }
        Ok(self.store.distinct_values(
            INDEX_COLLECTION,
            PATH_FIELD,
            &Filter::prefix(PATH_FIELD, prefix),
        )?)
    }

    /// Every index entry, in id order
    pub fn entries(&self) -> Result<Vec<IndexEntry>, ApiError> {
        if let Some(cached) = self.cache.read(|m| {
            m.entries()
                .iter()
                .map(|(id, path)| IndexEntry {
                    id: id.clone(),
                    path: path.clone(),
                })
                .collect::<Vec<_>>()
        }) {
            return Ok(cached);
        }
        Ok(self
            .store
            .find(INDEX_COLLECTION, &Filter::All, None)?
            .into_iter()
            .filter_map(|doc| {
                let path = doc.fields.get(PATH_FIELD)?.as_str()?.to_string();
                Some(IndexEntry { id: doc.id, path })
            })
            .collect())
    }

    /// Whether any index entry matches `filter`
    pub fn exists(&self, filter: &Filter) -> Result<bool, ApiError> {
        let matcher = filter
            .compile()
            .map_err(|e| ApiError::InvalidValue(e.to_string()))?;
        let cached = self.cache.read(|m| match matcher.exact_id() {
            Some(id) => m.path_of(id).is_some(),
            None => match filter {
                Filter::Eq { field, value } if field == PATH_FIELD => {
                    value.as_str().is_some_and(|p| m.contains_path(p))
                }
                _ => m.matching(&matcher).next().is_some(),
            },
        });
        if let Some(found) = cached {
            return Ok(found);
        }
        Ok(self.store.count_matching(INDEX_COLLECTION, filter, Some(1))? > 0)
    }

    /// Child path of `child` below the node at `parent_path`
    pub fn child_path(&self, child: &str, parent_path: &str) -> String {
        child_path(&normalize_path(parent_path), child)
    }

    /// Whether `parent_path` has a child node hanging from `child`
    pub fn has_child(&self, child: &str, parent_path: &str) -> Result<bool, ApiError> {
        self.path_exists(&self.child_path(child, parent_path))
    }

    /// Node id of the child hanging from `child` at `parent_path`
    pub fn get_child(&self, child: &str, parent_path: &str) -> Result<Option<NodeId>, ApiError> {
        self.id_of_path(&self.child_path(child, parent_path))
    }

    /// Whether the node named by `node` has any descendant path.
    ///
    /// `node` is either a node id with its own index entry, `root`, or a
    /// child segment below `context_path`. Unknown nodes are not ancestors.
    pub fn is_ancestor(&self, node: &str, context_path: &str) -> Result<bool, ApiError> {
        let target = if node == ROOT_COLLECTION {
            Some(ROOT_PATH.to_string())
        } else if let Some(path) = self.lookup_path(node)? {
            Some(path)
        } else {
            let candidate = self.child_path(node, context_path);
            self.path_exists(&candidate)?.then_some(candidate)
        };
        match target {
            Some(path) => self.has_descendants(&path),
            None => Ok(false),
        }
    }

    /// Create the child node hanging from `child` at `parent_path`.
    ///
    /// Inserts the index entry, then creates the node's collection. If the
    /// collection cannot be created the entry stays in place and the error is
    /// returned.
    pub fn create_child(&self, child: &str, parent_path: &str) -> Result<IndexEntry, ApiError> {
        self.insert_child(child, parent_path, false)
    }

    /// Like `create_child`, but `child` must name a document stored in the
    /// parent node. The check and the insert run under one exclusion with
    /// `remove_document`, so a child never outlives its document.
    pub fn create_document_child(
        &self,
        child: &str,
        parent_path: &str,
    ) -> Result<IndexEntry, ApiError> {
        self.insert_child(child, parent_path, true)
    }

    fn insert_child(
        &self,
        child: &str,
        parent_path: &str,
        require_document: bool,
    ) -> Result<IndexEntry, ApiError> {
        let width = self.store.id_width();
        if !is_valid_segment(child, width) {
            return Err(ApiError::InvalidValue(format!(
                "child segment {:?} must be {} visible ASCII bytes without {:?}",
                child, width, PATH_SEPARATOR
            )));
        }

        // Held from parent resolution on, so the parent can't be removed
        // under us
        let _guard = self.cache.exclusive();

        let parent = self.resolve(parent_path)?;
        if parent == Node::Index {
            return Err(ApiError::PermissionDenied(
                "index can't have children".to_string(),
            ));
        }
        if require_document
            && self
                .store
                .count_matching(parent.collection(), &Filter::id(child), Some(1))?
                == 0
        {
            return Err(ApiError::NotFound(format!(
                "{} at {} doesn't exist",
                child, parent_path
            )));
        }
        let path = child_path(&self.path_of(&parent)?, child);

        if self.path_exists(&path)? {
            return Err(ApiError::AlreadyExists(format!("{} already exists", path)));
        }

        let mut fields = Fields::new();
        fields.insert(
            PATH_FIELD.to_string(),
            serde_json::Value::String(path.clone()),
        );
        let id = self.store.insert(INDEX_COLLECTION, fields)?;
        self.cache
            .write_through(|m| m.insert_entry(id.clone(), path.clone()));

        if let Err(e) = self.store.create_collection(&id) {
            warn!(id = %id, path = %path, error = %e, "Index entry created without its collection");
            return Err(e.into());
        }
        self.cache.write_through(|m| m.insert_collection(&id));

        info!(id = %id, path = %path, "Created child node");
        Ok(IndexEntry { id, path })
    }

    /// Delete the child node hanging from `child` at `parent_path`
    pub fn delete_child(&self, child: &str, parent_path: &str) -> Result<(), ApiError> {
        let path = self.child_path(child, parent_path);
        let id = self.id_of_path(&path)?.ok_or_else(|| {
            ApiError::NotFound(format!("{} at {} doesn't have a child", child, parent_path))
        })?;
        self.remove_node(&id)
    }

    /// Delete a non-root node: drop its collection and remove its entry.
    ///
    /// Refused while any path extends the node's path or its collection
    /// still holds documents.
    pub fn remove_node(&self, id: &str) -> Result<(), ApiError> {
        let node = Node::from_collection(id);
        if node.is_reserved() {
            return Err(ApiError::PermissionDenied(format!("{} can't be deleted", id)));
        }

        let _guard = self.cache.exclusive();

        let path = self.path_of_id(id)?;
        if self.has_descendants(&path)? {
            return Err(ApiError::HasDescendants(format!("{} has descendants", path)));
        }
        if self.store.count_matching(id, &Filter::All, Some(1))? > 0 {
            return Err(ApiError::HasDescendants(format!("{} still holds documents", path)));
        }

        if self.store.collection_exists(id)? {
            self.store.drop_collection(id)?;
        } else {
            debug!(id = %id, "Node collection already missing");
        }
        self.cache.write_through(|m| m.remove_collection(id));

        self.store.remove(INDEX_COLLECTION, id)?;
        self.cache.write_through(|m| m.remove_entry(id));

        info!(id = %id, path = %path, "Deleted node");
        Ok(())
    }

    /// Remove document `id` from `node`, unless a child node hangs from it. Returns whether the document existed.
    ///
    /// Runs under the same exclusion as `create_child`, so a child can't be
    /// attached between the check and the removal.
    pub fn remove_document(&self, node: &Node, id: &str) -> Result<bool, ApiError> {
        let _guard = self.cache.exclusive();
        let node_path = self.path_of(node)?;
        if self.has_child(id, &node_path)? {
            return Err(ApiError::HasDescendants(format!(
                "{} at {} has a child",
                id, node_path
            )));
        }
        Ok(self.store.remove(node.collection(), id)?)
    }

    /// Last segment of a node's path; empty for root
    pub fn parent_segment(&self, path: &str) -> Result<String, ApiError> {
        let node = self.resolve(path)?;
        let full = self.path_of(&node)?;
        Ok(full
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or_default()
            .to_string())
    }

    /// Collection names, from the mirror when enabled
    pub fn collections(&self) -> Result<BTreeSet<String>, ApiError> {
        if let Some(cached) = self.cache.read(|m| m.collections().clone()) {
            return Ok(cached);
        }
        Ok(self.store.list_collections()?)
    }

    pub fn collection_exists(&self, name: &str) -> Result<bool, ApiError> {
        if let Some(cached) = self.cache.read(|m| m.has_collection(name)) {
            return Ok(cached);
        }
        Ok(self.store.collection_exists(name)?)
    }
}
