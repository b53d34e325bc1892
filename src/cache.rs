//! Cache Mirror
//!
//! Optional in-memory copy of the index collection and of the collection
//! names. Index mutations write through to it right after the store write
//! succeeds. Rebuilds load a fresh snapshot off-lock and swap it in, so a
//! reader sees either the old mirror, no mirror, or the new one.

use crate::error::{ApiError, StorageError};
use crate::store::{DocumentStore, Filter, Matcher};
use crate::types::{NodeId, INDEX_COLLECTION, PATH_FIELD};
use crate::value::Fields;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Observable cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Disabled,
    Rebuilding,
    Enabled,
}

/// Snapshot of the index and collection list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mirror {
    collections: BTreeSet<String>,
    index: BTreeMap<NodeId, String>,
}

impl Mirror {
    /// Read the full collection list and index collection from the store
    pub fn load(store: &dyn DocumentStore) -> Result<Self, StorageError> {
        let collections = store.list_collections()?;
        let mut index = BTreeMap::new();
        for entry in store.find(INDEX_COLLECTION, &Filter::All, None)? {
            match entry.fields.get(PATH_FIELD).and_then(|p| p.as_str()) {
                Some(path) => {
                    index.insert(entry.id, path.to_string());
                }
                None => warn!(id = %entry.id, "Index entry without a path, skipping"),
            }
        }
        Ok(Self { collections, index })
    }

    pub fn collections(&self) -> &BTreeSet<String> {
        &self.collections
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains(name)
    }

    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.index.get(id).map(String::as_str)
    }

    pub fn id_of(&self, path: &str) -> Option<&NodeId> {
        self.index
            .iter()
            .find_map(|(id, p)| (p == path).then_some(id))
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.index.values().any(|p| p == path)
    }

    pub fn any_path_with_prefix(&self, prefix: &str) -> bool {
        self.index.values().any(|p| p.starts_with(prefix))
    }

    pub fn paths_with_prefix(&self, prefix: &str) -> BTreeSet<String> {
        self.index
            .values()
            .filter(|p| p.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Index entries matching `matcher`, in id order
    pub fn matching<'a>(
        &'a self,
        matcher: &'a Matcher,
    ) -> impl Iterator<Item = (&'a NodeId, &'a String)> + 'a {
        self.index.iter().filter(move |(id, path)| {
            let mut fields = Fields::new();
            fields.insert(
                PATH_FIELD.to_string(),
                serde_json::Value::String((*path).clone()),
            );
            matcher.matches(id, &fields)
        })
    }

    pub fn entries(&self) -> &BTreeMap<NodeId, String> {
        &self.index
    }

    pub fn insert_entry(&mut self, id: NodeId, path: String) {
        self.index.insert(id, path);
    }

    pub fn remove_entry(&mut self, id: &str) {
        self.index.remove(id);
    }

    pub fn insert_collection(&mut self, name: &str) {
        self.collections.insert(name.to_string());
    }

    pub fn remove_collection(&mut self, name: &str) {
        self.collections.remove(name);
    }
}

enum Slot {
    Disabled,
    Rebuilding,
    Enabled(Mirror),
}

/// Process-wide cache of one session
pub struct CacheMirror {
    slot: RwLock<Slot>,
    /// Held for the whole of a rebuild, and by index mutations across their
    /// store write plus write-through.
    rebuild: Mutex<()>,
}

impl CacheMirror {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Slot::Disabled),
            rebuild: Mutex::new(()),
        }
    }

    pub fn state(&self) -> CacheState {
        match *self.slot.read() {
            Slot::Disabled => CacheState::Disabled,
            Slot::Rebuilding => CacheState::Rebuilding,
            Slot::Enabled(_) => CacheState::Enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == CacheState::Enabled
    }

    /// Load the mirror from the store. Fails with `AlreadyEnabled` if active.
    pub fn enable(&self, store: &dyn DocumentStore) -> Result<(), ApiError> {
        let _guard = self.rebuild.lock();
        if self.is_enabled() {
            return Err(ApiError::AlreadyEnabled);
        }
        info!("Enabling cache");
        self.rebuild_locked(store)
    }

    /// Drop the mirror. Fails with `AlreadyDisabled` if not active.
    pub fn disable(&self) -> Result<(), ApiError> {
        let _guard = self.rebuild.lock();
        let mut slot = self.slot.write();
        if !matches!(*slot, Slot::Enabled(_)) {
            return Err(ApiError::AlreadyDisabled);
        }
        *slot = Slot::Disabled;
        info!("Cache disabled");
        Ok(())
    }

    /// Reload the mirror from the store. Fails with `NotEnabled` if disabled.
    pub fn update(&self, store: &dyn DocumentStore) -> Result<(), ApiError> {
        let _guard = self.rebuild.lock();
        if !self.is_enabled() {
            return Err(ApiError::NotEnabled);
        }
        debug!("Refreshing cache");
        self.rebuild_locked(store)
    }

    fn rebuild_locked(&self, store: &dyn DocumentStore) -> Result<(), ApiError> {
        *self.slot.write() = Slot::Rebuilding;
        match Mirror::load(store) {
            Ok(mirror) => {
                debug!(
                    entries = mirror.index.len(),
                    collections = mirror.collections.len(),
                    "Cache rebuilt"
                );
                *self.slot.write() = Slot::Enabled(mirror);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Cache rebuild failed, cache disabled");
                *self.slot.write() = Slot::Disabled;
                Err(ApiError::StoreUnavailable(e))
            }
        }
    }

    /// Serialize an index mutation against rebuilds
    pub fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.rebuild.lock()
    }

    /// Run `f` against the mirror. `None` when the cache is not enabled.
    pub fn read<R>(&self, f: impl FnOnce(&Mirror) -> R) -> Option<R> {
        match &*self.slot.read() {
            Slot::Enabled(mirror) => Some(f(mirror)),
            _ => None,
        }
    }

    /// Apply a write-through update. No-op when the cache is not enabled.
    pub fn write_through(&self, f: impl FnOnce(&mut Mirror)) {
        if let Slot::Enabled(mirror) = &mut *self.slot.write() {
            f(mirror);
        }
    }
}

impl Default for CacheMirror {
    fn default() -> Self {
        Self::new()
    }
}
