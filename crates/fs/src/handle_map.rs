//! Process-wide registry of live file handles.
//!
//! Keyed by handle id with a secondary index by path, both updated under
//! one mutex. The path index is what lets a truncate on a path reach an
//! already-open write handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use irods_fuse_common::path::normalize_path;

use crate::handle::FileHandle;

struct MapInner {
    by_id: HashMap<u64, Arc<FileHandle>>,
    by_path: HashMap<String, Vec<u64>>,
}

/// Registry of all open handles in the mount.
pub struct FileHandleMap {
    inner: Mutex<MapInner>,
    next_id: AtomicU64,
}

impl FileHandleMap {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MapInner {
                by_id: HashMap::new(),
                by_path: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Reserve a handle id.
    pub fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a handle under its id and path.
    ///
    /// # Arguments
    /// * `handle` - The handle to register
    pub fn add(&self, handle: Arc<FileHandle>) {
        let path: String = normalize_path(handle.path());
        let mut inner = self.inner.lock().unwrap();
        inner.by_path.entry(path).or_default().push(handle.id());
        inner.by_id.insert(handle.id(), handle);
    }

    /// Look up a handle by id.
    ///
    /// # Arguments
    /// * `id` - Handle id
    pub fn get(&self, id: u64) -> Option<Arc<FileHandle>> {
        self.inner.lock().unwrap().by_id.get(&id).cloned()
    }

    /// Remove a handle, returning it if it was registered.
    ///
    /// # Arguments
    /// * `id` - Handle id
    pub fn remove(&self, id: u64) -> Option<Arc<FileHandle>> {
        let mut inner = self.inner.lock().unwrap();
        let handle: Arc<FileHandle> = inner.by_id.remove(&id)?;

        let path: String = normalize_path(handle.path());
        if let Some(ids) = inner.by_path.get_mut(&path) {
            ids.retain(|&registered: &u64| registered != id);
            if ids.is_empty() {
                inner.by_path.remove(&path);
            }
        }

        Some(handle)
    }

    /// All handles currently open at a path.
    ///
    /// # Arguments
    /// * `path` - Mount-relative path
    pub fn list_by_path(&self, path: &str) -> Vec<Arc<FileHandle>> {
        let path: String = normalize_path(path);
        let inner = self.inner.lock().unwrap();
        inner
            .by_path
            .get(&path)
            .map(|ids: &Vec<u64>| {
                ids.iter()
                    .filter_map(|id: &u64| inner.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_id.len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FileHandleMap {
    fn default() -> Self {
        Self::new()
    }
}
