//! In-memory object client.
//!
//! A complete driver backed by process memory. It powers the test suites of
//! every crate in the workspace and local development mounts. Besides the
//! normal contract it records a trace of backend reads and writes so
//! pipeline tests can assert the exact request pattern that reached the
//! backend, and supports error injection for sticky-error tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;

use irods_fuse_common::path::{has_path_prefix, normalize_path, path_name, path_parent};
use irods_fuse_common::FsError;

use crate::client::{ObjectClient, ObjectHandle};
use crate::types::{Access, AccessLevel, Entry, EntryKind, OpenMode, XattrEntry};

/// One backend data call, as recorded in the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoTraceEntry {
    /// Object path.
    pub path: String,
    /// Byte offset of the call.
    pub offset: u64,
    /// Length of the call in bytes.
    pub len: usize,
}

#[derive(Debug)]
struct Node {
    id: u64,
    kind: EntryKind,
    data: Vec<u8>,
    owner: String,
    create_time: SystemTime,
    modify_time: SystemTime,
    xattrs: HashMap<String, Vec<u8>>,
    access: Vec<Access>,
}

#[derive(Default)]
struct ZoneState {
    nodes: HashMap<String, Node>,
    read_trace: Vec<IoTraceEntry>,
    write_trace: Vec<IoTraceEntry>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory object client over a synthetic zone tree.
pub struct MemoryObjectClient {
    state: Arc<Mutex<ZoneState>>,
    next_id: AtomicU64,
    default_owner: String,
}

impl MemoryObjectClient {
    /// Create a client with an empty zone containing only the root
    /// collection.
    pub fn new() -> Self {
        Self::with_owner("rods")
    }

    /// Create a client whose entries are owned by `owner`.
    ///
    /// # Arguments
    /// * `owner` - Default owner for created entries
    pub fn with_owner(owner: impl Into<String>) -> Self {
        let client: Self = Self {
            state: Arc::new(Mutex::new(ZoneState::default())),
            next_id: AtomicU64::new(1000),
            default_owner: owner.into(),
        };
        client.insert_node("/", EntryKind::Dir, Vec::new());
        client
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn insert_node(&self, path: &str, kind: EntryKind, data: Vec<u8>) -> u64 {
        let id: u64 = self.allocate_id();
        let now: SystemTime = SystemTime::now();
        let node: Node = Node {
            id,
            kind,
            data,
            owner: self.default_owner.clone(),
            create_time: now,
            modify_time: now,
            xattrs: HashMap::new(),
            access: vec![Access {
                user_name: self.default_owner.clone(),
                level: AccessLevel::Own,
            }],
        };
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(normalize_path(path), node);
        id
    }

    /// Seed a collection (and its ancestors) into the zone.
    ///
    /// # Arguments
    /// * `path` - Absolute collection path
    pub fn add_dir(&self, path: &str) {
        let path: String = normalize_path(path);
        let mut ancestors: Vec<String> = Vec::new();
        let mut current: String = path;
        while current != "/" {
            ancestors.push(current.clone());
            current = path_parent(&current);
        }
        for dir in ancestors.into_iter().rev() {
            let exists: bool = self.state.lock().unwrap().nodes.contains_key(&dir);
            if !exists {
                self.insert_node(&dir, EntryKind::Dir, Vec::new());
            }
        }
    }

    /// Seed a data object into the zone, creating parent collections.
    ///
    /// # Arguments
    /// * `path` - Absolute object path
    /// * `data` - Object content
    pub fn add_file(&self, path: &str, data: Vec<u8>) {
        let path: String = normalize_path(path);
        self.add_dir(&path_parent(&path));
        self.insert_node(&path, EntryKind::File, data);
    }

    /// Grant an access level to a user on an entry.
    ///
    /// # Arguments
    /// * `path` - Entry path
    /// * `user` - User name
    /// * `level` - Access level to grant
    pub fn grant(&self, path: &str, user: &str, level: AccessLevel) {
        let path: String = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        if let Some(node) = state.nodes.get_mut(&path) {
            node.access.retain(|a: &Access| a.user_name != user);
            node.access.push(Access {
                user_name: user.to_string(),
                level,
            });
        }
    }

    /// Get the current content of an object (test probe).
    ///
    /// # Arguments
    /// * `path` - Object path
    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        let path: String = normalize_path(path);
        self.state
            .lock()
            .unwrap()
            .nodes
            .get(&path)
            .map(|n: &Node| n.data.clone())
    }

    /// Backend read calls recorded so far.
    pub fn read_trace(&self) -> Vec<IoTraceEntry> {
        self.state.lock().unwrap().read_trace.clone()
    }

    /// Backend write calls recorded so far.
    pub fn write_trace(&self) -> Vec<IoTraceEntry> {
        self.state.lock().unwrap().write_trace.clone()
    }

    /// Clear the recorded traces.
    pub fn clear_traces(&self) {
        let mut state = self.state.lock().unwrap();
        state.read_trace.clear();
        state.write_trace.clear();
    }

    /// Make every subsequent backend read fail (error injection).
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    /// Make every subsequent backend write fail (error injection).
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    fn entry_for(&self, path: &str, node: &Node) -> Entry {
        Entry {
            id: node.id,
            kind: node.kind,
            name: path_name(path),
            path: path.to_string(),
            owner: node.owner.clone(),
            size: node.data.len() as i64,
            create_time: node.create_time,
            modify_time: node.modify_time,
            checksum: None,
        }
    }

    fn stat_sync(&self, path: &str) -> Result<Entry, FsError> {
        let path: String = normalize_path(path);
        let state = self.state.lock().unwrap();
        state
            .nodes
            .get(&path)
            .map(|n: &Node| self.entry_for(&path, n))
            .ok_or_else(|| FsError::not_found(&path))
    }
}

impl Default for MemoryObjectClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn stat(&self, path: &str) -> Result<Entry, FsError> {
        self.stat_sync(path)
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        let path: String = normalize_path(path);
        Ok(self.state.lock().unwrap().nodes.contains_key(&path))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<Entry>, FsError> {
        let path: String = normalize_path(path);
        let state = self.state.lock().unwrap();
        let dir: &Node = state
            .nodes
            .get(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        if dir.kind != EntryKind::Dir {
            return Err(FsError::internal(format!("{} is not a collection", path)));
        }

        let mut children: Vec<Entry> = state
            .nodes
            .iter()
            .filter(|(p, _)| p.as_str() != path && path_parent(p) == path)
            .map(|(p, n)| self.entry_for(p, n))
            .collect();
        children.sort_by(|a: &Entry, b: &Entry| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn list_access(&self, path: &str) -> Result<Vec<Access>, FsError> {
        let path: String = normalize_path(path);
        let state = self.state.lock().unwrap();
        state
            .nodes
            .get(&path)
            .map(|n: &Node| n.access.clone())
            .ok_or_else(|| FsError::not_found(&path))
    }

    async fn open(
        &self,
        path: &str,
        _resource: &str,
        mode: OpenMode,
    ) -> Result<Arc<dyn ObjectHandle>, FsError> {
        let path: String = normalize_path(path);
        {
            let mut state = self.state.lock().unwrap();
            let node: &mut Node = state
                .nodes
                .get_mut(&path)
                .ok_or_else(|| FsError::not_found(&path))?;
            if node.kind != EntryKind::File {
                return Err(FsError::bad_handle(format!("{} is not a data object", path)));
            }
            if mode == OpenMode::WriteTruncate {
                node.data.clear();
                node.modify_time = SystemTime::now();
            }
        }

        let entry: Entry = self.stat_sync(&path)?;
        let snapshot: Option<Vec<u8>> = if mode == OpenMode::ReadOnly {
            self.content(&path)
        } else {
            None
        };

        Ok(Arc::new(MemoryObjectHandle {
            state: self.state.clone(),
            path,
            entry,
            mode,
            snapshot,
        }))
    }

    async fn create_file(
        &self,
        path: &str,
        resource: &str,
        mode: OpenMode,
    ) -> Result<Arc<dyn ObjectHandle>, FsError> {
        let path: String = normalize_path(path);
        let exists: bool = self.state.lock().unwrap().nodes.contains_key(&path);
        if !exists {
            self.insert_node(&path, EntryKind::File, Vec::new());
        }
        self.open(&path, resource, mode).await
    }

    async fn truncate_object(&self, path: &str, size: i64) -> Result<(), FsError> {
        let path: String = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        let node: &mut Node = state
            .nodes
            .get_mut(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        node.data.resize(size.max(0) as usize, 0);
        node.modify_time = SystemTime::now();
        Ok(())
    }

    async fn make_dir(&self, path: &str) -> Result<(), FsError> {
        let path: String = normalize_path(path);
        if self.state.lock().unwrap().nodes.contains_key(&path) {
            return Err(FsError::internal(format!("{} already exists", path)));
        }
        self.insert_node(&path, EntryKind::Dir, Vec::new());
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), FsError> {
        let path: String = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        match state.nodes.get(&path) {
            Some(node) if node.kind == EntryKind::File => {
                state.nodes.remove(&path);
                Ok(())
            }
            Some(_) => Err(FsError::internal(format!("{} is not a data object", path))),
            None => Err(FsError::not_found(&path)),
        }
    }

    async fn remove_dir(&self, path: &str) -> Result<(), FsError> {
        let path: String = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        let has_children: bool = state
            .nodes
            .keys()
            .any(|p: &String| p != &path && path_parent(p) == path);
        if has_children {
            return Err(FsError::internal(format!("{} is not empty", path)));
        }
        state
            .nodes
            .remove(&path)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found(&path))
    }

    async fn rename(&self, source: &str, dest: &str) -> Result<(), FsError> {
        let source: String = normalize_path(source);
        let dest: String = normalize_path(dest);
        let mut state = self.state.lock().unwrap();

        if !state.nodes.contains_key(&source) {
            return Err(FsError::not_found(&source));
        }

        // move the entry and everything beneath it
        let moved: Vec<String> = state
            .nodes
            .keys()
            .filter(|p: &&String| has_path_prefix(p, &source))
            .cloned()
            .collect();
        for old_path in moved {
            let new_path: String = format!("{}{}", dest, &old_path[source.len()..]);
            if let Some(node) = state.nodes.remove(&old_path) {
                state.nodes.insert(new_path, node);
            }
        }
        Ok(())
    }

    async fn list_xattr(&self, path: &str) -> Result<Vec<XattrEntry>, FsError> {
        let path: String = normalize_path(path);
        let state = self.state.lock().unwrap();
        let node: &Node = state
            .nodes
            .get(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        let mut entries: Vec<XattrEntry> = node
            .xattrs
            .iter()
            .map(|(name, value)| XattrEntry {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        entries.sort_by(|a: &XattrEntry, b: &XattrEntry| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn get_xattr(&self, path: &str, name: &str) -> Result<Option<Vec<u8>>, FsError> {
        let path: String = normalize_path(path);
        let state = self.state.lock().unwrap();
        let node: &Node = state
            .nodes
            .get(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        Ok(node.xattrs.get(name).cloned())
    }

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<(), FsError> {
        let path: String = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        let node: &mut Node = state
            .nodes
            .get_mut(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        node.xattrs.insert(name.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove_xattr(&self, path: &str, name: &str) -> Result<(), FsError> {
        let path: String = normalize_path(path);
        let mut state = self.state.lock().unwrap();
        let node: &mut Node = state
            .nodes
            .get_mut(&path)
            .ok_or_else(|| FsError::not_found(&path))?;
        node.xattrs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| FsError::not_found(format!("{}#{}", path, name)))
    }
}

// ============================================================================
// Handle
// ============================================================================

struct MemoryObjectHandle {
    state: Arc<Mutex<ZoneState>>,
    path: String,
    entry: Entry,
    mode: OpenMode,
    /// Content captured at open time for read-only handles, so reads are
    /// point-in-time regardless of later writers.
    snapshot: Option<Vec<u8>>,
}

#[async_trait]
impl ObjectHandle for MemoryObjectHandle {
    fn entry(&self) -> Entry {
        self.entry.clone()
    }

    fn open_mode(&self) -> OpenMode {
        self.mode
    }

    async fn size(&self) -> i64 {
        if let Some(ref snapshot) = self.snapshot {
            return snapshot.len() as i64;
        }
        let state = self.state.lock().unwrap();
        state
            .nodes
            .get(&self.path)
            .map(|n: &Node| n.data.len() as i64)
            .unwrap_or(0)
    }

    async fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(FsError::remote("injected read failure"));
        }
        state.read_trace.push(IoTraceEntry {
            path: self.path.clone(),
            offset,
            len: dest.len(),
        });

        let data: &[u8] = match self.snapshot {
            Some(ref snapshot) => snapshot.as_slice(),
            None => state
                .nodes
                .get(&self.path)
                .ok_or_else(|| FsError::bad_handle("object removed"))?
                .data
                .as_slice(),
        };

        let offset: usize = offset as usize;
        if offset >= data.len() {
            return Ok(0);
        }
        let end: usize = (offset + dest.len()).min(data.len());
        let count: usize = end - offset;
        dest[..count].copy_from_slice(&data[offset..end]);
        Ok(count)
    }

    async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, FsError> {
        if !self.mode.is_write() {
            return Err(FsError::bad_handle("handle not open for writing"));
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(FsError::remote("injected write failure"));
        }
        state.write_trace.push(IoTraceEntry {
            path: self.path.clone(),
            offset,
            len: data.len(),
        });

        let node: &mut Node = state
            .nodes
            .get_mut(&self.path)
            .ok_or_else(|| FsError::bad_handle("object removed"))?;

        let offset: usize = if self.mode == OpenMode::Append {
            node.data.len() + offset as usize
        } else {
            offset as usize
        };
        if node.data.len() < offset + data.len() {
            node.data.resize(offset + data.len(), 0);
        }
        node.data[offset..offset + data.len()].copy_from_slice(data);
        node.modify_time = SystemTime::now();
        Ok(data.len())
    }

    async fn truncate(&self, size: i64) -> Result<(), FsError> {
        if !self.mode.is_write() {
            return Err(FsError::bad_handle("handle not open for writing"));
        }
        let mut state = self.state.lock().unwrap();
        let node: &mut Node = state
            .nodes
            .get_mut(&self.path)
            .ok_or_else(|| FsError::bad_handle("object removed"))?;
        node.data.resize(size.max(0) as usize, 0);
        node.modify_time = SystemTime::now();
        Ok(())
    }

    async fn flush(&self) -> Result<(), FsError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), FsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seed_and_stat() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/tempZone/home/alice/hello.txt", b"hello".to_vec());

        let entry: Entry = client.stat("/tempZone/home/alice/hello.txt").await.unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, 5);
        assert_eq!(entry.name, "hello.txt");

        let dir: Entry = client.stat("/tempZone/home").await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_list_dir_direct_children_only() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/a/one.txt", vec![1]);
        client.add_file("/z/a/b/two.txt", vec![2]);

        let children: Vec<Entry> = client.list_dir("/z/a").await.unwrap();
        let names: Vec<String> = children.iter().map(|e: &Entry| e.name.clone()).collect();
        assert_eq!(names, vec!["b".to_string(), "one.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_read_write_through_handle() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());

        let handle = client.open("/z/f", "", OpenMode::WriteOnly).await.unwrap();
        handle.write_at(b"abcdef", 0).await.unwrap();
        handle.close().await.unwrap();

        let handle = client.open("/z/f", "", OpenMode::ReadOnly).await.unwrap();
        let mut buffer: Vec<u8> = vec![0u8; 16];
        let count: usize = handle.read_at(&mut buffer, 2).await.unwrap();
        assert_eq!(&buffer[..count], b"cdef");
    }

    #[tokio::test]
    async fn test_read_only_handles_are_point_in_time() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", b"before".to_vec());

        let reader = client.open("/z/f", "", OpenMode::ReadOnly).await.unwrap();
        let writer = client.open("/z/f", "", OpenMode::WriteOnly).await.unwrap();
        writer.write_at(b"AFTER!", 0).await.unwrap();

        let mut buffer: Vec<u8> = vec![0u8; 6];
        reader.read_at(&mut buffer, 0).await.unwrap();
        assert_eq!(&buffer, b"before");
    }

    #[tokio::test]
    async fn test_write_truncate_clears_content() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", b"old content".to_vec());

        let handle = client
            .open("/z/f", "", OpenMode::WriteTruncate)
            .await
            .unwrap();
        handle.write_at(b"new", 0).await.unwrap();
        drop(handle);

        assert_eq!(client.content("/z/f").unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_trace_records_backend_calls() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", vec![0u8; 1024]);

        let handle = client.open("/z/f", "", OpenMode::ReadOnly).await.unwrap();
        let mut buffer: Vec<u8> = vec![0u8; 100];
        handle.read_at(&mut buffer, 50).await.unwrap();

        let trace: Vec<IoTraceEntry> = client.read_trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].offset, 50);
        assert_eq!(trace[0].len, 100);
    }

    #[tokio::test]
    async fn test_xattr_round_trip() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());

        client.set_xattr("/z/f", "k", b"v").await.unwrap();
        assert_eq!(client.get_xattr("/z/f", "k").await.unwrap(), Some(b"v".to_vec()));

        client.remove_xattr("/z/f", "k").await.unwrap();
        assert_eq!(client.get_xattr("/z/f", "k").await.unwrap(), None);
        assert!(client.remove_xattr("/z/f", "k").await.is_err());
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/a/f1", vec![1]);
        client.add_file("/z/a/sub/f2", vec![2]);

        client.rename("/z/a", "/z/b").await.unwrap();
        assert!(client.stat("/z/b/f1").await.is_ok());
        assert!(client.stat("/z/b/sub/f2").await.is_ok());
        assert!(client.stat("/z/a/f1").await.unwrap_err().is_not_found());
    }
}
