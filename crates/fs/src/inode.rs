//! Inode numbering.
//!
//! Remote entries map to inodes through a fixed bijection: the low 63 bits
//! of the grid-assigned entry id. Synthetic directories get numbers from a
//! reserved range with the top bit set, so the two can never collide. The
//! FUSE root is always inode 1 and always refers to the local path `/`.

use std::collections::HashMap;
use std::sync::Mutex;

use irods_fuse_common::path::{has_path_prefix, normalize_path};

/// Inode number of the mount root.
pub const ROOT_INODE: u64 = 1;

/// First inode number of the reserved virtual-directory range.
const VIRTUAL_INODE_BASE: u64 = 1 << 63;

/// Mask selecting the low 63 bits of an entry id.
const ENTRY_ID_MASK: u64 = (1 << 63) - 1;

/// Derive the inode number for a remote entry id.
///
/// # Arguments
/// * `entry_id` - Grid-assigned entry id
pub fn inode_from_entry_id(entry_id: u64) -> u64 {
    entry_id & ENTRY_ID_MASK
}

struct TableInner {
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
    next_virtual: u64,
}

/// Bidirectional inode ↔ local-path table.
///
/// The kernel addresses everything by inode after the first lookup; this
/// table remembers which local path each inode was handed out for.
pub struct InodeTable {
    inner: Mutex<TableInner>,
}

impl InodeTable {
    /// Create a table containing only the root.
    pub fn new() -> Self {
        let mut paths: HashMap<u64, String> = HashMap::new();
        let mut inodes: HashMap<String, u64> = HashMap::new();
        paths.insert(ROOT_INODE, "/".to_string());
        inodes.insert("/".to_string(), ROOT_INODE);

        Self {
            inner: Mutex::new(TableInner {
                paths,
                inodes,
                next_virtual: VIRTUAL_INODE_BASE,
            }),
        }
    }

    /// Register a remote entry and return its inode.
    ///
    /// # Arguments
    /// * `local_path` - Mount-relative path of the entry
    /// * `entry_id` - Grid-assigned entry id
    pub fn register_entry(&self, local_path: &str, entry_id: u64) -> u64 {
        let path: String = normalize_path(local_path);
        let mut inner = self.inner.lock().unwrap();

        if let Some(&existing) = inner.inodes.get(&path) {
            return existing;
        }

        let ino: u64 = inode_from_entry_id(entry_id);
        inner.paths.insert(ino, path.clone());
        inner.inodes.insert(path, ino);
        ino
    }

    /// Register a synthetic directory and return its inode.
    ///
    /// # Arguments
    /// * `local_path` - Mount-relative path of the directory
    pub fn register_virtual(&self, local_path: &str) -> u64 {
        let path: String = normalize_path(local_path);
        let mut inner = self.inner.lock().unwrap();

        if let Some(&existing) = inner.inodes.get(&path) {
            return existing;
        }

        let ino: u64 = inner.next_virtual;
        inner.next_virtual += 1;
        inner.paths.insert(ino, path.clone());
        inner.inodes.insert(path, ino);
        ino
    }

    /// Resolve an inode back to its local path.
    ///
    /// # Arguments
    /// * `ino` - Inode number from the kernel
    pub fn resolve(&self, ino: u64) -> Option<String> {
        self.inner.lock().unwrap().paths.get(&ino).cloned()
    }

    /// Look up the inode already registered for a path.
    ///
    /// # Arguments
    /// * `local_path` - Mount-relative path
    pub fn lookup(&self, local_path: &str) -> Option<u64> {
        let path: String = normalize_path(local_path);
        self.inner.lock().unwrap().inodes.get(&path).copied()
    }

    /// Drop a path (after unlink/rmdir).
    ///
    /// # Arguments
    /// * `local_path` - Mount-relative path
    pub fn remove(&self, local_path: &str) {
        let path: String = normalize_path(local_path);
        let mut inner = self.inner.lock().unwrap();
        if let Some(ino) = inner.inodes.remove(&path) {
            inner.paths.remove(&ino);
        }
    }

    /// Rewrite every registration under `old_path` to live under
    /// `new_path` (after rename).
    ///
    /// # Arguments
    /// * `old_path` - Previous mount-relative path
    /// * `new_path` - New mount-relative path
    pub fn rename(&self, old_path: &str, new_path: &str) {
        let old_path: String = normalize_path(old_path);
        let new_path: String = normalize_path(new_path);
        let mut inner = self.inner.lock().unwrap();

        let moved: Vec<(String, u64)> = inner
            .inodes
            .iter()
            .filter(|(p, _)| has_path_prefix(p, &old_path))
            .map(|(p, &ino)| (p.clone(), ino))
            .collect();

        for (path, ino) in moved {
            inner.inodes.remove(&path);
            let rewritten: String = format!("{}{}", new_path, &path[old_path.len()..]);
            inner.paths.insert(ino, rewritten.clone());
            inner.inodes.insert(rewritten, ino);
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_inode_one() {
        let table: InodeTable = InodeTable::new();
        assert_eq!(table.resolve(ROOT_INODE).as_deref(), Some("/"));
        assert_eq!(table.lookup("/"), Some(ROOT_INODE));
    }

    #[test]
    fn test_entry_inode_is_low_63_bits() {
        assert_eq!(inode_from_entry_id(42), 42);
        assert_eq!(inode_from_entry_id(u64::MAX), ENTRY_ID_MASK);
    }

    #[test]
    fn test_register_and_resolve() {
        let table: InodeTable = InodeTable::new();
        let ino: u64 = table.register_entry("/data/f.txt", 1234);
        assert_eq!(ino, 1234);
        assert_eq!(table.resolve(ino).as_deref(), Some("/data/f.txt"));
        // re-registration is stable
        assert_eq!(table.register_entry("/data/f.txt", 1234), ino);
    }

    #[test]
    fn test_virtual_inodes_use_reserved_range() {
        let table: InodeTable = InodeTable::new();
        let ino: u64 = table.register_virtual("/home");
        assert!(ino >= VIRTUAL_INODE_BASE);
        let again: u64 = table.register_virtual("/home");
        assert_eq!(ino, again);
    }

    #[test]
    fn test_remove() {
        let table: InodeTable = InodeTable::new();
        let ino: u64 = table.register_entry("/f", 7);
        table.remove("/f");
        assert!(table.resolve(ino).is_none());
        assert!(table.lookup("/f").is_none());
    }

    #[test]
    fn test_rename_moves_subtree() {
        let table: InodeTable = InodeTable::new();
        let file_ino: u64 = table.register_entry("/a/f", 10);
        let nested_ino: u64 = table.register_entry("/a/sub/g", 11);

        table.rename("/a", "/b");
        assert_eq!(table.resolve(file_ino).as_deref(), Some("/b/f"));
        assert_eq!(table.resolve(nested_ino).as_deref(), Some("/b/sub/g"));
        assert_eq!(table.lookup("/b/f"), Some(file_ino));
        assert!(table.lookup("/a/f").is_none());
    }
}
