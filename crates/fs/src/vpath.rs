//! Virtual path overlay.
//!
//! An ordered list of configured mappings projects remote trees into one
//! local namespace. Leaf entries point at remote paths; synthetic
//! `VirtualDir` entries cover the intermediate segments of every mapping
//! prefix. The tree is built once at mount and is immutable afterwards,
//! so lookups take no lock.

use std::collections::BTreeMap;

use thiserror::Error;

use irods_fuse_common::config::PathMapping;
use irods_fuse_common::path::{has_path_prefix, normalize_path, path_parent, rebase_path};

/// Kind of a virtual path entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VPathEntryKind {
    /// Synthetic directory covering mapping prefixes.
    VirtualDir,
    /// Root of a mapped remote tree.
    Remote,
}

/// One node of the virtual path tree.
#[derive(Debug, Clone)]
pub struct VPathEntry {
    /// File or synthetic directory.
    pub kind: VPathEntryKind,
    /// Absolute local path of this entry.
    pub local_prefix: String,
    /// Remote path backing this entry (`Remote` only).
    pub remote_path: Option<String>,
    /// Writes through this entry are rejected.
    pub read_only: bool,
    /// Create the remote root at mount when missing (`Remote` only).
    pub create_on_missing: bool,
}

impl VPathEntry {
    /// Check whether this entry is a synthetic directory.
    pub fn is_virtual_dir(&self) -> bool {
        self.kind == VPathEntryKind::VirtualDir
    }
}

/// Errors from virtual path resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VPathError {
    /// The path resolves to a synthetic directory, not a remote object.
    #[error("not a file: {path}")]
    NotAFile { path: String },

    /// No mapping covers the path.
    #[error("no mapping covers {path}")]
    NoMapping { path: String },
}

/// The immutable virtual path tree.
pub struct VPathManager {
    /// Entries keyed by normalized local prefix. BTreeMap keeps children
    /// adjacent to their parents for listing.
    entries: BTreeMap<String, VPathEntry>,
}

impl VPathManager {
    /// Build the tree from an ordered mapping list.
    ///
    /// Mapping validation (absolute, unique prefixes) happens at config
    /// time; building inserts `VirtualDir` nodes for every uncovered
    /// intermediate segment. A remote mapping always wins over a synthetic
    /// directory at the same prefix.
    ///
    /// # Arguments
    /// * `mappings` - Configured path mappings, in order
    pub fn new(mappings: &[PathMapping]) -> Self {
        let mut entries: BTreeMap<String, VPathEntry> = BTreeMap::new();

        for mapping in mappings {
            let local: String = normalize_path(&mapping.local_prefix);

            // synthetic directories for intermediate segments
            let mut ancestor: String = path_parent(&local);
            let mut missing: Vec<String> = Vec::new();
            loop {
                if !entries.contains_key(&ancestor) {
                    missing.push(ancestor.clone());
                }
                if ancestor == "/" {
                    break;
                }
                ancestor = path_parent(&ancestor);
            }
            for dir in missing {
                entries.insert(
                    dir.clone(),
                    VPathEntry {
                        kind: VPathEntryKind::VirtualDir,
                        local_prefix: dir,
                        remote_path: None,
                        read_only: mapping.read_only,
                        create_on_missing: false,
                    },
                );
            }

            entries.insert(
                local.clone(),
                VPathEntry {
                    kind: VPathEntryKind::Remote,
                    local_prefix: local,
                    remote_path: Some(normalize_path(&mapping.remote_path)),
                    read_only: mapping.read_only,
                    create_on_missing: mapping.create_on_missing,
                },
            );
        }

        // a synthetic dir is writable unless every mapping beneath it is
        // read-only
        let keys: Vec<String> = entries.keys().cloned().collect();
        for key in keys {
            if entries[&key].kind != VPathEntryKind::VirtualDir {
                continue;
            }
            let all_read_only: bool = entries
                .iter()
                .filter(|(p, e)| {
                    e.kind == VPathEntryKind::Remote && has_path_prefix(p, &key)
                })
                .all(|(_, e)| e.read_only);
            if let Some(entry) = entries.get_mut(&key) {
                entry.read_only = all_read_only;
            }
        }

        Self { entries }
    }

    /// The deepest entry whose prefix covers `local_path`, if any.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    pub fn get_closest_entry(&self, local_path: &str) -> Option<&VPathEntry> {
        let mut current: String = normalize_path(local_path);
        loop {
            if let Some(entry) = self.entries.get(&current) {
                return Some(entry);
            }
            if current == "/" {
                return None;
            }
            current = path_parent(&current);
        }
    }

    /// Resolve a local path to the remote path backing it.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    ///
    /// # Errors
    /// `NotAFile` when the closest entry is a synthetic directory;
    /// `NoMapping` when nothing covers the path.
    pub fn resolve_remote(&self, local_path: &str) -> Result<String, VPathError> {
        let local: String = normalize_path(local_path);
        let entry: &VPathEntry =
            self.get_closest_entry(&local)
                .ok_or_else(|| VPathError::NoMapping {
                    path: local.clone(),
                })?;

        match entry.remote_path {
            Some(ref remote) => Ok(rebase_path(&local, &entry.local_prefix, remote)),
            None => Err(VPathError::NotAFile { path: local }),
        }
    }

    /// Direct children of a synthetic directory, deduplicated by name.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path of the directory
    pub fn list_virtual_children(&self, local_path: &str) -> Vec<&VPathEntry> {
        let local: String = normalize_path(local_path);
        let mut seen: Vec<String> = Vec::new();
        let mut children: Vec<&VPathEntry> = Vec::new();

        for (prefix, entry) in &self.entries {
            if prefix == &local || path_parent(prefix) != local {
                continue;
            }
            let name: String = irods_fuse_common::path::path_name(prefix);
            if seen.contains(&name) {
                continue;
            }
            seen.push(name);
            children.push(entry);
        }

        children
    }

    /// All `Remote` entries, in prefix order.
    pub fn remote_entries(&self) -> Vec<&VPathEntry> {
        self.entries
            .values()
            .filter(|e: &&VPathEntry| e.kind == VPathEntryKind::Remote)
            .collect()
    }

    /// Check whether any entry exists exactly at `local_path`.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    pub fn get_entry(&self, local_path: &str) -> Option<&VPathEntry> {
        self.entries.get(&normalize_path(local_path))
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
