//! Shared filesystem context.
//!
//! One `FsContext` is built at mount and passed by `Arc` to every node and
//! handle: the pooled backend client, the stat cache, the virtual path
//! tree, the handle registry, the inode table, the operation counter and
//! the termination flag. There are no globals.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use fuser::FileAttr;
use tracing::info;

use irods_fuse_client::{
    AccessLevel, Entry, ObjectClient, PooledClient, StatCache,
};
use irods_fuse_common::path::normalize_path;
use irods_fuse_common::{Config, FsError};

use crate::acl::{effective_level, mode_bits};
use crate::attr::{entry_to_attr, virtual_dir_attr};
use crate::handle_map::FileHandleMap;
use crate::inode::InodeTable;
use crate::vpath::{VPathEntry, VPathManager};

/// A mount-relative path resolved through the virtual path tree.
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    /// A synthetic directory.
    Virtual {
        /// Mount-relative path.
        path: String,
    },
    /// An entry backed by the grid.
    Remote {
        /// Mount-relative path.
        local_path: String,
        /// Backing remote path.
        remote_path: String,
        /// Stat of the remote entry.
        entry: Entry,
        /// Entry is reached through a read-only mapping.
        read_only: bool,
    },
}

impl ResolvedNode {
    /// Check whether the node is a synthetic directory.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual { .. })
    }
}

/// Process-wide filesystem state.
pub struct FsContext {
    config: Config,
    client: Arc<dyn ObjectClient>,
    stat_cache: StatCache,
    vpath: VPathManager,
    handles: FileHandleMap,
    inodes: InodeTable,
    operation_counter: AtomicU64,
    terminated: AtomicBool,
    mount_time: SystemTime,
}

impl FsContext {
    /// Build the context for a mount.
    ///
    /// The driver is wrapped in the connection pool and the stat cache is
    /// sized from the configuration.
    ///
    /// # Arguments
    /// * `config` - Validated mount configuration
    /// * `driver` - The protocol driver
    pub fn new(config: Config, driver: Arc<dyn ObjectClient>) -> Arc<Self> {
        let client: Arc<dyn ObjectClient> = Arc::new(PooledClient::new(
            driver,
            config.connection_max,
            config.operation_timeout,
        ));
        let stat_cache: StatCache = StatCache::new(
            config.metadata_cache_timeout,
            config.metadata_cache_cleanup_time,
            config.metadata_cache_timeout_settings.clone(),
        );
        let vpath: VPathManager = VPathManager::new(&config.path_mappings);

        Arc::new(Self {
            config,
            client,
            stat_cache,
            vpath,
            handles: FileHandleMap::new(),
            inodes: InodeTable::new(),
            operation_counter: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            mount_time: SystemTime::now(),
        })
    }

    /// Verify every mapped remote root, creating the ones flagged for it.
    ///
    /// # Errors
    /// `RemoteUnavailable` when a mapped root does not exist and is not
    /// flagged `create_on_missing`.
    pub async fn prepare(&self) -> Result<(), FsError> {
        for entry in self.vpath.remote_entries() {
            let remote: &str = entry.remote_path.as_deref().unwrap_or("/");
            if self.client.exists(remote).await? {
                continue;
            }
            if entry.create_on_missing {
                info!(remote, "creating missing mapped collection");
                self.client.make_dir(remote).await?;
            } else {
                return Err(FsError::remote(format!(
                    "mapped remote root {} does not exist",
                    remote
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// The mount configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The pooled backend client.
    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    /// The stat cache.
    pub fn stat_cache(&self) -> &StatCache {
        &self.stat_cache
    }

    /// The virtual path tree.
    pub fn vpath(&self) -> &VPathManager {
        &self.vpath
    }

    /// The live handle registry.
    pub fn handles(&self) -> &FileHandleMap {
        &self.handles
    }

    /// The inode table.
    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    /// Mount timestamp (reported for synthetic directories).
    pub fn mount_time(&self) -> SystemTime {
        self.mount_time
    }

    // ------------------------------------------------------------------
    // Operation ids and termination
    // ------------------------------------------------------------------

    /// Next operation id for log correlation.
    pub fn next_operation_id(&self) -> u64 {
        self.operation_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Set the termination flag; every new operation aborts afterwards.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
    }

    /// Check whether termination was requested.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// First action of every operation.
    pub fn check_terminated(&self) -> Result<(), FsError> {
        if self.is_terminated() {
            Err(FsError::Aborted)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Stat a remote path through the cache.
    ///
    /// # Arguments
    /// * `remote_path` - Absolute remote path
    pub async fn stat_remote(&self, remote_path: &str) -> Result<Entry, FsError> {
        if let Some(entry) = self.stat_cache.get(remote_path) {
            return Ok(entry);
        }
        let entry: Entry = self.client.stat(remote_path).await?;
        self.stat_cache.put(entry.clone());
        Ok(entry)
    }

    /// Resolve a mount-relative path to a node.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    pub async fn resolve_node(&self, local_path: &str) -> Result<ResolvedNode, FsError> {
        let local: String = normalize_path(local_path);
        let closest: &VPathEntry = self
            .vpath
            .get_closest_entry(&local)
            .ok_or_else(|| FsError::not_found(&local))?;

        if closest.is_virtual_dir() {
            if closest.local_prefix == local {
                return Ok(ResolvedNode::Virtual { path: local });
            }
            // below a synthetic dir only mapped children exist
            return Err(FsError::not_found(&local));
        }

        let remote_path: String = self
            .vpath
            .resolve_remote(&local)
            .map_err(|_| FsError::not_found(&local))?;
        let entry: Entry = self.stat_remote(&remote_path).await?;

        Ok(ResolvedNode::Remote {
            local_path: local,
            remote_path,
            entry,
            read_only: closest.read_only,
        })
    }

    /// Compute FUSE attributes for a resolved node, registering its inode.
    ///
    /// # Arguments
    /// * `node` - The resolved node
    pub async fn attr_for_node(&self, node: &ResolvedNode) -> Result<FileAttr, FsError> {
        match node {
            ResolvedNode::Virtual { path } => {
                let ino: u64 = self.inodes.register_virtual(path);
                Ok(virtual_dir_attr(
                    ino,
                    self.config.uid,
                    self.config.gid,
                    self.mount_time,
                ))
            }
            ResolvedNode::Remote {
                local_path,
                remote_path,
                entry,
                read_only,
            } => {
                let ino: u64 = self.inodes.register_entry(local_path, entry.id);
                let level: AccessLevel = if self.config.no_permission_check {
                    AccessLevel::Own
                } else {
                    let accesses = self.client.list_access(remote_path).await?;
                    effective_level(&accesses, &self.config.proxy_user, &self.config.client_user)
                };
                let mode: u16 = mode_bits(level, *read_only, entry.is_dir());
                Ok(entry_to_attr(entry, ino, mode, self.config.uid, self.config.gid))
            }
        }
    }
}
