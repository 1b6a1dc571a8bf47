//! Directory operations and open/release.
//!
//! Lookup and listing merge two sources: the virtual path tree (synthetic
//! directories and mapping roots) and the backing remote listings. A
//! mapping mounted beneath a remote directory shadows a remote entry of
//! the same name.

use std::sync::Arc;

use fuser::{FileAttr, FileType};
use tracing::{debug, warn};

use irods_fuse_client::{Entry, ObjectHandle, OpenMode};
use irods_fuse_common::path::{join_path, path_name};
use irods_fuse_common::FsError;

use crate::context::{FsContext, ResolvedNode};
use crate::handle::FileHandle;
use crate::vpath::VPathEntry;

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntryOut {
    /// Inode number registered for the entry.
    pub ino: u64,
    /// FUSE file type.
    pub kind: FileType,
    /// Entry name.
    pub name: String,
}

impl FsContext {
    /// Look up a child by name and return its attributes.
    ///
    /// # Arguments
    /// * `parent_path` - Absolute mount-relative path of the parent
    /// * `name` - Child name
    pub async fn lookup_path(
        &self,
        parent_path: &str,
        name: &str,
    ) -> Result<FileAttr, FsError> {
        let child: String = join_path(parent_path, name);
        let node: ResolvedNode = self.resolve_node(&child).await?;
        self.attr_for_node(&node).await
    }

    /// List a directory.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path of the directory
    pub async fn readdir_path(&self, local_path: &str) -> Result<Vec<DirEntryOut>, FsError> {
        let node: ResolvedNode = self.resolve_node(local_path).await?;
        let mut entries: Vec<DirEntryOut> = Vec::new();

        // mapping roots and synthetic dirs mounted at this level
        for vpath_entry in self.vpath().list_virtual_children(local_path) {
            match self.overlay_child(vpath_entry).await {
                Some(child) => entries.push(child),
                None => continue,
            }
        }

        if let ResolvedNode::Remote {
            local_path: local,
            remote_path,
            entry,
            ..
        } = node
        {
            if !entry.is_dir() {
                return Err(FsError::internal(format!("{} is not a directory", local)));
            }

            let listed: Vec<Entry> = self.client().list_dir(&remote_path).await?;
            for child in listed {
                if entries.iter().any(|e: &DirEntryOut| e.name == child.name) {
                    // a mapping mounted here shadows the remote entry
                    continue;
                }
                let child_local: String = join_path(&local, &child.name);
                let ino: u64 = self.inodes().register_entry(&child_local, child.id);
                let kind: FileType = if child.is_dir() {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                };
                // warm the stat cache so the follow-up lookups are free
                self.stat_cache().put(child.clone());
                entries.push(DirEntryOut {
                    ino,
                    kind,
                    name: child.name,
                });
            }
        }

        entries.sort_by(|a: &DirEntryOut, b: &DirEntryOut| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn overlay_child(&self, vpath_entry: &VPathEntry) -> Option<DirEntryOut> {
        let name: String = path_name(&vpath_entry.local_prefix);
        if vpath_entry.is_virtual_dir() {
            let ino: u64 = self.inodes().register_virtual(&vpath_entry.local_prefix);
            return Some(DirEntryOut {
                ino,
                kind: FileType::Directory,
                name,
            });
        }

        let remote: &str = vpath_entry.remote_path.as_deref()?;
        match self.stat_remote(remote).await {
            Ok(entry) => {
                let ino: u64 = self
                    .inodes()
                    .register_entry(&vpath_entry.local_prefix, entry.id);
                let kind: FileType = if entry.is_dir() {
                    FileType::Directory
                } else {
                    FileType::RegularFile
                };
                Some(DirEntryOut { ino, kind, name })
            }
            Err(error) => {
                warn!(remote, %error, "skipping unresolvable mapping in listing");
                None
            }
        }
    }

    /// Resolve a path that must be a writable remote collection.
    async fn writable_remote_dir(&self, local_path: &str) -> Result<String, FsError> {
        match self.resolve_node(local_path).await? {
            ResolvedNode::Virtual { path } => Err(FsError::permission_denied(path)),
            ResolvedNode::Remote {
                remote_path,
                read_only,
                entry,
                ..
            } => {
                if read_only {
                    return Err(FsError::read_only(local_path));
                }
                if !entry.is_dir() {
                    return Err(FsError::internal(format!(
                        "{} is not a directory",
                        local_path
                    )));
                }
                Ok(remote_path)
            }
        }
    }

    /// Resolve a path that must be a writable remote data object.
    async fn writable_remote_file(&self, local_path: &str) -> Result<String, FsError> {
        match self.resolve_node(local_path).await? {
            ResolvedNode::Virtual { path } => Err(FsError::permission_denied(path)),
            ResolvedNode::Remote {
                remote_path,
                read_only,
                entry,
                ..
            } => {
                if read_only {
                    return Err(FsError::read_only(local_path));
                }
                if entry.is_dir() {
                    return Err(FsError::internal(format!(
                        "{} is not a data object",
                        local_path
                    )));
                }
                Ok(remote_path)
            }
        }
    }

    // ------------------------------------------------------------------
    // Open / release
    // ------------------------------------------------------------------

    /// Open a file and register its handle.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    /// * `flags` - POSIX open flags
    ///
    /// # Returns
    /// The registered handle.
    pub async fn open_path(
        &self,
        local_path: &str,
        flags: i32,
    ) -> Result<Arc<FileHandle>, FsError> {
        let mode: OpenMode = OpenMode::from_posix_flags(flags);

        let (remote_path, read_only) = match self.resolve_node(local_path).await? {
            ResolvedNode::Virtual { path } => {
                return Err(FsError::permission_denied(path));
            }
            ResolvedNode::Remote {
                remote_path,
                read_only,
                entry,
                ..
            } => {
                if entry.is_dir() {
                    return Err(FsError::bad_handle(format!(
                        "{} is a collection",
                        local_path
                    )));
                }
                (remote_path, read_only)
            }
        };

        if read_only && mode.is_write() {
            return Err(FsError::read_only(local_path));
        }

        let backend: Arc<dyn ObjectHandle> = self
            .client()
            .open(&remote_path, &self.config().resource, mode)
            .await?;

        let handle: Arc<FileHandle> = Arc::new(FileHandle::new(
            self.handles().allocate_id(),
            local_path.to_string(),
            backend,
            self.config().block_size,
            self.config().read_ahead_max,
        ));
        self.handles().add(handle.clone());

        if mode.is_write() {
            self.stat_cache().invalidate(&remote_path);
            if self.config().invalidate_parent_entry_cache_immediately {
                self.stat_cache().invalidate_tree(&remote_path);
            }
        }

        debug!(path = local_path, handle = handle.id(), %mode, "opened");
        Ok(handle)
    }

    /// Create a file and register a write handle for it.
    ///
    /// # Arguments
    /// * `parent_path` - Absolute mount-relative path of the parent
    /// * `name` - New file name
    /// * `flags` - POSIX open flags
    pub async fn create_path(
        &self,
        parent_path: &str,
        name: &str,
        flags: i32,
    ) -> Result<(FileAttr, Arc<FileHandle>), FsError> {
        let local: String = join_path(parent_path, name);
        let remote_parent: String = self.writable_remote_dir(parent_path).await?;
        let remote_path: String = join_path(&remote_parent, name);

        let mode: OpenMode = OpenMode::from_posix_flags(flags);
        let mode: OpenMode = if mode.is_write() { mode } else { OpenMode::WriteOnly };

        let backend: Arc<dyn ObjectHandle> = self
            .client()
            .create_file(&remote_path, &self.config().resource, mode)
            .await?;

        let handle: Arc<FileHandle> = Arc::new(FileHandle::new(
            self.handles().allocate_id(),
            local.clone(),
            backend,
            self.config().block_size,
            self.config().read_ahead_max,
        ));
        self.handles().add(handle.clone());

        self.stat_cache().invalidate_tree(&remote_path);

        let attr: FileAttr = self.getattr_path(&local).await?;
        Ok((attr, handle))
    }

    /// Create a collection.
    ///
    /// # Arguments
    /// * `parent_path` - Absolute mount-relative path of the parent
    /// * `name` - New directory name
    pub async fn mkdir_path(&self, parent_path: &str, name: &str) -> Result<FileAttr, FsError> {
        let local: String = join_path(parent_path, name);
        let remote_parent: String = self.writable_remote_dir(parent_path).await?;
        let remote_path: String = join_path(&remote_parent, name);

        self.client().make_dir(&remote_path).await?;
        self.stat_cache().invalidate_tree(&remote_path);
        self.getattr_path(&local).await
    }

    /// Remove a data object.
    ///
    /// # Arguments
    /// * `parent_path` - Absolute mount-relative path of the parent
    /// * `name` - File name
    pub async fn unlink_path(&self, parent_path: &str, name: &str) -> Result<(), FsError> {
        let local: String = join_path(parent_path, name);
        let remote_path: String = self.writable_remote_file(&local).await?;

        self.client().remove_file(&remote_path).await?;
        self.stat_cache().invalidate_tree(&remote_path);
        self.inodes().remove(&local);
        Ok(())
    }

    /// Remove an empty collection.
    ///
    /// # Arguments
    /// * `parent_path` - Absolute mount-relative path of the parent
    /// * `name` - Directory name
    pub async fn rmdir_path(&self, parent_path: &str, name: &str) -> Result<(), FsError> {
        let local: String = join_path(parent_path, name);
        let remote_path: String = self.writable_remote_dir(&local).await?;

        self.client().remove_dir(&remote_path).await?;
        self.stat_cache().invalidate_tree(&remote_path);
        self.inodes().remove(&local);
        Ok(())
    }

    /// Rename an entry.
    ///
    /// # Arguments
    /// * `parent_path` - Parent of the source
    /// * `name` - Source name
    /// * `new_parent_path` - Parent of the destination
    /// * `new_name` - Destination name
    pub async fn rename_path(
        &self,
        parent_path: &str,
        name: &str,
        new_parent_path: &str,
        new_name: &str,
    ) -> Result<(), FsError> {
        let old_local: String = join_path(parent_path, name);
        let new_local: String = join_path(new_parent_path, new_name);

        let old_remote: String = match self.resolve_node(&old_local).await? {
            ResolvedNode::Virtual { path } => return Err(FsError::permission_denied(path)),
            ResolvedNode::Remote {
                remote_path,
                read_only,
                ..
            } => {
                if read_only {
                    return Err(FsError::read_only(&old_local));
                }
                remote_path
            }
        };
        let new_remote_parent: String = self.writable_remote_dir(new_parent_path).await?;
        let new_remote: String = join_path(&new_remote_parent, new_name);

        self.client().rename(&old_remote, &new_remote).await?;
        self.stat_cache().invalidate_tree(&old_remote);
        self.stat_cache().invalidate_tree(&new_remote);
        self.inodes().rename(&old_local, &new_local);
        Ok(())
    }

    /// Release a registered handle.
    ///
    /// The registry entry is removed first so no truncate-through-open can
    /// target the dying handle; then the pipelines drain and the backend
    /// handle closes. For read-only handles the drain-and-close is
    /// detached so the caller does not pay the close latency.
    ///
    /// # Arguments
    /// * `fh` - Handle id from open/create
    pub async fn release_handle(self: &Arc<Self>, fh: u64) -> Result<(), FsError> {
        let handle: Arc<FileHandle> = self
            .handles()
            .remove(fh)
            .ok_or_else(|| FsError::bad_handle(format!("unknown handle {}", fh)))?;

        if handle.open_mode().is_read_only() {
            let ctx: Arc<FsContext> = self.clone();
            tokio::spawn(async move {
                if let Err(error) = close_handle(&ctx, &handle).await {
                    warn!(handle = handle.id(), %error, "deferred close failed");
                }
            });
            return Ok(());
        }

        close_handle(self, &handle).await
    }
}

async fn close_handle(ctx: &FsContext, handle: &FileHandle) -> Result<(), FsError> {
    let pipeline_result: Result<(), FsError> = handle.release_pipelines().await;
    let close_result: Result<(), FsError> = handle.backend().close().await;

    if handle.open_mode().is_write() {
        ctx.stat_cache().invalidate_tree(&handle.entry().path);
    }

    pipeline_result.and(close_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use irods_fuse_client::{MemoryObjectClient, ObjectClient};
    use irods_fuse_common::config::PathMapping;
    use irods_fuse_common::Config;

    fn ctx_with(
        mappings: Vec<PathMapping>,
    ) -> (Arc<MemoryObjectClient>, Arc<FsContext>) {
        let client: Arc<MemoryObjectClient> = Arc::new(MemoryObjectClient::new());
        client.add_dir("/zone/home/alice");
        client.add_file("/zone/home/alice/a.txt", b"aaa".to_vec());
        client.add_file("/zone/home/alice/sub/b.txt", b"bbbb".to_vec());
        let config: Config = Config {
            proxy_user: "proxy".to_string(),
            client_user: "alice".to_string(),
            no_permission_check: true,
            path_mappings: mappings,
            ..Default::default()
        };
        let ctx: Arc<FsContext> = FsContext::new(config, client.clone());
        (client, ctx)
    }

    #[tokio::test]
    async fn test_lookup_and_readdir() {
        let (_client, ctx) = ctx_with(vec![PathMapping::new("/zone/home/alice", "/")]);

        let attr: FileAttr = ctx.lookup_path("/", "a.txt").await.unwrap();
        assert_eq!(attr.size, 3);

        let entries: Vec<DirEntryOut> = ctx.readdir_path("/").await.unwrap();
        let names: Vec<String> = entries.iter().map(|e: &DirEntryOut| e.name.clone()).collect();
        assert_eq!(names, vec!["a.txt".to_string(), "sub".to_string()]);
    }

    #[tokio::test]
    async fn test_readdir_virtual_root_with_two_mappings() {
        let (_client, ctx) = ctx_with(vec![
            PathMapping::new("/zone/home/alice", "/alice"),
            PathMapping::new("/zone/home/alice/sub", "/shared/sub"),
        ]);

        let entries: Vec<DirEntryOut> = ctx.readdir_path("/").await.unwrap();
        let names: Vec<String> = entries.iter().map(|e: &DirEntryOut| e.name.clone()).collect();
        assert_eq!(names, vec!["alice".to_string(), "shared".to_string()]);

        let entries: Vec<DirEntryOut> = ctx.readdir_path("/shared").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, FileType::Directory);
    }

    #[tokio::test]
    async fn test_open_modes_and_read_only_mapping() {
        let (_client, ctx) =
            ctx_with(vec![PathMapping::new("/zone/home/alice", "/").read_only()]);

        // read opens fine
        let handle: Arc<FileHandle> = ctx.open_path("/a.txt", libc::O_RDONLY).await.unwrap();
        ctx.release_handle(handle.id()).await.unwrap();

        // write is refused with a read-only error
        assert!(matches!(
            ctx.open_path("/a.txt", libc::O_WRONLY).await,
            Err(FsError::ReadOnlyFs { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_virtual_dir_is_denied() {
        let (_client, ctx) =
            ctx_with(vec![PathMapping::new("/zone/home/alice", "/deep/alice")]);
        assert!(matches!(
            ctx.open_path("/deep", libc::O_RDONLY).await,
            Err(FsError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_write_release_read_round_trip() {
        let (client, ctx) = ctx_with(vec![PathMapping::new("/zone/home/alice", "/")]);

        let (_attr, handle) = ctx
            .create_path("/", "new.txt", libc::O_WRONLY)
            .await
            .unwrap();
        handle.write(b"fresh content", 0).await.unwrap();
        handle.flush().await.unwrap();
        ctx.release_handle(handle.id()).await.unwrap();

        assert!(ctx.handles().is_empty());
        assert_eq!(
            client.content("/zone/home/alice/new.txt").unwrap(),
            b"fresh content"
        );

        let reader: Arc<FileHandle> = ctx.open_path("/new.txt", libc::O_RDONLY).await.unwrap();
        let mut buffer: Vec<u8> = vec![0u8; 13];
        assert_eq!(reader.read(&mut buffer, 0).await.unwrap(), 13);
        assert_eq!(&buffer, b"fresh content");
        ctx.release_handle(reader.id()).await.unwrap();
    }

    #[tokio::test]
    async fn test_mkdir_unlink_rmdir() {
        let (client, ctx) = ctx_with(vec![PathMapping::new("/zone/home/alice", "/")]);

        ctx.mkdir_path("/", "newdir").await.unwrap();
        assert!(client.stat("/zone/home/alice/newdir").await.unwrap().is_dir());

        ctx.unlink_path("/", "a.txt").await.unwrap();
        assert!(client.stat("/zone/home/alice/a.txt").await.is_err());

        ctx.rmdir_path("/", "newdir").await.unwrap();
        assert!(client.stat("/zone/home/alice/newdir").await.is_err());
    }

    #[tokio::test]
    async fn test_rename() {
        let (client, ctx) = ctx_with(vec![PathMapping::new("/zone/home/alice", "/")]);

        ctx.rename_path("/", "a.txt", "/sub", "renamed.txt").await.unwrap();
        assert!(client.stat("/zone/home/alice/sub/renamed.txt").await.is_ok());
        assert!(client.stat("/zone/home/alice/a.txt").await.is_err());

        let attr: FileAttr = ctx.lookup_path("/sub", "renamed.txt").await.unwrap();
        assert_eq!(attr.size, 3);
    }

    #[tokio::test]
    async fn test_release_removes_from_registry_exactly_once() {
        let (_client, ctx) = ctx_with(vec![PathMapping::new("/zone/home/alice", "/")]);

        let handle: Arc<FileHandle> = ctx.open_path("/a.txt", libc::O_WRONLY).await.unwrap();
        let id: u64 = handle.id();
        ctx.release_handle(id).await.unwrap();
        assert!(ctx.handles().is_empty());
        assert!(ctx.release_handle(id).await.is_err());
    }
}
