//! File node operations.
//!
//! Attribute and extended-attribute operations addressed by path. Data
//! operations live on [`crate::handle::FileHandle`]; the dispatcher in
//! [`crate::fuse`] wires both to the kernel.

use fuser::FileAttr;
use tracing::debug;

use irods_fuse_client::XattrEntry;
use irods_fuse_common::FsError;

use crate::context::{FsContext, ResolvedNode};

impl FsContext {
    /// Stat a mount-relative path.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    pub async fn getattr_path(&self, local_path: &str) -> Result<FileAttr, FsError> {
        let node: ResolvedNode = self.resolve_node(local_path).await?;
        self.attr_for_node(&node).await
    }

    /// Apply a `setattr` request.
    ///
    /// A size change becomes a truncate. Mode, ownership and timestamp
    /// changes are acknowledged without effect unless `strict_setattr`
    /// is configured, in which case mode/ownership changes are rejected.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    /// * `size` - Requested size, if any
    /// * `mode_change` - A chmod was requested
    /// * `owner_change` - A chown was requested
    pub async fn setattr_path(
        &self,
        local_path: &str,
        size: Option<u64>,
        mode_change: bool,
        owner_change: bool,
    ) -> Result<FileAttr, FsError> {
        if self.config().strict_setattr && (mode_change || owner_change) {
            return Err(FsError::permission_denied(local_path));
        }

        if let Some(size) = size {
            self.truncate_path(local_path, size as i64).await?;
        }

        self.getattr_path(local_path).await
    }

    /// Truncate a path, preferring an open write handle.
    ///
    /// The backend does not reliably coalesce a truncate with an open
    /// write stream, so when any registered handle for the path is in
    /// write mode the size change goes through exactly one such handle.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    /// * `size` - New size in bytes
    pub async fn truncate_path(&self, local_path: &str, size: i64) -> Result<(), FsError> {
        let node: ResolvedNode = self.resolve_node(local_path).await?;
        let remote_path: String = match node {
            ResolvedNode::Virtual { path } => {
                return Err(FsError::permission_denied(path));
            }
            ResolvedNode::Remote {
                remote_path,
                read_only,
                ..
            } => {
                if read_only {
                    return Err(FsError::read_only(local_path));
                }
                remote_path
            }
        };

        let mut truncated: bool = false;
        for handle in self.handles().list_by_path(local_path) {
            if handle.open_mode().is_write() {
                debug!(path = local_path, handle = handle.id(), "truncate through open handle");
                handle.truncate(size).await?;
                truncated = true;
                // one handle is enough; a second truncate would race it
                break;
            }
        }

        if !truncated {
            self.client().truncate_object(&remote_path, size).await?;
        }

        self.stat_cache().invalidate(&remote_path);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Extended attributes
    // ------------------------------------------------------------------

    fn is_internal_xattr(&self, name: &str) -> bool {
        let prefix: &str = &self.config().xattr_internal_prefix;
        !prefix.is_empty() && name.starts_with(prefix)
    }

    async fn resolve_xattr_target(&self, local_path: &str) -> Result<String, FsError> {
        match self.resolve_node(local_path).await? {
            ResolvedNode::Virtual { path } => Err(FsError::permission_denied(path)),
            ResolvedNode::Remote { remote_path, .. } => Ok(remote_path),
        }
    }

    /// List extended attribute names, internal ones filtered out.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    pub async fn listxattr_path(&self, local_path: &str) -> Result<Vec<String>, FsError> {
        let remote_path: String = self.resolve_xattr_target(local_path).await?;
        let entries: Vec<XattrEntry> = self.client().list_xattr(&remote_path).await?;
        Ok(entries
            .into_iter()
            .map(|e: XattrEntry| e.name)
            .filter(|name: &String| !self.is_internal_xattr(name))
            .collect())
    }

    /// Read one extended attribute. `None` stands for "no data".
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    /// * `name` - Attribute name
    pub async fn getxattr_path(
        &self,
        local_path: &str,
        name: &str,
    ) -> Result<Option<Vec<u8>>, FsError> {
        if self.is_internal_xattr(name) {
            return Ok(None);
        }
        let remote_path: String = self.resolve_xattr_target(local_path).await?;
        self.client().get_xattr(&remote_path, name).await
    }

    /// Set one extended attribute.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    /// * `name` - Attribute name
    /// * `value` - Attribute value
    pub async fn setxattr_path(
        &self,
        local_path: &str,
        name: &str,
        value: &[u8],
    ) -> Result<(), FsError> {
        if self.is_internal_xattr(name) {
            return Err(FsError::permission_denied(name));
        }
        let remote_path: String = self.resolve_xattr_target(local_path).await?;
        self.client().set_xattr(&remote_path, name, value).await?;
        self.stat_cache().invalidate(&remote_path);
        Ok(())
    }

    /// Remove one extended attribute.
    ///
    /// # Arguments
    /// * `local_path` - Absolute mount-relative path
    /// * `name` - Attribute name
    pub async fn removexattr_path(&self, local_path: &str, name: &str) -> Result<(), FsError> {
        if self.is_internal_xattr(name) {
            return Err(FsError::not_found(name));
        }
        let remote_path: String = self.resolve_xattr_target(local_path).await?;
        self.client().remove_xattr(&remote_path, name).await?;
        self.stat_cache().invalidate(&remote_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irods_fuse_client::{MemoryObjectClient, ObjectClient};
    use irods_fuse_common::config::PathMapping;
    use irods_fuse_common::Config;
    use std::sync::Arc;

    fn ctx_with(mappings: Vec<PathMapping>) -> (Arc<MemoryObjectClient>, Arc<FsContext>) {
        let client: Arc<MemoryObjectClient> = Arc::new(MemoryObjectClient::new());
        client.add_file("/zone/home/data.bin", vec![9u8; 4096]);
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
    async fn test_getattr_remote_file() {
        let (_client, ctx) = ctx_with(vec![PathMapping::new("/zone/home", "/")]);
        let attr: FileAttr = ctx.getattr_path("/data.bin").await.unwrap();
        assert_eq!(attr.size, 4096);
    }

    #[tokio::test]
    async fn test_setattr_truncates() {
        let (client, ctx) = ctx_with(vec![PathMapping::new("/zone/home", "/")]);
        let attr: FileAttr = ctx
            .setattr_path("/data.bin", Some(100), false, false)
            .await
            .unwrap();
        assert_eq!(attr.size, 100);
        assert_eq!(client.content("/zone/home/data.bin").unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_setattr_silently_accepts_chmod() {
        let (_client, ctx) = ctx_with(vec![PathMapping::new("/zone/home", "/")]);
        ctx.setattr_path("/data.bin", None, true, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_strict_setattr_rejects_chmod() {
        let client: Arc<MemoryObjectClient> = Arc::new(MemoryObjectClient::new());
        client.add_file("/zone/home/f", vec![1]);
        let config: Config = Config {
            no_permission_check: true,
            strict_setattr: true,
            path_mappings: vec![PathMapping::new("/zone/home", "/")],
            ..Default::default()
        };
        let ctx: Arc<FsContext> = FsContext::new(config, client);
        assert!(matches!(
            ctx.setattr_path("/f", None, true, false).await,
            Err(FsError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_truncate_read_only_mapping() {
        let (_client, ctx) =
            ctx_with(vec![PathMapping::new("/zone/home", "/").read_only()]);
        assert!(matches!(
            ctx.truncate_path("/data.bin", 10).await,
            Err(FsError::ReadOnlyFs { .. })
        ));
    }

    #[tokio::test]
    async fn test_xattr_round_trip_and_filter() {
        let (client, ctx) = ctx_with(vec![PathMapping::new("/zone/home", "/")]);

        ctx.setxattr_path("/data.bin", "user.tag", b"v1").await.unwrap();
        assert_eq!(
            ctx.getxattr_path("/data.bin", "user.tag").await.unwrap(),
            Some(b"v1".to_vec())
        );

        // internal names are hidden even when present on the backend
        client
            .set_xattr("/zone/home/data.bin", "irodsfuse.internal", b"x")
            .await
            .unwrap();
        let names: Vec<String> = ctx.listxattr_path("/data.bin").await.unwrap();
        assert_eq!(names, vec!["user.tag".to_string()]);
        assert_eq!(
            ctx.getxattr_path("/data.bin", "irodsfuse.internal")
                .await
                .unwrap(),
            None
        );

        ctx.removexattr_path("/data.bin", "user.tag").await.unwrap();
        assert_eq!(
            ctx.getxattr_path("/data.bin", "user.tag").await.unwrap(),
            None
        );
    }
}
