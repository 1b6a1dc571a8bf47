//! The remote object client contract.
//!
//! Every backend call may block on network I/O; callers that need bounds
//! wrap a driver in [`crate::PooledClient`]. Paths are absolute zone paths.

use std::sync::Arc;

use async_trait::async_trait;

use irods_fuse_common::FsError;

use crate::types::{Access, Entry, OpenMode, XattrEntry};

/// Low-level operations against the data grid - implemented by each driver.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Stat an entry by absolute path.
    async fn stat(&self, path: &str) -> Result<Entry, FsError>;

    /// Check whether an entry exists.
    async fn exists(&self, path: &str) -> Result<bool, FsError>;

    /// List the direct children of a collection.
    async fn list_dir(&self, path: &str) -> Result<Vec<Entry>, FsError>;

    /// List access grants on an entry.
    async fn list_access(&self, path: &str) -> Result<Vec<Access>, FsError>;

    /// Open a data object, returning a handle for data I/O.
    ///
    /// # Arguments
    /// * `path` - Absolute path of the data object
    /// * `resource` - Target resource, empty for the default
    /// * `mode` - Open mode
    async fn open(
        &self,
        path: &str,
        resource: &str,
        mode: OpenMode,
    ) -> Result<Arc<dyn ObjectHandle>, FsError>;

    /// Create an empty data object and open it for writing.
    async fn create_file(
        &self,
        path: &str,
        resource: &str,
        mode: OpenMode,
    ) -> Result<Arc<dyn ObjectHandle>, FsError>;

    /// Truncate a data object by path, without an open handle.
    async fn truncate_object(&self, path: &str, size: i64) -> Result<(), FsError>;

    /// Create a collection.
    async fn make_dir(&self, path: &str) -> Result<(), FsError>;

    /// Remove a data object.
    async fn remove_file(&self, path: &str) -> Result<(), FsError>;

    /// Remove an empty collection.
    async fn remove_dir(&self, path: &str) -> Result<(), FsError>;

    /// Rename an entry (file or collection) within the zone.
    async fn rename(&self, source: &str, dest: &str) -> Result<(), FsError>;

    /// List extended attributes on an entry.
    async fn list_xattr(&self, path: &str) -> Result<Vec<XattrEntry>, FsError>;

    /// Get one extended attribute, `None` if unset.
    async fn get_xattr(&self, path: &str, name: &str) -> Result<Option<Vec<u8>>, FsError>;

    /// Set one extended attribute, replacing an existing value.
    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<(), FsError>;

    /// Remove one extended attribute. `NotFound` if unset.
    async fn remove_xattr(&self, path: &str, name: &str) -> Result<(), FsError>;
}

/// An open data object.
///
/// Handles are shared between a reader or writer pipeline and the owning
/// file handle; all operations take `&self`.
#[async_trait]
pub trait ObjectHandle: Send + Sync {
    /// The entry this handle was opened against (point-in-time).
    fn entry(&self) -> Entry;

    /// Mode the handle was opened in.
    fn open_mode(&self) -> OpenMode;

    /// Current size of the object as known to this handle.
    async fn size(&self) -> i64;

    /// Read up to `dest.len()` bytes at `offset`. Returns the number of
    /// bytes read; 0 means end of file.
    async fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, FsError>;

    /// Write `data` at `offset`. For append-mode handles the offset is
    /// interpreted relative to the object tail.
    async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, FsError>;

    /// Truncate the object to `size` bytes.
    async fn truncate(&self, size: i64) -> Result<(), FsError>;

    /// Flush driver-side buffers.
    async fn flush(&self) -> Result<(), FsError>;

    /// Close the handle. Idempotent.
    async fn close(&self) -> Result<(), FsError>;
}
