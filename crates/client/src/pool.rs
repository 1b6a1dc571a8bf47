//! Connection pooling and operation timeouts.
//!
//! Every backend call may block on network I/O, so the filesystem never
//! talks to a driver directly: it goes through `PooledClient`, which caps
//! concurrent backend operations at the configured connection maximum and
//! bounds each operation (including the wait for a pool slot) by the
//! operation timeout. Expiry surfaces as `FsError::Timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

use irods_fuse_common::FsError;

use crate::client::{ObjectClient, ObjectHandle};
use crate::types::{Access, Entry, OpenMode, XattrEntry};

/// An `ObjectClient` wrapper enforcing the connection cap and per-operation
/// timeout.
pub struct PooledClient {
    inner: Arc<dyn ObjectClient>,
    connections: Semaphore,
    operation_timeout: Duration,
}

impl PooledClient {
    /// Wrap a driver.
    ///
    /// # Arguments
    /// * `inner` - The protocol driver
    /// * `connection_max` - Maximum concurrent backend operations (>= 1)
    /// * `operation_timeout` - Deadline for each operation
    pub fn new(
        inner: Arc<dyn ObjectClient>,
        connection_max: usize,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            connections: Semaphore::new(connection_max.max(1)),
            operation_timeout,
        }
    }

    /// The configured per-operation timeout.
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Run one backend operation under a pool slot and the timeout.
    async fn run<T, F>(&self, operation: &str, future: F) -> Result<T, FsError>
    where
        F: Future<Output = Result<T, FsError>>,
    {
        let bounded = async {
            let _permit: SemaphorePermit<'_> = self
                .connections
                .acquire()
                .await
                .map_err(|_| FsError::Aborted)?;
            future.await
        };

        match tokio::time::timeout(self.operation_timeout, bounded).await {
            Ok(result) => result,
            Err(_) => Err(FsError::timeout(operation)),
        }
    }
}

#[async_trait]
impl ObjectClient for PooledClient {
    async fn stat(&self, path: &str) -> Result<Entry, FsError> {
        self.run("stat", self.inner.stat(path)).await
    }

    async fn exists(&self, path: &str) -> Result<bool, FsError> {
        self.run("exists", self.inner.exists(path)).await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<Entry>, FsError> {
        self.run("list_dir", self.inner.list_dir(path)).await
    }

    async fn list_access(&self, path: &str) -> Result<Vec<Access>, FsError> {
        self.run("list_access", self.inner.list_access(path)).await
    }

    async fn open(
        &self,
        path: &str,
        resource: &str,
        mode: OpenMode,
    ) -> Result<Arc<dyn ObjectHandle>, FsError> {
        self.run("open", self.inner.open(path, resource, mode)).await
    }

    async fn create_file(
        &self,
        path: &str,
        resource: &str,
        mode: OpenMode,
    ) -> Result<Arc<dyn ObjectHandle>, FsError> {
        self.run("create_file", self.inner.create_file(path, resource, mode))
            .await
    }

    async fn truncate_object(&self, path: &str, size: i64) -> Result<(), FsError> {
        self.run("truncate", self.inner.truncate_object(path, size))
            .await
    }

    async fn make_dir(&self, path: &str) -> Result<(), FsError> {
        self.run("make_dir", self.inner.make_dir(path)).await
    }

    async fn remove_file(&self, path: &str) -> Result<(), FsError> {
        self.run("remove_file", self.inner.remove_file(path)).await
    }

    async fn remove_dir(&self, path: &str) -> Result<(), FsError> {
        self.run("remove_dir", self.inner.remove_dir(path)).await
    }

    async fn rename(&self, source: &str, dest: &str) -> Result<(), FsError> {
        self.run("rename", self.inner.rename(source, dest)).await
    }

    async fn list_xattr(&self, path: &str) -> Result<Vec<XattrEntry>, FsError> {
        self.run("list_xattr", self.inner.list_xattr(path)).await
    }

    async fn get_xattr(&self, path: &str, name: &str) -> Result<Option<Vec<u8>>, FsError> {
        self.run("get_xattr", self.inner.get_xattr(path, name)).await
    }

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<(), FsError> {
        self.run("set_xattr", self.inner.set_xattr(path, name, value))
            .await
    }

    async fn remove_xattr(&self, path: &str, name: &str) -> Result<(), FsError> {
        self.run("remove_xattr", self.inner.remove_xattr(path, name))
            .await
    }
}
