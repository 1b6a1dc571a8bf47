//! Synchronous reader layers.
//!
//! `SyncReader` is the thin adaptor between a pipeline and the backend
//! handle; `NilReader` is the stub installed on write-only handles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use irods_fuse_client::ObjectHandle;
use irods_fuse_common::FsError;

use crate::Reader;

/// Direct pass-through reader over a backend handle.
///
/// Records the number of bytes read for telemetry and keeps the first
/// error sticky.
pub struct SyncReader {
    handle: Arc<dyn ObjectHandle>,
    bytes_read: AtomicU64,
    error: Mutex<Option<FsError>>,
}

impl SyncReader {
    /// Create a reader over a backend handle.
    ///
    /// # Arguments
    /// * `handle` - The backend handle to read from
    pub fn new(handle: Arc<dyn ObjectHandle>) -> Self {
        Self {
            handle,
            bytes_read: AtomicU64::new(0),
            error: Mutex::new(None),
        }
    }

    /// Total bytes read through this reader.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Size of the object at open time.
    pub fn open_size(&self) -> u64 {
        self.handle.entry().size.max(0) as u64
    }

    fn record_error(&self, error: &FsError) {
        let mut slot = self.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error.clone());
        }
    }
}

#[async_trait]
impl Reader for SyncReader {
    async fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, FsError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        if dest.is_empty() {
            return Ok(0);
        }

        match self.handle.read_at(dest, offset).await {
            Ok(count) => {
                self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
                Ok(count)
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    fn error(&self) -> Option<FsError> {
        self.error.lock().unwrap().clone()
    }

    async fn release(&self) {}
}

/// Stub reader for handles opened without read access.
pub struct NilReader;

impl NilReader {
    /// Create the stub.
    pub fn new() -> Self {
        Self
    }
}

impl Default for NilReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reader for NilReader {
    async fn read_at(&self, _dest: &mut [u8], _offset: u64) -> Result<usize, FsError> {
        Err(FsError::bad_handle("handle not open for reading"))
    }

    fn error(&self) -> Option<FsError> {
        None
    }

    async fn release(&self) {}
}
