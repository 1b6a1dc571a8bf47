//! Open file handles.
//!
//! A `FileHandle` ties a FUSE file descriptor to a backend handle plus the
//! reader/writer pipelines selected by the open mode. The pipelines live
//! behind the handle's own mutex so release can detach them exactly once
//! while other operations fail cleanly afterwards.

use std::sync::Arc;

use tokio::sync::Mutex;

use irods_fuse_client::{Entry, ObjectHandle, OpenMode};
use irods_fuse_common::FsError;
use irods_fuse_io::{build_pipelines, Reader, Writer};

use crate::lock::{LockRecord, LocalLockTable};

struct HandleIo {
    reader: Box<dyn Reader>,
    writer: Box<dyn Writer>,
}

/// Per-open state: backend handle, pipelines, advisory locks.
pub struct FileHandle {
    id: u64,
    path: String,
    entry: Entry,
    mode: OpenMode,
    backend: Arc<dyn ObjectHandle>,
    io: Mutex<Option<HandleIo>>,
    locks: LocalLockTable,
}

impl FileHandle {
    /// Build a handle and its pipelines for a freshly opened object.
    ///
    /// # Arguments
    /// * `id` - Registry-assigned handle id
    /// * `path` - Mount-relative path the handle was opened at
    /// * `backend` - The backend handle
    /// * `block_size` - Pipeline block size
    /// * `read_ahead_max` - Read-ahead budget in bytes
    pub fn new(
        id: u64,
        path: String,
        backend: Arc<dyn ObjectHandle>,
        block_size: usize,
        read_ahead_max: usize,
    ) -> Self {
        let entry: Entry = backend.entry();
        let mode: OpenMode = backend.open_mode();
        let (reader, writer) = build_pipelines(backend.clone(), block_size, read_ahead_max);

        Self {
            id,
            path,
            entry,
            mode,
            backend,
            io: Mutex::new(Some(HandleIo { reader, writer })),
            locks: LocalLockTable::new(),
        }
    }

    /// Registry-assigned handle id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mount-relative path the handle was opened at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Entry snapshot taken at open.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Mode the handle was opened in.
    pub fn open_mode(&self) -> OpenMode {
        self.mode
    }

    /// The backend handle (for release-time close).
    pub fn backend(&self) -> Arc<dyn ObjectHandle> {
        self.backend.clone()
    }

    /// The handle's advisory lock table.
    pub fn locks(&self) -> &LocalLockTable {
        &self.locks
    }

    /// Read through the handle's reader pipeline.
    ///
    /// # Arguments
    /// * `dest` - Destination buffer
    /// * `offset` - Byte offset in the object
    pub async fn read(&self, dest: &mut [u8], offset: i64) -> Result<usize, FsError> {
        if !self.mode.is_read() {
            return Err(FsError::bad_handle(format!(
                "{} opened write-only",
                self.path
            )));
        }
        if offset < 0 {
            return Err(FsError::BadOffset { offset });
        }

        let io = self.io.lock().await;
        let io: &HandleIo = io
            .as_ref()
            .ok_or_else(|| FsError::bad_handle("handle released"))?;

        // reads past the size known at open return no data
        if offset as u64 >= self.entry.size.max(0) as u64 && self.mode == OpenMode::ReadOnly {
            return Ok(0);
        }

        io.reader.read_at(dest, offset as u64).await
    }

    /// Write through the handle's writer pipeline.
    ///
    /// # Arguments
    /// * `data` - Bytes to write
    /// * `offset` - Byte offset in the object
    pub async fn write(&self, data: &[u8], offset: i64) -> Result<usize, FsError> {
        if !self.mode.is_write() {
            return Err(FsError::bad_handle(format!(
                "{} opened read-only",
                self.path
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }
        if offset < 0 {
            return Err(FsError::BadOffset { offset });
        }

        let io = self.io.lock().await;
        let io: &HandleIo = io
            .as_ref()
            .ok_or_else(|| FsError::bad_handle("handle released"))?;
        io.writer.write_at(data, offset as u64).await
    }

    /// Truncate the object through this handle.
    ///
    /// Queued writes are flushed first so they cannot resurrect the old
    /// length after the truncate.
    ///
    /// # Arguments
    /// * `size` - New object size
    pub async fn truncate(&self, size: i64) -> Result<(), FsError> {
        if !self.mode.is_write() {
            return Err(FsError::bad_handle(format!(
                "{} opened read-only",
                self.path
            )));
        }

        let io = self.io.lock().await;
        let io: &HandleIo = io
            .as_ref()
            .ok_or_else(|| FsError::bad_handle("handle released"))?;
        io.writer.flush().await?;
        self.backend.truncate(size).await
    }

    /// Flush queued writes to the backend.
    pub async fn flush(&self) -> Result<(), FsError> {
        let io = self.io.lock().await;
        match io.as_ref() {
            Some(io) => io.writer.flush().await,
            None => Ok(()),
        }
    }

    /// Detach and drain the pipelines. Idempotent; the first sticky
    /// pipeline error is returned.
    pub async fn release_pipelines(&self) -> Result<(), FsError> {
        let io: Option<HandleIo> = self.io.lock().await.take();
        let io: HandleIo = match io {
            Some(io) => io,
            None => return Ok(()),
        };

        io.reader.release().await;
        let read_error: Option<FsError> = io.reader.error();

        io.writer.release().await;
        let write_error: Option<FsError> = io.writer.error();

        match read_error.or(write_error) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Find the first lock conflicting with a range.
    ///
    /// # Arguments
    /// * `start` - First byte (inclusive)
    /// * `end` - Last byte (inclusive)
    pub fn get_local_lock(&self, start: u64, end: u64) -> Option<LockRecord> {
        self.locks.get(start, end)
    }

    /// Apply a lock request on this handle.
    ///
    /// # Arguments
    /// * `record` - The lock request
    pub fn set_local_lock(&self, record: LockRecord) -> Result<(), FsError> {
        self.locks.set(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockType;
    use irods_fuse_client::{MemoryObjectClient, ObjectClient};

    const BLOCK: usize = 1024;

    async fn open_handle(client: &MemoryObjectClient, mode: OpenMode) -> FileHandle {
        let backend: Arc<dyn ObjectHandle> = client.open("/z/f", "", mode).await.unwrap();
        FileHandle::new(1, "/z/f".to_string(), backend, BLOCK, 2 * BLOCK)
    }

    #[tokio::test]
    async fn test_mode_validation() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", b"data".to_vec());

        let reader: FileHandle = open_handle(&client, OpenMode::ReadOnly).await;
        assert!(reader.write(b"x", 0).await.is_err());
        reader.release_pipelines().await.unwrap();

        let writer: FileHandle = open_handle(&client, OpenMode::WriteOnly).await;
        let mut buffer: Vec<u8> = vec![0u8; 4];
        assert!(writer.read(&mut buffer, 0).await.is_err());
        writer.release_pipelines().await.unwrap();
    }

    #[tokio::test]
    async fn test_negative_offset_rejected() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", b"data".to_vec());

        let writer: FileHandle = open_handle(&client, OpenMode::WriteOnly).await;
        assert!(matches!(
            writer.write(b"x", -1).await,
            Err(FsError::BadOffset { .. })
        ));
        writer.release_pipelines().await.unwrap();
    }

    #[tokio::test]
    async fn test_read_past_open_size_returns_zero() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", b"1234".to_vec());

        let reader: FileHandle = open_handle(&client, OpenMode::ReadOnly).await;
        let mut buffer: Vec<u8> = vec![0u8; 4];
        assert_eq!(reader.read(&mut buffer, 100).await.unwrap(), 0);
        reader.release_pipelines().await.unwrap();
    }

    #[tokio::test]
    async fn test_truncate_flushes_queued_writes_first() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());

        let writer: FileHandle = open_handle(&client, OpenMode::WriteOnly).await;
        // stays in the write buffer, not yet on the backend
        writer.write(&vec![7u8; 512], 0).await.unwrap();
        writer.truncate(100).await.unwrap();

        // flush-then-truncate leaves the truncated length
        assert_eq!(client.content("/z/f").unwrap().len(), 100);

        writer.flush().await.unwrap();
        assert_eq!(client.content("/z/f").unwrap().len(), 100);
        writer.release_pipelines().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_detaches() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", b"abc".to_vec());

        let handle: FileHandle = open_handle(&client, OpenMode::ReadOnly).await;
        handle.release_pipelines().await.unwrap();
        handle.release_pipelines().await.unwrap();

        let mut buffer: Vec<u8> = vec![0u8; 1];
        assert!(matches!(
            handle.read(&mut buffer, 0).await,
            Err(FsError::BadHandle { .. })
        ));
    }

    #[tokio::test]
    async fn test_handle_local_locks() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", b"abc".to_vec());
        let handle: FileHandle = open_handle(&client, OpenMode::ReadOnly).await;

        handle
            .set_local_lock(LockRecord::new(LockType::Write, 10, 0, 100))
            .unwrap();
        assert!(handle.get_local_lock(50, 60).is_some());
        assert!(handle
            .set_local_lock(LockRecord::new(LockType::Write, 10, 50, 150))
            .is_err());

        handle.release_pipelines().await.unwrap();
    }
}
