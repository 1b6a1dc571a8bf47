//! Synchronous writer layers.
//!
//! `SyncWriter` is the pass-through to the backend handle. `BufferedWriter`
//! aggregates sequential writes into one block-sized buffer in front of any
//! inner writer. `NilWriter` is the stub installed on read-only handles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use irods_fuse_client::ObjectHandle;
use irods_fuse_common::FsError;

use crate::Writer;

/// Direct pass-through writer over a backend handle.
pub struct SyncWriter {
    handle: Arc<dyn ObjectHandle>,
    bytes_written: AtomicU64,
    error: Mutex<Option<FsError>>,
}

impl SyncWriter {
    /// Create a writer over a backend handle.
    ///
    /// # Arguments
    /// * `handle` - The backend handle to write to
    pub fn new(handle: Arc<dyn ObjectHandle>) -> Self {
        Self {
            handle,
            bytes_written: AtomicU64::new(0),
            error: Mutex::new(None),
        }
    }

    /// Total bytes written through this writer.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    fn record_error(&self, error: &FsError) {
        let mut slot = self.error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error.clone());
        }
    }
}

#[async_trait]
impl Writer for SyncWriter {
    async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, FsError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        if data.is_empty() {
            return Ok(0);
        }

        match self.handle.write_at(data, offset).await {
            Ok(count) => {
                self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
                Ok(count)
            }
            Err(error) => {
                self.record_error(&error);
                Err(error)
            }
        }
    }

    async fn flush(&self) -> Result<(), FsError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        self.handle.flush().await
    }

    fn error(&self) -> Option<FsError> {
        self.error.lock().unwrap().clone()
    }

    async fn release(&self) {}
}

// ============================================================================
// Buffered writer
// ============================================================================

struct WriteBuffer {
    data: Vec<u8>,
    offset: u64,
}

impl WriteBuffer {
    fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Block-aggregating writer.
///
/// Holds one contiguous buffer of at most the block size. Sequential
/// writes that extend the buffer's trailing edge are absorbed; the buffer
/// drains to the inner writer when it fills, when a non-sequential write
/// arrives, or on flush.
pub struct BufferedWriter<W: Writer> {
    inner: W,
    block_size: usize,
    buffer: tokio::sync::Mutex<Option<WriteBuffer>>,
}

impl<W: Writer> BufferedWriter<W> {
    /// Create a buffered writer.
    ///
    /// # Arguments
    /// * `inner` - Writer the buffer drains to
    /// * `block_size` - Buffer capacity in bytes
    pub fn new(inner: W, block_size: usize) -> Self {
        Self {
            inner,
            block_size: block_size.max(1),
            buffer: tokio::sync::Mutex::new(None),
        }
    }

    async fn drain(
        &self,
        buffer: &mut Option<WriteBuffer>,
    ) -> Result<(), FsError> {
        if let Some(full) = buffer.take() {
            if !full.data.is_empty() {
                self.inner.write_at(&full.data, full.offset).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<W: Writer> Writer for BufferedWriter<W> {
    async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, FsError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let mut buffer = self.buffer.lock().await;

        // a write that does not extend the trailing edge drains the buffer
        if let Some(current) = buffer.as_ref() {
            if offset != current.end() {
                self.drain(&mut buffer).await?;
            }
        }

        let mut remaining: &[u8] = data;
        let mut cursor: u64 = offset;

        while !remaining.is_empty() {
            if buffer.is_none() {
                *buffer = Some(WriteBuffer {
                    data: Vec::with_capacity(self.block_size),
                    offset: cursor,
                });
            }

            let space: usize = {
                let current: &WriteBuffer = buffer.as_ref().unwrap();
                self.block_size - current.data.len()
            };
            let take: usize = remaining.len().min(space);
            buffer
                .as_mut()
                .unwrap()
                .data
                .extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            cursor += take as u64;

            if buffer.as_ref().unwrap().data.len() == self.block_size {
                self.drain(&mut buffer).await?;
            }
        }

        Ok(data.len())
    }

    async fn flush(&self) -> Result<(), FsError> {
        {
            let mut buffer = self.buffer.lock().await;
            self.drain(&mut buffer).await?;
        }
        self.inner.flush().await
    }

    fn error(&self) -> Option<FsError> {
        self.inner.error()
    }

    async fn release(&self) {
        // drain what we can; a failing backend still gets its worker stopped
        {
            let mut buffer = self.buffer.lock().await;
            let _ = self.drain(&mut buffer).await;
        }
        self.inner.release().await;
    }
}

// ============================================================================
// Nil writer
// ============================================================================

/// Stub writer for handles opened without write access.
pub struct NilWriter;

impl NilWriter {
    /// Create the stub.
    pub fn new() -> Self {
        Self
    }
}

impl Default for NilWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Writer for NilWriter {
    async fn write_at(&self, _data: &[u8], _offset: u64) -> Result<usize, FsError> {
        Err(FsError::bad_handle("handle not open for writing"))
    }

    async fn flush(&self) -> Result<(), FsError> {
        Ok(())
    }

    fn error(&self) -> Option<FsError> {
        None
    }

    async fn release(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use irods_fuse_client::memory::IoTraceEntry;
    use irods_fuse_client::{MemoryObjectClient, ObjectClient, OpenMode};

    async fn open_buffered(
        block_size: usize,
    ) -> (MemoryObjectClient, BufferedWriter<SyncWriter>) {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());
        let handle: Arc<dyn ObjectHandle> =
            client.open("/z/f", "", OpenMode::WriteOnly).await.unwrap();
        let writer: BufferedWriter<SyncWriter> =
            BufferedWriter::new(SyncWriter::new(handle), block_size);
        (client, writer)
    }

    #[tokio::test]
    async fn test_sequential_writes_coalesce() {
        let (client, writer) = open_buffered(1024).await;

        for i in 0..8u64 {
            let chunk: Vec<u8> = vec![i as u8; 64];
            assert_eq!(writer.write_at(&chunk, i * 64).await.unwrap(), 64);
        }
        // nothing reached the backend yet
        assert!(client.write_trace().is_empty());

        writer.flush().await.unwrap();
        let trace: Vec<IoTraceEntry> = client.write_trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].offset, 0);
        assert_eq!(trace[0].len, 512);
    }

    #[tokio::test]
    async fn test_full_buffer_drains() {
        let (client, writer) = open_buffered(256).await;

        let data: Vec<u8> = vec![7u8; 1000];
        writer.write_at(&data, 0).await.unwrap();
        // 3 full blocks drained, 232 bytes still buffered
        assert_eq!(client.write_trace().len(), 3);

        writer.flush().await.unwrap();
        assert_eq!(client.write_trace().len(), 4);
        assert_eq!(client.content("/z/f").unwrap(), data);
    }

    #[tokio::test]
    async fn test_non_sequential_write_drains_first() {
        let (client, writer) = open_buffered(1024).await;

        writer.write_at(b"aaaa", 0).await.unwrap();
        writer.write_at(b"bbbb", 100).await.unwrap();
        writer.flush().await.unwrap();

        let trace: Vec<IoTraceEntry> = client.write_trace();
        assert_eq!(trace.len(), 2);
        assert_eq!((trace[0].offset, trace[0].len), (0, 4));
        assert_eq!((trace[1].offset, trace[1].len), (100, 4));
    }

    #[tokio::test]
    async fn test_zero_length_write_is_noop() {
        let (client, writer) = open_buffered(1024).await;
        assert_eq!(writer.write_at(&[], 0).await.unwrap(), 0);
        writer.flush().await.unwrap();
        assert!(client.write_trace().is_empty());
    }

    #[tokio::test]
    async fn test_write_error_is_sticky() {
        let (client, writer) = open_buffered(4).await;
        client.fail_writes(true);

        // filling the 4-byte buffer forces a drain, which fails
        assert!(writer.write_at(b"12345678", 0).await.is_err());

        client.fail_writes(false);
        assert!(writer.write_at(b"x", 100).await.is_err());
        assert!(writer.error().is_some());
    }

    #[tokio::test]
    async fn test_nil_writer_rejects_writes() {
        let writer: NilWriter = NilWriter::new();
        assert!(matches!(
            writer.write_at(b"x", 0).await,
            Err(FsError::BadHandle { .. })
        ));
        writer.flush().await.unwrap();
    }
}
