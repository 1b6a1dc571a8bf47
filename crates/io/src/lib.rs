//! Reader and writer pipelines for the iRODS FUSE filesystem.
//!
//! Every open file handle owns one reader and one writer. Which concrete
//! pipeline backs them depends on the open mode:
//!
//! ```text
//! ReadOnly       reader: PrefetchReader ── SyncReader ── backend
//!                writer: NilWriter
//! WriteOnly /    reader: NilReader
//! Append /       writer: BufferedWriter ── AsyncWriter ── SyncWriter ── backend
//! WriteTruncate
//! ReadWrite      reader: SyncReader, writer: SyncWriter  (no prefetch, no
//!                async buffering, so reads observe writes)
//! ```
//!
//! Pipeline errors are sticky: the first non-EOF error is recorded and
//! returned by every later call until the handle is released.

pub mod async_write;
pub mod prefetch;
pub mod read;
pub mod write;

use async_trait::async_trait;

use irods_fuse_client::{ObjectHandle, OpenMode};
use irods_fuse_common::FsError;

pub use async_write::AsyncWriter;
pub use prefetch::{PrefetchOptions, PrefetchReader};
pub use read::{NilReader, SyncReader};
pub use write::{BufferedWriter, NilWriter, SyncWriter};

/// Read side of a file handle.
#[async_trait]
pub trait Reader: Send + Sync {
    /// Read up to `dest.len()` bytes at `offset`.
    ///
    /// Returns the number of bytes read; 0 at or past end of file. Short
    /// reads are allowed at block boundaries.
    async fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, FsError>;

    /// First non-EOF error observed by the pipeline, if any (sticky).
    fn error(&self) -> Option<FsError>;

    /// Stop background work and wait for it. Idempotent.
    async fn release(&self);
}

/// Write side of a file handle.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Write `data` at `offset`.
    ///
    /// Success means the bytes are durably queued; they are not guaranteed
    /// on the backend until `flush` returns.
    async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, FsError>;

    /// Block until every queued write has been acknowledged by the backend.
    async fn flush(&self) -> Result<(), FsError>;

    /// First error observed by the pipeline, if any (sticky).
    fn error(&self) -> Option<FsError>;

    /// Flush, then stop background work and wait for it. Idempotent.
    async fn release(&self);
}

/// Build the reader/writer pair for a freshly opened backend handle.
///
/// # Arguments
/// * `handle` - The backend handle the pipelines drive
/// * `block_size` - Block size for buffering and prefetch
/// * `read_ahead_max` - Read-ahead budget in bytes (bounds the block cache)
pub fn build_pipelines(
    handle: std::sync::Arc<dyn ObjectHandle>,
    block_size: usize,
    read_ahead_max: usize,
) -> (Box<dyn Reader>, Box<dyn Writer>) {
    let mode: OpenMode = handle.open_mode();

    if mode.is_read_only() {
        let sync_reader: SyncReader = SyncReader::new(handle);
        let options: PrefetchOptions = PrefetchOptions::new(block_size, read_ahead_max);
        let reader: PrefetchReader = PrefetchReader::new(sync_reader, options);
        (Box::new(reader), Box::new(NilWriter::new()))
    } else if mode.is_write_only() {
        let sync_writer: SyncWriter = SyncWriter::new(handle);
        let async_writer: AsyncWriter = AsyncWriter::new(sync_writer);
        let writer: BufferedWriter<AsyncWriter> = BufferedWriter::new(async_writer, block_size);
        (Box::new(NilReader::new()), Box::new(writer))
    } else {
        // ReadWrite stays fully synchronous for read-your-writes consistency
        let reader: SyncReader = SyncReader::new(handle.clone());
        let writer: SyncWriter = SyncWriter::new(handle);
        (Box::new(reader), Box::new(writer))
    }
}
