//! Asynchronous write-back.
//!
//! `AsyncWriter` submits writes to a bounded queue served by one worker
//! task per handle, so FUSE write callers return as soon as the bytes are
//! durably queued. The single worker keeps completion order equal to
//! submission order. `flush` is a barrier: it returns once every prior
//! write has been acknowledged by the inner writer. Errors are sticky and
//! fail subsequent writes fast, but the queue is always drained.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use async_trait::async_trait;

use irods_fuse_common::FsError;

use crate::Writer;

const QUEUE_DEPTH: usize = 16;

enum Command {
    Write { data: Vec<u8>, offset: u64 },
    Flush { ack: oneshot::Sender<Result<(), FsError>> },
}

/// Queue-backed writer running its inner writer on a worker task.
pub struct AsyncWriter {
    tx: Mutex<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    error: Arc<Mutex<Option<FsError>>>,
}

impl AsyncWriter {
    /// Create an async writer draining into `inner`.
    ///
    /// # Arguments
    /// * `inner` - Writer executed on the worker task
    pub fn new<W: Writer + 'static>(inner: W) -> Self {
        let error: Arc<Mutex<Option<FsError>>> = Arc::new(Mutex::new(None));
        let (tx, rx) = mpsc::channel::<Command>(QUEUE_DEPTH);
        let worker: JoinHandle<()> = tokio::spawn(write_worker(rx, inner, error.clone()));

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            error,
        }
    }

    fn sender(&self) -> Option<mpsc::Sender<Command>> {
        self.tx.lock().unwrap().clone()
    }

    async fn barrier(&self) -> Result<(), FsError> {
        let sender: mpsc::Sender<Command> = match self.sender() {
            Some(sender) => sender,
            None => return self.error().map_or(Ok(()), Err),
        };

        let (ack_tx, ack_rx) = oneshot::channel::<Result<(), FsError>>();
        sender
            .send(Command::Flush { ack: ack_tx })
            .await
            .map_err(|_| FsError::bad_handle("write worker gone"))?;
        ack_rx
            .await
            .map_err(|_| FsError::bad_handle("write worker gone"))?
    }
}

#[async_trait]
impl Writer for AsyncWriter {
    async fn write_at(&self, data: &[u8], offset: u64) -> Result<usize, FsError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        if data.is_empty() {
            return Ok(0);
        }

        let sender: mpsc::Sender<Command> = self
            .sender()
            .ok_or_else(|| FsError::bad_handle("writer already released"))?;
        sender
            .send(Command::Write {
                data: data.to_vec(),
                offset,
            })
            .await
            .map_err(|_| FsError::bad_handle("write worker gone"))?;
        Ok(data.len())
    }

    async fn flush(&self) -> Result<(), FsError> {
        self.barrier().await?;
        // the barrier drains the queue even when an earlier write failed;
        // the failure is still the result
        self.error().map_or(Ok(()), Err)
    }

    fn error(&self) -> Option<FsError> {
        self.error.lock().unwrap().clone()
    }

    async fn release(&self) {
        let _ = self.barrier().await;

        let _ = self.tx.lock().unwrap().take();
        let worker: Option<JoinHandle<()>> = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

/// Worker loop committing queued writes in submission order.
async fn write_worker<W: Writer>(
    mut rx: mpsc::Receiver<Command>,
    inner: W,
    error: Arc<Mutex<Option<FsError>>>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Write { data, offset } => {
                let failed: bool = error.lock().unwrap().is_some();
                if failed {
                    // fail-fast: drop queued data after the first error
                    continue;
                }
                if let Err(write_error) = inner.write_at(&data, offset).await {
                    let mut slot = error.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(write_error);
                    }
                }
            }
            Command::Flush { ack } => {
                let sticky: Option<FsError> = error.lock().unwrap().clone();
                let result: Result<(), FsError> = match sticky {
                    Some(sticky_error) => Err(sticky_error),
                    None => {
                        let flushed: Result<(), FsError> = inner.flush().await;
                        if let Err(ref flush_error) = flushed {
                            let mut slot = error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(flush_error.clone());
                            }
                        }
                        flushed
                    }
                };
                let _ = ack.send(result);
            }
        }
    }
    inner.release().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::SyncWriter;
    use irods_fuse_client::memory::IoTraceEntry;
    use irods_fuse_client::{MemoryObjectClient, ObjectClient, ObjectHandle, OpenMode};

    async fn open_async(client: &MemoryObjectClient) -> AsyncWriter {
        let handle: Arc<dyn ObjectHandle> =
            client.open("/z/f", "", OpenMode::WriteOnly).await.unwrap();
        AsyncWriter::new(SyncWriter::new(handle))
    }

    #[tokio::test]
    async fn test_writes_commit_in_submission_order() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());
        let writer: AsyncWriter = open_async(&client).await;

        writer.write_at(b"aaaa", 0).await.unwrap();
        writer.write_at(b"bbbb", 4).await.unwrap();
        writer.write_at(b"cccc", 8).await.unwrap();
        writer.flush().await.unwrap();

        let trace: Vec<IoTraceEntry> = client.write_trace();
        let offsets: Vec<u64> = trace.iter().map(|t: &IoTraceEntry| t.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);
        assert_eq!(client.content("/z/f").unwrap(), b"aaaabbbbcccc");

        writer.release().await;
    }

    #[tokio::test]
    async fn test_flush_is_a_barrier() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());
        let writer: AsyncWriter = open_async(&client).await;

        for i in 0..32u64 {
            writer.write_at(&[i as u8; 128], i * 128).await.unwrap();
        }
        writer.flush().await.unwrap();

        // every queued write reached the backend before flush returned
        assert_eq!(client.write_trace().len(), 32);
        writer.release().await;
    }

    #[tokio::test]
    async fn test_error_is_sticky_and_fails_fast() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());
        let writer: AsyncWriter = open_async(&client).await;

        client.fail_writes(true);
        writer.write_at(b"doomed", 0).await.unwrap();
        assert!(writer.flush().await.is_err());

        client.fail_writes(false);
        // later writes fail fast with the recorded error
        assert!(matches!(
            writer.write_at(b"more", 6).await,
            Err(FsError::RemoteUnavailable { .. })
        ));
        assert!(writer.flush().await.is_err());

        writer.release().await;
    }

    #[tokio::test]
    async fn test_release_drains_and_stops_worker() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());
        let writer: AsyncWriter = open_async(&client).await;

        writer.write_at(b"payload", 0).await.unwrap();
        writer.release().await;

        assert_eq!(client.content("/z/f").unwrap(), b"payload");

        // released writer rejects further writes
        assert!(writer.write_at(b"late", 7).await.is_err());
        // and release stays idempotent
        writer.release().await;
    }

    #[tokio::test]
    async fn test_zero_length_write_succeeds() {
        let client: MemoryObjectClient = MemoryObjectClient::new();
        client.add_file("/z/f", Vec::new());
        let writer: AsyncWriter = open_async(&client).await;

        assert_eq!(writer.write_at(&[], 0).await.unwrap(), 0);
        writer.flush().await.unwrap();
        assert!(client.write_trace().is_empty());
        writer.release().await;
    }
}
