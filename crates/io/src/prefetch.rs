//! Read-ahead reader.
//!
//! `PrefetchReader` layers a block cache and a single speculative fetch
//! slot over a `SyncReader`. Sequential reads populate whole blocks and
//! arm a speculative fetch of the next block; random reads drop pending
//! speculation and are served with span-exact backend reads that never
//! cross a block boundary. A superseded speculative fetch is allowed to
//! finish and its result is dropped.
//!
//! ```text
//! read_at ──► block cache (≤ K blocks, LRU) ──► SyncReader ──► backend
//!                  ▲
//!          fetch worker (one speculative block in flight)
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use async_trait::async_trait;

use irods_fuse_common::FsError;

use crate::read::SyncReader;
use crate::Reader;

/// Minimum number of cached blocks.
const CACHE_BLOCKS_MIN: usize = 2;

/// Sizing options for the prefetching reader.
#[derive(Debug, Clone, Copy)]
pub struct PrefetchOptions {
    /// Block size in bytes.
    pub block_size: usize,
    /// Maximum number of cached blocks.
    pub cache_blocks: usize,
}

impl PrefetchOptions {
    /// Derive options from the configured block size and read-ahead budget.
    ///
    /// # Arguments
    /// * `block_size` - Block size in bytes
    /// * `read_ahead_max` - Read-ahead budget in bytes
    pub fn new(block_size: usize, read_ahead_max: usize) -> Self {
        let block_size: usize = block_size.max(1);
        Self {
            block_size,
            cache_blocks: (read_ahead_max / block_size).max(CACHE_BLOCKS_MIN),
        }
    }
}

struct FetchRequest {
    block: u64,
    generation: u64,
}

struct ReaderState {
    blocks: HashMap<u64, Arc<Vec<u8>>>,
    lru: VecDeque<u64>,
    in_flight: HashSet<u64>,
    speculative: Option<u64>,
    generation: u64,
    last_end: u64,
    error: Option<FsError>,
    released: bool,
}

impl ReaderState {
    fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            lru: VecDeque::new(),
            in_flight: HashSet::new(),
            speculative: None,
            generation: 0,
            last_end: 0,
            error: None,
            released: false,
        }
    }

    fn touch(&mut self, block: u64) {
        self.lru.retain(|&b: &u64| b != block);
        self.lru.push_back(block);
    }

    fn insert(&mut self, block: u64, data: Arc<Vec<u8>>, cache_blocks: usize) {
        self.blocks.insert(block, data);
        self.touch(block);
        while self.blocks.len() > cache_blocks {
            match self.lru.pop_front() {
                Some(oldest) if oldest != block => {
                    self.blocks.remove(&oldest);
                }
                Some(block_again) => {
                    // freshly inserted block is never the eviction victim
                    self.lru.push_back(block_again);
                    break;
                }
                None => break,
            }
        }
    }

    fn record_error(&mut self, error: FsError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Block-caching reader with speculative read-ahead.
pub struct PrefetchReader {
    inner: Arc<SyncReader>,
    options: PrefetchOptions,
    size: u64,
    state: Arc<Mutex<ReaderState>>,
    notify: Arc<Notify>,
    fetch_tx: Mutex<Option<mpsc::Sender<FetchRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PrefetchReader {
    /// Create a prefetching reader over a sync reader.
    ///
    /// # Arguments
    /// * `inner` - The sync reader driving the backend
    /// * `options` - Block size and cache bound
    pub fn new(inner: SyncReader, options: PrefetchOptions) -> Self {
        let inner: Arc<SyncReader> = Arc::new(inner);
        let size: u64 = inner.open_size();
        let state: Arc<Mutex<ReaderState>> = Arc::new(Mutex::new(ReaderState::new()));
        let notify: Arc<Notify> = Arc::new(Notify::new());

        let (tx, rx) = mpsc::channel::<FetchRequest>(2);
        let worker: JoinHandle<()> = tokio::spawn(fetch_worker(
            rx,
            inner.clone(),
            state.clone(),
            notify.clone(),
            options,
            size,
        ));

        Self {
            inner,
            options,
            size,
            state,
            notify,
            fetch_tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Block indexes currently in the cache (test probe).
    pub fn cached_blocks(&self) -> Vec<u64> {
        let state = self.state.lock().unwrap();
        let mut blocks: Vec<u64> = state.blocks.keys().copied().collect();
        blocks.sort_unstable();
        blocks
    }

    fn block_count(&self) -> u64 {
        self.size.div_ceil(self.options.block_size as u64)
    }

    /// Wait until the in-flight fetch of `block` settles.
    async fn wait_for_block(&self, block: u64) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let pending: bool = {
                let state = self.state.lock().unwrap();
                state.in_flight.contains(&block) && !state.blocks.contains_key(&block)
            };
            if !pending {
                return;
            }
            notified.await;
        }
    }

    /// Fetch one whole block through the sync reader and cache it.
    async fn fetch_block_inline(&self, block: u64) -> Result<Arc<Vec<u8>>, FsError> {
        self.state.lock().unwrap().in_flight.insert(block);

        let result: Result<Vec<u8>, FsError> =
            fetch_block(&self.inner, block, self.options.block_size, self.size).await;

        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(&block);
        let outcome: Result<Arc<Vec<u8>>, FsError> = match result {
            Ok(data) => {
                let data: Arc<Vec<u8>> = Arc::new(data);
                if !state.released {
                    state.insert(block, data.clone(), self.options.cache_blocks);
                }
                Ok(data)
            }
            Err(error) => {
                state.record_error(error.clone());
                Err(error)
            }
        };
        drop(state);
        self.notify.notify_waiters();
        outcome
    }

    /// Arm the speculative fetch of `block` if the slot is free.
    fn schedule_speculation(&self, block: u64) {
        if block >= self.block_count() {
            return;
        }

        let generation: u64 = {
            let mut state = self.state.lock().unwrap();
            if state.released
                || state.speculative.is_some()
                || state.blocks.contains_key(&block)
                || state.in_flight.contains(&block)
            {
                return;
            }
            state.speculative = Some(block);
            state.in_flight.insert(block);
            state.generation
        };

        let sent: bool = {
            let tx = self.fetch_tx.lock().unwrap();
            match tx.as_ref() {
                Some(tx) => tx.try_send(FetchRequest { block, generation }).is_ok(),
                None => false,
            }
        };

        if !sent {
            let mut state = self.state.lock().unwrap();
            state.speculative = None;
            state.in_flight.remove(&block);
        }
    }
}

#[async_trait]
impl Reader for PrefetchReader {
    async fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, FsError> {
        if let Some(error) = self.error() {
            return Err(error);
        }
        if offset >= self.size || dest.is_empty() {
            return Ok(0);
        }

        let block_size: u64 = self.options.block_size as u64;

        // A break in the access pattern discards pending speculation; the
        // superseded fetch finishes on its own and its result is dropped.
        let sequential: bool = {
            let mut state = self.state.lock().unwrap();
            let sequential: bool = offset == state.last_end;
            if !sequential {
                state.generation += 1;
            }
            sequential
        };

        let mut cursor: u64 = offset;
        let end: u64 = (offset + dest.len() as u64).min(self.size);
        let mut served: usize = 0;
        let mut last_block: u64 = offset / block_size;

        'spans: while cursor < end {
            let block: u64 = cursor / block_size;
            let block_offset: usize = (cursor - block * block_size) as usize;
            let span_len: usize = ((end - cursor) as usize)
                .min(self.options.block_size - block_offset);
            last_block = block;

            loop {
                let cached: Option<Arc<Vec<u8>>> = {
                    let mut state = self.state.lock().unwrap();
                    if let Some(error) = state.error.clone() {
                        return Err(error);
                    }
                    match state.blocks.get(&block).cloned() {
                        Some(data) => {
                            state.touch(block);
                            Some(data)
                        }
                        None => None,
                    }
                };

                if let Some(data) = cached {
                    if block_offset >= data.len() {
                        // true block length recorded at EOF
                        break 'spans;
                    }
                    let take: usize = span_len.min(data.len() - block_offset);
                    dest[served..served + take]
                        .copy_from_slice(&data[block_offset..block_offset + take]);
                    served += take;
                    cursor += take as u64;
                    if take < span_len {
                        break 'spans;
                    }
                    break;
                }

                let in_flight: bool = {
                    let state = self.state.lock().unwrap();
                    state.in_flight.contains(&block)
                };
                if in_flight {
                    self.wait_for_block(block).await;
                    continue;
                }

                if sequential {
                    // cache-through: pull the whole block, then serve from it
                    let data: Arc<Vec<u8>> = self.fetch_block_inline(block).await?;
                    if block_offset >= data.len() {
                        break 'spans;
                    }
                    let take: usize = span_len.min(data.len() - block_offset);
                    dest[served..served + take]
                        .copy_from_slice(&data[block_offset..block_offset + take]);
                    served += take;
                    cursor += take as u64;
                    if take < span_len {
                        break 'spans;
                    }
                    break;
                }

                // random access: span-exact backend read, no caching
                let count: usize = self
                    .inner
                    .read_at(&mut dest[served..served + span_len], cursor)
                    .await
                    .map_err(|error| {
                        self.state.lock().unwrap().record_error(error.clone());
                        error
                    })?;
                served += count;
                cursor += count as u64;
                if count < span_len {
                    break 'spans;
                }
                break;
            }
        }

        self.state.lock().unwrap().last_end = cursor;

        if sequential && served > 0 {
            self.schedule_speculation(last_block + 1);
        }

        Ok(served)
    }

    fn error(&self) -> Option<FsError> {
        self.state.lock().unwrap().error.clone()
    }

    async fn release(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if state.released {
                return;
            }
            state.released = true;
            state.generation += 1;
        }

        // closing the channel lets the worker drain and exit; joining it
        // waits for any in-flight fetch to finish
        let _ = self.fetch_tx.lock().unwrap().take();
        let worker: Option<JoinHandle<()>> = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        self.notify.notify_waiters();
    }
}

/// Worker loop executing speculative block fetches.
async fn fetch_worker(
    mut rx: mpsc::Receiver<FetchRequest>,
    inner: Arc<SyncReader>,
    state: Arc<Mutex<ReaderState>>,
    notify: Arc<Notify>,
    options: PrefetchOptions,
    size: u64,
) {
    while let Some(request) = rx.recv().await {
        let skip: bool = {
            let state = state.lock().unwrap();
            state.released || request.generation != state.generation
        };

        let result: Option<Result<Vec<u8>, FsError>> = if skip {
            None
        } else {
            Some(fetch_block(&inner, request.block, options.block_size, size).await)
        };

        {
            let mut state = state.lock().unwrap();
            state.in_flight.remove(&request.block);
            if state.speculative == Some(request.block) {
                state.speculative = None;
            }
            match result {
                Some(Ok(data)) => {
                    // a stale generation means the pattern moved on; the
                    // fetched data is dropped
                    if !state.released && request.generation == state.generation {
                        state.insert(request.block, Arc::new(data), options.cache_blocks);
                    }
                }
                Some(Err(error)) => {
                    if !state.released {
                        tracing::warn!(block = request.block, %error, "read-ahead fetch failed");
                        state.record_error(error);
                    }
                }
                None => {}
            }
        }
        notify.notify_waiters();
    }
}

/// Read one whole block through the sync reader.
async fn fetch_block(
    inner: &SyncReader,
    block: u64,
    block_size: usize,
    size: u64,
) -> Result<Vec<u8>, FsError> {
    let offset: u64 = block * block_size as u64;
    if offset >= size {
        return Ok(Vec::new());
    }
    let want: usize = block_size.min((size - offset) as usize);
    let mut buffer: Vec<u8> = vec![0u8; want];
    let mut filled: usize = 0;

    while filled < want {
        let count: usize = inner.read_at(&mut buffer[filled..], offset + filled as u64).await?;
        if count == 0 {
            break;
        }
        filled += count;
    }

    buffer.truncate(filled);
    Ok(buffer)
}
