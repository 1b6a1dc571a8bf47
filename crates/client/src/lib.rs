//! Remote object client interface for the iRODS FUSE filesystem.
//!
//! The wire protocol to the data grid is an external concern: this crate
//! defines the contract the filesystem consumes (`ObjectClient` and
//! `ObjectHandle`), the entry and access-control types it is expressed in,
//! and the layers the filesystem stacks on top of any driver:
//!
//! ```text
//! Filesystem core
//!   └── StatCache           (metadata TTL cache)
//!        └── PooledClient   (connection cap + per-operation timeout)
//!             └── dyn ObjectClient   (protocol driver)
//! ```
//!
//! A complete in-memory driver (`MemoryObjectClient`) backs every test and
//! local development mounts; native protocol drivers plug in behind the
//! same trait.

pub mod client;
pub mod memory;
pub mod pool;
pub mod stat_cache;
pub mod types;

pub use client::{ObjectClient, ObjectHandle};
pub use memory::MemoryObjectClient;
pub use pool::PooledClient;
pub use stat_cache::StatCache;
pub use types::{Access, AccessLevel, Entry, EntryKind, OpenMode, XattrEntry};
