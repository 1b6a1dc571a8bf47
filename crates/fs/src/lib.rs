//! FUSE filesystem core.
//!
//! Projects remote data-grid objects into the local POSIX namespace.
//!
//! # Architecture
//!
//! ```text
//! kernel FUSE requests
//!   └── fuse::IrodsFuse (dispatcher, errno boundary)
//!        ├── vpath::VPathManager     mount-relative path overlay
//!        ├── inode::InodeTable       stable inode numbering
//!        ├── handle::FileHandle      per-open pipelines + locks
//!        ├── handle_map::FileHandleMap  live-handle registry
//!        └── context::FsContext      shared services + termination
//! ```

pub mod acl;
pub mod attr;
pub mod context;
pub mod dir;
pub mod file;
pub mod fuse;
pub mod handle;
pub mod handle_map;
pub mod inode;
pub mod lock;
pub mod vpath;

pub use context::{FsContext, ResolvedNode};
pub use dir::DirEntryOut;
pub use fuse::{mount, spawn_mount, IrodsFuse};
pub use handle::FileHandle;
pub use handle_map::FileHandleMap;
pub use inode::InodeTable;
pub use lock::{LockRecord, LockType, LocalLockTable};
pub use vpath::{VPathEntry, VPathEntryKind, VPathError, VPathManager};
