//! The core error type shared by every irods-fuse crate.
//!
//! Each variant corresponds to one stable condition the filesystem can
//! surface, and maps to exactly one POSIX errno at the FUSE boundary.
//! Pipeline errors are sticky: once a reader or writer records one, every
//! later operation on the same handle returns it until release.

use thiserror::Error;

/// Errors surfaced by filesystem operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// Path or entry does not exist.
    #[error("not found: {path}")]
    NotFound { path: String },

    /// Operation is not permitted for the requesting user.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Write attempted through a read-only mapping.
    #[error("read-only filesystem: {path}")]
    ReadOnlyFs { path: String },

    /// Handle is missing, already released, or opened in the wrong mode.
    #[error("bad file handle: {message}")]
    BadHandle { message: String },

    /// Negative or otherwise invalid offset.
    #[error("bad offset: {offset}")]
    BadOffset { offset: i64 },

    /// A conflicting byte-range lock exists.
    #[error("lock conflict in range [{start}, {end}]")]
    WouldBlock { start: u64, end: u64 },

    /// Unlock request matched no existing lock record.
    #[error("no lock found in range [{start}, {end}]")]
    NoSuchLock { start: u64, end: u64 },

    /// A backend call or pool acquisition exceeded the operation timeout.
    #[error("operation timed out: {operation}")]
    Timeout { operation: String },

    /// The remote zone is unreachable or returned a transport-level failure.
    #[error("remote unavailable: {message}")]
    RemoteUnavailable { message: String },

    /// Operation is recognized but intentionally unimplemented.
    #[error("not supported: {operation}")]
    NotSupported { operation: String },

    /// The filesystem is shutting down; no new work is accepted.
    #[error("filesystem terminated")]
    Aborted,

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl FsError {
    /// Create a `NotFound` error for a path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a `PermissionDenied` error for a path.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied { path: path.into() }
    }

    /// Create a `ReadOnlyFs` error for a path.
    pub fn read_only(path: impl Into<String>) -> Self {
        Self::ReadOnlyFs { path: path.into() }
    }

    /// Create a `BadHandle` error with a description.
    pub fn bad_handle(message: impl Into<String>) -> Self {
        Self::BadHandle {
            message: message.into(),
        }
    }

    /// Create a `Timeout` error naming the operation that expired.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a `RemoteUnavailable` error with a description.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            message: message.into(),
        }
    }

    /// Create a `NotSupported` error naming the operation.
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Create an `Internal` error with a description.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check whether this error means the entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The POSIX errno returned for this error at the FUSE boundary.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound { .. } => libc::ENOENT,
            Self::PermissionDenied { .. } => libc::EACCES,
            Self::ReadOnlyFs { .. } => libc::EROFS,
            Self::BadHandle { .. } => libc::EBADFD,
            Self::BadOffset { .. } => libc::EINVAL,
            Self::WouldBlock { .. } => libc::EAGAIN,
            Self::NoSuchLock { .. } => libc::ENOLCK,
            Self::Timeout { .. } => libc::ETIMEDOUT,
            Self::RemoteUnavailable { .. } => libc::EIO,
            Self::NotSupported { .. } => libc::ENOTSUP,
            Self::Aborted => libc::ECONNABORTED,
            Self::Internal { .. } => libc::EIO,
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: err.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: err.to_string(),
            },
            std::io::ErrorKind::TimedOut => Self::Timeout {
                operation: err.to_string(),
            },
            _ => Self::RemoteUnavailable {
                message: err.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping_is_stable() {
        assert_eq!(FsError::not_found("/a").errno(), libc::ENOENT);
        assert_eq!(FsError::permission_denied("/a").errno(), libc::EACCES);
        assert_eq!(FsError::read_only("/a").errno(), libc::EROFS);
        assert_eq!(FsError::bad_handle("gone").errno(), libc::EBADFD);
        assert_eq!(FsError::BadOffset { offset: -1 }.errno(), libc::EINVAL);
        assert_eq!(FsError::WouldBlock { start: 0, end: 1 }.errno(), libc::EAGAIN);
        assert_eq!(FsError::NoSuchLock { start: 0, end: 1 }.errno(), libc::ENOLCK);
        assert_eq!(FsError::timeout("stat").errno(), libc::ETIMEDOUT);
        assert_eq!(FsError::remote("down").errno(), libc::EIO);
        assert_eq!(FsError::not_supported("setlkw").errno(), libc::ENOTSUP);
        assert_eq!(FsError::Aborted.errno(), libc::ECONNABORTED);
        assert_eq!(FsError::internal("bug").errno(), libc::EIO);
    }

    #[test]
    fn test_io_error_conversion() {
        let err: FsError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert!(err.is_not_found());

        let err: FsError =
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(matches!(err, FsError::RemoteUnavailable { .. }));
    }
}
