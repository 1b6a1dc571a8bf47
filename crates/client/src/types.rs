//! Entry, access-control and open-mode types shared with the filesystem.

use std::fmt;
use std::time::SystemTime;

/// Kind of a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A data object.
    File,
    /// A collection.
    Dir,
}

/// A remote entry as reported by the data grid.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Stable entry id assigned by the grid.
    pub id: u64,
    /// File or directory.
    pub kind: EntryKind,
    /// Entry name (last path component).
    pub name: String,
    /// Absolute remote path.
    pub path: String,
    /// Owner user name.
    pub owner: String,
    /// Size in bytes (0 for directories).
    pub size: i64,
    /// Creation time.
    pub create_time: SystemTime,
    /// Last modification time.
    pub modify_time: SystemTime,
    /// Data object checksum, when the grid recorded one.
    pub checksum: Option<String>,
}

impl Entry {
    /// Check whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

// ============================================================================
// Access levels
// ============================================================================

/// Access level granted to one user on one entry.
///
/// Wire names follow the grid's catalog: `own`, `modify object`,
/// `read object`, and empty for no access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// No access.
    None,
    /// Read access.
    Read,
    /// Write access.
    Modify,
    /// Full ownership.
    Own,
}

impl AccessLevel {
    /// Parse a catalog access-level name.
    ///
    /// # Arguments
    /// * `name` - Wire name as reported by the grid
    pub fn from_wire(name: &str) -> Self {
        match name {
            "own" => Self::Own,
            "modify object" => Self::Modify,
            "read object" => Self::Read,
            _ => Self::None,
        }
    }

    /// The catalog wire name for this level.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Modify => "modify object",
            Self::Read => "read object",
            Self::None => "",
        }
    }
}

/// One access grant on an entry.
#[derive(Debug, Clone)]
pub struct Access {
    /// User the grant applies to.
    pub user_name: String,
    /// Granted level.
    pub level: AccessLevel,
}

/// One extended attribute on an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XattrEntry {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub value: Vec<u8>,
}

// ============================================================================
// Open modes
// ============================================================================

/// Mode a remote object is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read only (`r`).
    ReadOnly,
    /// Read and write (`r+`).
    ReadWrite,
    /// Write only (`w`).
    WriteOnly,
    /// Write only, truncating existing content (`w+`).
    WriteTruncate,
    /// Write only, appending to existing content (`a`).
    Append,
}

impl OpenMode {
    /// Translate POSIX open flags into an open mode.
    ///
    /// # Arguments
    /// * `flags` - Flags as passed to `open(2)`
    pub fn from_posix_flags(flags: i32) -> Self {
        let access: i32 = flags & libc::O_ACCMODE;
        if access == libc::O_WRONLY {
            if flags & libc::O_APPEND != 0 {
                Self::Append
            } else if flags & libc::O_TRUNC != 0 {
                Self::WriteTruncate
            } else {
                Self::WriteOnly
            }
        } else if access == libc::O_RDWR {
            Self::ReadWrite
        } else {
            Self::ReadOnly
        }
    }

    /// Check whether reads are allowed in this mode.
    pub fn is_read(&self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Check whether writes are allowed in this mode.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::ReadOnly)
    }

    /// Check whether this mode is read-only.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }

    /// Check whether this mode is write-only (no reads).
    pub fn is_write_only(&self) -> bool {
        matches!(self, Self::WriteOnly | Self::WriteTruncate | Self::Append)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text: &str = match self {
            Self::ReadOnly => "r",
            Self::ReadWrite => "r+",
            Self::WriteOnly => "w",
            Self::WriteTruncate => "w+",
            Self::Append => "a",
        };
        write!(f, "{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_level_wire_round_trip() {
        for level in [
            AccessLevel::Own,
            AccessLevel::Modify,
            AccessLevel::Read,
            AccessLevel::None,
        ] {
            assert_eq!(AccessLevel::from_wire(level.as_wire()), level);
        }
        assert_eq!(AccessLevel::from_wire("something else"), AccessLevel::None);
    }

    #[test]
    fn test_access_level_ordering() {
        assert!(AccessLevel::Own > AccessLevel::Modify);
        assert!(AccessLevel::Modify > AccessLevel::Read);
        assert!(AccessLevel::Read > AccessLevel::None);
    }

    #[test]
    fn test_open_mode_from_posix_flags() {
        assert_eq!(OpenMode::from_posix_flags(libc::O_RDONLY), OpenMode::ReadOnly);
        assert_eq!(OpenMode::from_posix_flags(libc::O_RDWR), OpenMode::ReadWrite);
        assert_eq!(OpenMode::from_posix_flags(libc::O_WRONLY), OpenMode::WriteOnly);
        assert_eq!(
            OpenMode::from_posix_flags(libc::O_WRONLY | libc::O_APPEND),
            OpenMode::Append
        );
        assert_eq!(
            OpenMode::from_posix_flags(libc::O_WRONLY | libc::O_TRUNC),
            OpenMode::WriteTruncate
        );
        // append wins over truncate, matching the flag translation order
        assert_eq!(
            OpenMode::from_posix_flags(libc::O_WRONLY | libc::O_APPEND | libc::O_TRUNC),
            OpenMode::Append
        );
    }

    #[test]
    fn test_open_mode_predicates() {
        assert!(OpenMode::ReadOnly.is_read());
        assert!(!OpenMode::ReadOnly.is_write());
        assert!(OpenMode::ReadWrite.is_read());
        assert!(OpenMode::ReadWrite.is_write());
        assert!(OpenMode::Append.is_write_only());
        assert!(OpenMode::WriteTruncate.is_write_only());
        assert!(!OpenMode::ReadWrite.is_write_only());
    }
}
