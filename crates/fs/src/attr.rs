//! Entry to FUSE attribute translation.

use std::time::{Duration, SystemTime};

use fuser::{FileAttr, FileType};

use irods_fuse_client::{Entry, EntryKind};

/// TTL handed to the kernel for attributes and entries.
pub const ATTR_TTL: Duration = Duration::from_secs(1);

/// Convert a remote entry to FUSE file attributes.
///
/// # Arguments
/// * `entry` - The remote entry
/// * `ino` - Inode number assigned to it
/// * `mode` - POSIX permission bits (from the ACL translation)
/// * `uid` - Owner uid reported to the kernel
/// * `gid` - Owner gid reported to the kernel
pub fn entry_to_attr(entry: &Entry, ino: u64, mode: u16, uid: u32, gid: u32) -> FileAttr {
    let kind: FileType = match entry.kind {
        EntryKind::File => FileType::RegularFile,
        EntryKind::Dir => FileType::Directory,
    };
    let size: u64 = entry.size.max(0) as u64;

    FileAttr {
        ino,
        size,
        blocks: size.div_ceil(512),
        atime: entry.modify_time,
        mtime: entry.modify_time,
        ctime: entry.modify_time,
        crtime: entry.create_time,
        kind,
        perm: mode,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Synthesize attributes for a virtual directory.
///
/// # Arguments
/// * `ino` - Inode number assigned to it
/// * `uid` - Owner uid reported to the kernel
/// * `gid` - Owner gid reported to the kernel
/// * `mount_time` - Timestamp reported for all times
pub fn virtual_dir_attr(ino: u64, uid: u32, gid: u32, mount_time: SystemTime) -> FileAttr {
    FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: mount_time,
        mtime: mount_time,
        ctime: mount_time,
        crtime: mount_time,
        kind: FileType::Directory,
        perm: 0o555,
        nlink: 2,
        uid,
        gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn entry(kind: EntryKind, size: i64) -> Entry {
        Entry {
            id: 99,
            kind,
            name: "x".to_string(),
            path: "/zone/x".to_string(),
            owner: "rods".to_string(),
            size,
            create_time: UNIX_EPOCH,
            modify_time: UNIX_EPOCH + Duration::from_secs(10),
            checksum: None,
        }
    }

    #[test]
    fn test_file_attr_translation() {
        let attr: FileAttr = entry_to_attr(&entry(EntryKind::File, 1025), 7, 0o600, 10, 20);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.size, 1025);
        assert_eq!(attr.blocks, 3);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o600);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.uid, 10);
        assert_eq!(attr.gid, 20);
    }

    #[test]
    fn test_dir_attr_translation() {
        let attr: FileAttr = entry_to_attr(&entry(EntryKind::Dir, 0), 8, 0o755, 0, 0);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn test_virtual_dir_attr() {
        let now: SystemTime = SystemTime::now();
        let attr: FileAttr = virtual_dir_attr(5, 1, 2, now);
        assert_eq!(attr.perm, 0o555);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.mtime, now);
    }
}
