//! Host-local advisory byte-range locks.
//!
//! Each open file handle owns one lock table; locks never leave the host.
//! Records are unordered and conflict checks are a linear scan, which is
//! fine at the handful of locks POSIX applications actually take.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use irods_fuse_common::FsError;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Kind of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockType {
    /// Shared read lock.
    Read,
    /// Exclusive write lock.
    Write,
    /// Unlock request.
    Unlock,
}

impl LockType {
    /// Translate a POSIX lock type constant.
    ///
    /// # Arguments
    /// * `typ` - `F_RDLCK`, `F_WRLCK` or `F_UNLCK`
    pub fn from_posix(typ: i32) -> Option<Self> {
        match typ {
            libc::F_RDLCK => Some(Self::Read),
            libc::F_WRLCK => Some(Self::Write),
            libc::F_UNLCK => Some(Self::Unlock),
            _ => None,
        }
    }

    /// The POSIX constant for this lock type.
    pub fn to_posix(self) -> i32 {
        match self {
            Self::Read => libc::F_RDLCK,
            Self::Write => libc::F_WRLCK,
            Self::Unlock => libc::F_UNLCK,
        }
    }
}

/// One advisory lock record.
#[derive(Debug, Clone)]
pub struct LockRecord {
    /// Record id, unique within the process.
    pub id: u64,
    /// Lock kind (never `Unlock` once stored).
    pub lock_type: LockType,
    /// Requesting process id.
    pub pid: u32,
    /// First byte of the range (inclusive).
    pub start: u64,
    /// Last byte of the range (inclusive).
    pub end: u64,
}

impl LockRecord {
    /// Create a record with a fresh process-wide id.
    ///
    /// # Arguments
    /// * `lock_type` - Lock kind
    /// * `pid` - Requesting process id
    /// * `start` - First byte (inclusive)
    /// * `end` - Last byte (inclusive)
    pub fn new(lock_type: LockType, pid: u32, start: u64, end: u64) -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            lock_type,
            pid,
            start,
            end,
        }
    }

    fn intersects(&self, start: u64, end: u64) -> bool {
        self.start <= end && start <= self.end
    }
}

/// Per-handle advisory lock table.
pub struct LocalLockTable {
    records: Mutex<Vec<LockRecord>>,
}

impl LocalLockTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Find the first record intersecting a range.
    ///
    /// Returns `None` when no record conflicts; callers synthesize an
    /// unlock reply for that case.
    ///
    /// # Arguments
    /// * `start` - First byte (inclusive)
    /// * `end` - Last byte (inclusive)
    pub fn get(&self, start: u64, end: u64) -> Option<LockRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r: &&LockRecord| r.intersects(start, end))
            .cloned()
    }

    /// Apply a lock request.
    ///
    /// # Arguments
    /// * `record` - The request; `Unlock` removes intersecting records
    ///
    /// # Errors
    /// `NoSuchLock` when an unlock matches nothing; `WouldBlock` when a
    /// read/write request conflicts with an existing record.
    pub fn set(&self, record: LockRecord) -> Result<(), FsError> {
        let mut records = self.records.lock().unwrap();

        if record.lock_type == LockType::Unlock {
            let before: usize = records.len();
            records.retain(|r: &LockRecord| !r.intersects(record.start, record.end));
            if records.len() == before {
                return Err(FsError::NoSuchLock {
                    start: record.start,
                    end: record.end,
                });
            }
            return Ok(());
        }

        let conflict: bool = records.iter().any(|r: &LockRecord| {
            r.intersects(record.start, record.end)
                && !(r.lock_type == LockType::Read && record.lock_type == LockType::Read)
        });
        if conflict {
            return Err(FsError::WouldBlock {
                start: record.start,
                end: record.end,
            });
        }

        records.push(record);
        Ok(())
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Check whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LocalLockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let table: LocalLockTable = LocalLockTable::new();
        table
            .set(LockRecord::new(LockType::Write, 100, 0, 99))
            .unwrap();

        let found: LockRecord = table.get(50, 150).unwrap();
        assert_eq!(found.lock_type, LockType::Write);
        assert!(table.get(100, 200).is_none());
    }

    #[test]
    fn test_overlapping_write_locks_conflict() {
        let table: LocalLockTable = LocalLockTable::new();
        table
            .set(LockRecord::new(LockType::Write, 100, 0, 100))
            .unwrap();

        let second: Result<(), FsError> =
            table.set(LockRecord::new(LockType::Write, 100, 50, 150));
        assert!(matches!(second, Err(FsError::WouldBlock { .. })));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_shared_read_locks_coexist() {
        let table: LocalLockTable = LocalLockTable::new();
        table.set(LockRecord::new(LockType::Read, 1, 0, 100)).unwrap();
        table.set(LockRecord::new(LockType::Read, 2, 50, 150)).unwrap();
        assert_eq!(table.len(), 2);

        // a write over the shared range still conflicts
        assert!(table
            .set(LockRecord::new(LockType::Write, 3, 60, 70))
            .is_err());
    }

    #[test]
    fn test_unlock_removes_intersecting() {
        let table: LocalLockTable = LocalLockTable::new();
        table.set(LockRecord::new(LockType::Write, 1, 0, 49)).unwrap();
        table.set(LockRecord::new(LockType::Write, 1, 50, 99)).unwrap();

        table
            .set(LockRecord::new(LockType::Unlock, 1, 25, 75))
            .unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_unlock_without_match_fails() {
        let table: LocalLockTable = LocalLockTable::new();
        let result: Result<(), FsError> =
            table.set(LockRecord::new(LockType::Unlock, 1, 0, 10));
        assert!(matches!(result, Err(FsError::NoSuchLock { .. })));
    }

    #[test]
    fn test_record_ids_are_distinct() {
        let a: LockRecord = LockRecord::new(LockType::Read, 1, 0, 1);
        let b: LockRecord = LockRecord::new(LockType::Read, 1, 0, 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_posix_round_trip() {
        for lock_type in [LockType::Read, LockType::Write, LockType::Unlock] {
            assert_eq!(LockType::from_posix(lock_type.to_posix()), Some(lock_type));
        }
        assert_eq!(LockType::from_posix(9999), None);
    }
}
