//! FUSE dispatcher.
//!
//! Implements `fuser::Filesystem` over the shared context. Callbacks run
//! on the FUSE loop thread; each one checks the termination flag, takes
//! an operation id, and drives the async core through the runtime handle,
//! mirroring the structure the kernel expects: errno out, never panics.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use fuser::{
    BackgroundSession, FileAttr, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate,
    ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyLock, ReplyOpen, ReplyStatfs,
    ReplyWrite, ReplyXattr, Request, TimeOrNow,
};
use tokio::runtime::Handle;
use tracing::{debug, info};

use irods_fuse_common::FsError;

use crate::attr::ATTR_TTL;
use crate::context::FsContext;
use crate::dir::DirEntryOut;
use crate::handle::FileHandle;
use crate::lock::{LockRecord, LockType};

/// Synthetic statfs totals: the grid does not expose quota here.
const STATFS_TOTAL_BLOCKS: u64 = 1 << 40;
const STATFS_BLOCK_SIZE: u32 = 512;
const STATFS_NAME_LEN: u32 = 1024;

/// The FUSE-facing filesystem.
pub struct IrodsFuse {
    ctx: Arc<FsContext>,
    runtime: Handle,
}

impl IrodsFuse {
    /// Create the dispatcher.
    ///
    /// # Arguments
    /// * `ctx` - The shared filesystem context
    /// * `runtime` - Handle of the runtime running the async core
    pub fn new(ctx: Arc<FsContext>, runtime: Handle) -> Self {
        Self { ctx, runtime }
    }

    /// Resolve an inode or produce the errno to reply with.
    fn path_of(&self, ino: u64) -> Result<String, i32> {
        self.ctx.inodes().resolve(ino).ok_or(libc::ENOENT)
    }

    /// Termination short-circuit; every operation calls this first.
    fn guard(&self) -> Result<u64, i32> {
        if self.ctx.is_terminated() {
            return Err(libc::ECONNABORTED);
        }
        Ok(self.ctx.next_operation_id())
    }

    fn handle_of(&self, fh: u64) -> Result<Arc<FileHandle>, i32> {
        self.ctx.handles().get(fh).ok_or(libc::EBADFD)
    }
}

impl Filesystem for IrodsFuse {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        info!(instance = %self.ctx.config().instanceid, "filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!("filesystem destroyed");
        self.ctx.terminate();
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let parent_path: String = match self.path_of(parent) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::ENOENT),
        };

        debug!(op, parent = %parent_path, name, "lookup");
        let ctx: Arc<FsContext> = self.ctx.clone();
        let result: Result<FileAttr, FsError> =
            self.runtime.block_on(ctx.lookup_path(&parent_path, name));
        match result {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        debug!(op, %path, "getattr");
        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(ctx.getattr_path(&path)) {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(error) => reply.error(error.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        debug!(op, %path, ?size, "setattr");
        let ctx: Arc<FsContext> = self.ctx.clone();
        let mode_change: bool = mode.is_some();
        let owner_change: bool = uid.is_some() || gid.is_some();
        let result: Result<FileAttr, FsError> = self
            .runtime
            .block_on(ctx.setattr_path(&path, size, mode_change, owner_change));
        match result {
            Ok(attr) => reply.attr(&ATTR_TTL, &attr),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        debug!(op, %path, offset, "readdir");
        let ctx: Arc<FsContext> = self.ctx.clone();
        let listed: Result<Vec<DirEntryOut>, FsError> =
            self.runtime.block_on(ctx.readdir_path(&path));
        let listed: Vec<DirEntryOut> = match listed {
            Ok(listed) => listed,
            Err(error) => return reply.error(error.errno()),
        };

        let mut entries: Vec<(u64, fuser::FileType, String)> = vec![
            (ino, fuser::FileType::Directory, ".".to_string()),
            (ino, fuser::FileType::Directory, "..".to_string()),
        ];
        entries.extend(
            listed
                .into_iter()
                .map(|e: DirEntryOut| (e.ino, e.kind, e.name)),
        );

        for (index, (entry_ino, kind, name)) in
            entries.iter().enumerate().skip(offset as usize)
        {
            if reply.add(*entry_ino, (index + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        info!(op, %path, flags, "open");
        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(ctx.open_path(&path, flags)) {
            Ok(handle) => reply.opened(handle.id(), 0),
            Err(FsError::BadHandle { .. }) => reply.error(libc::EISDIR),
            Err(error) => reply.error(error.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let handle: Arc<FileHandle> = match self.handle_of(fh) {
            Ok(handle) => handle,
            Err(errno) => return reply.error(errno),
        };

        debug!(path = handle.path(), offset, size, "read");
        let mut buffer: Vec<u8> = vec![0u8; size as usize];
        let result: Result<usize, FsError> =
            self.runtime.block_on(handle.read(&mut buffer, offset));
        match result {
            Ok(count) => reply.data(&buffer[..count]),
            Err(error) => reply.error(error.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let handle: Arc<FileHandle> = match self.handle_of(fh) {
            Ok(handle) => handle,
            Err(errno) => return reply.error(errno),
        };

        debug!(path = handle.path(), offset, size = data.len(), "write");
        match self.runtime.block_on(handle.write(data, offset)) {
            Ok(count) => reply.written(count as u32),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let handle: Arc<FileHandle> = match self.handle_of(fh) {
            Ok(handle) => handle,
            Err(errno) => return reply.error(errno),
        };

        debug!(path = handle.path(), "flush");
        match self.runtime.block_on(handle.flush()) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, fh: u64, _datasync: bool, reply: ReplyEmpty) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let handle: Arc<FileHandle> = match self.handle_of(fh) {
            Ok(handle) => handle,
            Err(errno) => return reply.error(errno),
        };

        debug!(path = handle.path(), "fsync");
        match self.runtime.block_on(handle.flush()) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };

        info!(op, fh, "release");
        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(async move { ctx.release_handle(fh).await }) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let parent_path: String = match self.path_of(parent) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };

        info!(op, parent = %parent_path, name, "create");
        let ctx: Arc<FsContext> = self.ctx.clone();
        let result: Result<(FileAttr, Arc<FileHandle>), FsError> =
            self.runtime.block_on(ctx.create_path(&parent_path, name, flags));
        match result {
            Ok((attr, handle)) => reply.created(&ATTR_TTL, &attr, 0, handle.id(), 0),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let parent_path: String = match self.path_of(parent) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };

        info!(op, parent = %parent_path, name, "mkdir");
        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(ctx.mkdir_path(&parent_path, name)) {
            Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let parent_path: String = match self.path_of(parent) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };

        info!(op, parent = %parent_path, name, "unlink");
        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(ctx.unlink_path(&parent_path, name)) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let parent_path: String = match self.path_of(parent) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };

        info!(op, parent = %parent_path, name, "rmdir");
        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(ctx.rmdir_path(&parent_path, name)) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let op: u64 = match self.guard() {
            Ok(op) => op,
            Err(errno) => return reply.error(errno),
        };
        let parent_path: String = match self.path_of(parent) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let new_parent_path: String = match self.path_of(newparent) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let (name, newname) = match (name.to_str(), newname.to_str()) {
            (Some(name), Some(newname)) => (name, newname),
            _ => return reply.error(libc::EINVAL),
        };

        info!(op, from = %parent_path, name, to = %new_parent_path, newname, "rename");
        let ctx: Arc<FsContext> = self.ctx.clone();
        let result: Result<(), FsError> = self
            .runtime
            .block_on(ctx.rename_path(&parent_path, name, &new_parent_path, newname));
        match result {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn setxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        _flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };

        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(ctx.setxattr_path(&path, name, value)) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn getxattr(&mut self, _req: &Request, ino: u64, name: &OsStr, size: u32, reply: ReplyXattr) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };

        let ctx: Arc<FsContext> = self.ctx.clone();
        let value: Option<Vec<u8>> =
            match self.runtime.block_on(ctx.getxattr_path(&path, name)) {
                Ok(value) => value,
                Err(error) => return reply.error(error.errno()),
            };
        let value: Vec<u8> = match value {
            Some(value) => value,
            None => return reply.error(libc::ENODATA),
        };

        if size == 0 {
            reply.size(value.len() as u32);
        } else if value.len() > size as usize {
            reply.error(libc::ERANGE);
        } else {
            reply.data(&value);
        }
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };

        let ctx: Arc<FsContext> = self.ctx.clone();
        let names: Vec<String> = match self.runtime.block_on(ctx.listxattr_path(&path)) {
            Ok(names) => names,
            Err(error) => return reply.error(error.errno()),
        };

        let mut packed: Vec<u8> = Vec::new();
        for name in names {
            packed.extend_from_slice(name.as_bytes());
            packed.push(0);
        }

        if size == 0 {
            reply.size(packed.len() as u32);
        } else if packed.len() > size as usize {
            reply.error(libc::ERANGE);
        } else {
            reply.data(&packed);
        }
    }

    fn removexattr(&mut self, _req: &Request, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let path: String = match self.path_of(ino) {
            Ok(path) => path,
            Err(errno) => return reply.error(errno),
        };
        let name: &str = match name.to_str() {
            Some(name) => name,
            None => return reply.error(libc::EINVAL),
        };

        let ctx: Arc<FsContext> = self.ctx.clone();
        match self.runtime.block_on(ctx.removexattr_path(&path, name)) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn getlk(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        start: u64,
        end: u64,
        typ: i32,
        pid: u32,
        reply: ReplyLock,
    ) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let handle: Arc<FileHandle> = match self.handle_of(fh) {
            Ok(handle) => handle,
            Err(errno) => return reply.error(errno),
        };

        debug!(path = handle.path(), start, end, typ, "getlk");
        match handle.get_local_lock(start, end) {
            Some(found) => reply.locked(found.start, found.end, found.lock_type.to_posix(), found.pid),
            // no conflict: answer with an unlock record for the range
            None => reply.locked(start, end, libc::F_UNLCK, pid),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setlk(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        start: u64,
        end: u64,
        typ: i32,
        pid: u32,
        sleep: bool,
        reply: ReplyEmpty,
    ) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        let handle: Arc<FileHandle> = match self.handle_of(fh) {
            Ok(handle) => handle,
            Err(errno) => return reply.error(errno),
        };

        if sleep {
            // blocking lock waits are not provided
            return reply.error(libc::ENOTSUP);
        }

        let lock_type: LockType = match LockType::from_posix(typ) {
            Some(lock_type) => lock_type,
            None => return reply.error(libc::EINVAL),
        };

        debug!(path = handle.path(), start, end, ?lock_type, "setlk");
        match handle.set_local_lock(LockRecord::new(lock_type, pid, start, end)) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(error.errno()),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        if let Err(errno) = self.guard() {
            return reply.error(errno);
        }
        reply.statfs(
            STATFS_TOTAL_BLOCKS,
            STATFS_TOTAL_BLOCKS,
            STATFS_TOTAL_BLOCKS,
            0,
            0,
            STATFS_BLOCK_SIZE,
            STATFS_NAME_LEN,
            STATFS_BLOCK_SIZE,
        );
    }
}

// ============================================================================
// Mounting
// ============================================================================

fn mount_option_list(ctx: &FsContext) -> Vec<MountOption> {
    let mut options: Vec<MountOption> = vec![
        MountOption::FSName("irodsfuse".to_string()),
        MountOption::AutoUnmount,
    ];
    if ctx.config().allow_other {
        options.push(MountOption::AllowOther);
    }
    for option in &ctx.config().fuse_options {
        options.push(MountOption::CUSTOM(option.clone()));
    }
    options
}

/// Mount and block until the session ends.
///
/// # Arguments
/// * `ctx` - The filesystem context
/// * `runtime` - Handle of the runtime running the async core
/// * `mountpoint` - Existing writable directory to mount at
pub fn mount(
    ctx: Arc<FsContext>,
    runtime: Handle,
    mountpoint: &Path,
) -> Result<(), std::io::Error> {
    let options: Vec<MountOption> = mount_option_list(&ctx);
    let fs: IrodsFuse = IrodsFuse::new(ctx, runtime);
    fuser::mount2(fs, mountpoint, &options)
}

/// Mount in the background, returning the session handle.
///
/// Dropping the session unmounts.
///
/// # Arguments
/// * `ctx` - The filesystem context
/// * `runtime` - Handle of the runtime running the async core
/// * `mountpoint` - Existing writable directory to mount at
pub fn spawn_mount(
    ctx: Arc<FsContext>,
    runtime: Handle,
    mountpoint: &Path,
) -> Result<BackgroundSession, std::io::Error> {
    let options: Vec<MountOption> = mount_option_list(&ctx);
    let fs: IrodsFuse = IrodsFuse::new(ctx.clone(), runtime);
    let session: BackgroundSession = fuser::spawn_mount2(fs, mountpoint, &options)?;
    info!(
        instance = %ctx.config().instanceid,
        mountpoint = %mountpoint.display(),
        "mounted"
    );
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use irods_fuse_client::MemoryObjectClient;
    use irods_fuse_common::config::PathMapping;
    use irods_fuse_common::Config;

    #[test]
    fn test_mount_option_list_reflects_config() {
        let client: Arc<MemoryObjectClient> = Arc::new(MemoryObjectClient::new());
        let config: Config = Config {
            allow_other: true,
            fuse_options: vec!["max_read=131072".to_string()],
            path_mappings: vec![PathMapping::new("/zone", "/")],
            ..Default::default()
        };
        let ctx: Arc<FsContext> = FsContext::new(config, client);

        let options: Vec<MountOption> = mount_option_list(&ctx);
        assert!(options.contains(&MountOption::AllowOther));
        assert!(options.contains(&MountOption::CUSTOM("max_read=131072".to_string())));
    }

    #[test]
    fn test_guard_reports_termination() {
        let client: Arc<MemoryObjectClient> = Arc::new(MemoryObjectClient::new());
        let config: Config = Config {
            path_mappings: vec![PathMapping::new("/zone", "/")],
            ..Default::default()
        };
        let ctx: Arc<FsContext> = FsContext::new(config, client);
        let runtime: tokio::runtime::Runtime = tokio::runtime::Runtime::new().unwrap();
        let fs: IrodsFuse = IrodsFuse::new(ctx.clone(), runtime.handle().clone());

        assert!(fs.guard().is_ok());
        ctx.terminate();
        assert_eq!(fs.guard().unwrap_err(), libc::ECONNABORTED);
    }
}
