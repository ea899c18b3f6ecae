//! FUSE filesystem implementation over [`KvFs`].
//!
//! Implements the fuser `Filesystem` trait by translating inode numbers to
//! paths through the [`InodeTable`] and delegating to the path-based
//! operations of `kvfs-core`.
//!
//! | Operation | Delegates to |
//! |-----------|--------------|
//! | lookup | `getattr` on the child path |
//! | getattr | `getattr` |
//! | setattr | `chmod`, `chown`, `truncate`, `utime`, then `getattr` |
//! | readdir | `list` |
//! | open/flush/release | `open`, `flush`, `release` |
//! | read/write | `read`, `write` |
//! | create/mkdir | `create`, `mkdir` |
//! | unlink/rmdir | `unlink`, `rmdir` |
//!
//! Every request runs to completion on the session thread. Replies carry no
//! file handle; handles are always 0.

use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult};
use crate::inode::{child_path, parent_path, InodeTable, ROOT_INODE};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use kvfs_core::layout::BLOCK_SIZE;
use kvfs_core::{FileAttributes, FileKind, KvFs, KvStore};
use libc::c_int;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace};

/// Converts epoch seconds to a `SystemTime`.
fn to_system_time(secs: i64) -> SystemTime {
    let magnitude = Duration::from_secs(secs.unsigned_abs());
    if secs >= 0 {
        UNIX_EPOCH + magnitude
    } else {
        UNIX_EPOCH - magnitude
    }
}

/// Converts a `setattr` time to epoch seconds.
fn to_epoch_secs(time: TimeOrNow) -> i64 {
    match time {
        TimeOrNow::SpecificTime(t) => match t.duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            Err(e) => i64::try_from(e.duration().as_secs()).map_or(i64::MIN, |s| -s),
        },
        TimeOrNow::Now => kvfs_core::fs::now(),
    }
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
    }
}

/// One row of a `readdir` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirListingEntry {
    ino: u64,
    file_type: FileType,
    name: String,
}

/// FUSE filesystem backed by a [`KvFs`].
pub struct KvFuse<S> {
    fs: KvFs<S>,
    inodes: InodeTable,
    config: MountConfig,
}

impl<S: KvStore> KvFuse<S> {
    pub fn new(fs: KvFs<S>, config: MountConfig) -> Self {
        Self {
            fs,
            inodes: InodeTable::new(),
            config,
        }
    }

    pub fn fs(&self) -> &KvFs<S> {
        &self.fs
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Releases the adapter, returning the filesystem.
    pub fn into_inner(self) -> KvFs<S> {
        self.fs
    }

    fn path_of(&self, ino: u64) -> FuseResult<String> {
        self.inodes.path(ino).ok_or(FuseError::InvalidInode(ino))
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> FuseResult<String> {
        let name = name
            .to_str()
            .ok_or_else(|| FuseError::InvalidName(name.to_os_string()))?;
        Ok(child_path(&self.path_of(parent)?, name))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn make_attr(&self, ino: u64, attrs: &FileAttributes) -> FileAttr {
        FileAttr {
            ino,
            size: attrs.size,
            blocks: attrs.size.div_ceil(512),
            atime: to_system_time(attrs.atime),
            mtime: to_system_time(attrs.mtime),
            ctime: to_system_time(attrs.ctime),
            crtime: to_system_time(attrs.ctime),
            kind: file_type(attrs.kind),
            perm: attrs.perm as u16,
            nlink: attrs.nlink,
            uid: attrs.uid,
            gid: attrs.gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }

    /// Resolves `name` under `parent`, registering the child's inode with an
    /// incremented lookup count.
    fn lookup_child(&self, parent: u64, name: &OsStr) -> FuseResult<FileAttr> {
        let path = self.child_of(parent, name)?;
        let attrs = self.fs.getattr(&path)?;
        let ino = self.inodes.get_or_insert(&path, attrs.kind);
        Ok(self.make_attr(ino, &attrs))
    }

    fn attr_for(&self, ino: u64) -> FuseResult<FileAttr> {
        let attrs = self.fs.getattr(&self.path_of(ino)?)?;
        Ok(self.make_attr(ino, &attrs))
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_setattr(
        &self,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> FuseResult<FileAttr> {
        let path = self.path_of(ino)?;
        if let Some(mode) = mode {
            self.fs.chmod(&path, mode)?;
        }
        if uid.is_some() || gid.is_some() {
            self.fs.chown(&path, uid, gid)?;
        }
        if let Some(size) = size {
            self.fs.truncate(&path, size)?;
        }
        if atime.is_some() || mtime.is_some() {
            self.fs
                .utime(&path, atime.map(to_epoch_secs), mtime.map(to_epoch_secs))?;
        }
        self.attr_for(ino)
    }

    /// Builds the full listing of a directory, `.` and `..` first.
    fn list_directory(&self, ino: u64) -> FuseResult<Vec<DirListingEntry>> {
        let path = self.path_of(ino)?;
        let children = self.fs.list(&path)?;

        let parent_ino = if ino == ROOT_INODE {
            ROOT_INODE
        } else {
            self.inodes
                .get_inode(parent_path(&path))
                .unwrap_or(ROOT_INODE)
        };

        let mut entries = Vec::with_capacity(children.len() + 2);
        entries.push(DirListingEntry {
            ino,
            file_type: FileType::Directory,
            name: ".".to_string(),
        });
        entries.push(DirListingEntry {
            ino: parent_ino,
            file_type: FileType::Directory,
            name: "..".to_string(),
        });
        for child in children {
            let kind = child.attributes.kind;
            let child_ino = self
                .inodes
                .get_or_insert_no_lookup_inc(&child_path(&path, &child.name), kind);
            entries.push(DirListingEntry {
                ino: child_ino,
                file_type: file_type(kind),
                name: child.name,
            });
        }
        Ok(entries)
    }

    fn read_at(&self, ino: u64, offset: i64, size: u32) -> FuseResult<Vec<u8>> {
        let offset = u64::try_from(offset).map_err(|_| FuseError::InvalidOffset(offset))?;
        Ok(self.fs.read(&self.path_of(ino)?, offset, size as usize)?)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_at(&self, ino: u64, offset: i64, data: &[u8]) -> FuseResult<u32> {
        let offset = u64::try_from(offset).map_err(|_| FuseError::InvalidOffset(offset))?;
        let written = self.fs.write(&self.path_of(ino)?, data, offset)?;
        Ok(written as u32)
    }

    fn make_entry(
        &self,
        parent: u64,
        name: &OsStr,
        kind: FileKind,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FuseResult<FileAttr> {
        let path = self.child_of(parent, name)?;
        let attrs = match kind {
            FileKind::Directory => self.fs.mkdir(&path, mode, uid, gid)?,
            FileKind::RegularFile => self.fs.create(&path, mode, uid, gid)?,
        };
        let ino = self.inodes.get_or_insert(&path, kind);
        Ok(self.make_attr(ino, &attrs))
    }

    fn remove_entry(&self, parent: u64, name: &OsStr, kind: FileKind) -> FuseResult<()> {
        let path = self.child_of(parent, name)?;
        match kind {
            FileKind::Directory => self.fs.rmdir(&path)?,
            FileKind::RegularFile => self.fs.unlink(&path)?,
        }
        self.inodes.invalidate_path(&path);
        Ok(())
    }
}

impl<S: KvStore + 'static> Filesystem for KvFuse<S> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!(root = %self.fs.root_id(), "FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        info!(inodes = self.inodes.len(), "FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        trace!(parent, ?name, "lookup");
        match self.lookup_child(parent, name) {
            Ok(attr) => reply.entry(&self.config.attr_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        match self.attr_for(ino) {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(inode = ino, ?mode, ?uid, ?gid, ?size, "setattr");
        match self.apply_setattr(ino, mode, uid, gid, size, atime, mtime) {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "open");
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.open(&path).map_err(FuseError::from));
        match result {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, offset, size, "read");
        match self.read_at(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(inode = ino, offset, len = data.len(), "write");
        match self.write_at(ino, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.flush(&path).map_err(FuseError::from));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // The entry may already be unlinked; its inode stays known until forget.
        let result = self
            .path_of(ino)
            .and_then(|path| self.fs.release(&path).map_err(FuseError::from));
        match result {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, offset, "readdir");
        let entries = match self.list_directory(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            #[allow(clippy::cast_possible_wrap)]
            let next = (i + 1) as i64;
            if reply.add(entry.ino, next, entry.file_type, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!(parent, ?name, mode, "create");
        match self.make_entry(
            parent,
            name,
            FileKind::RegularFile,
            mode & !umask,
            req.uid(),
            req.gid(),
        ) {
            Ok(attr) => reply.created(&self.config.attr_ttl, &attr, 0, 0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        debug!(parent, ?name, mode, "mkdir");
        match self.make_entry(
            parent,
            name,
            FileKind::Directory,
            mode & !umask,
            req.uid(),
            req.gid(),
        ) {
            Ok(attr) => reply.entry(&self.config.attr_ttl, &attr, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(parent, ?name, "unlink");
        match self.remove_entry(parent, name, FileKind::RegularFile) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(parent, ?name, "rmdir");
        match self.remove_entry(parent, name, FileKind::Directory) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }
}
