//! Path-based filesystem operations.
//!
//! [`KvFs`] composes the [`PathResolver`] and [`BlockEngine`] into the POSIX-like
//! operation set. Every call resolves its path from the cached root, mutates
//! in-memory copies of the records it touches and writes them back before
//! returning; nothing but the root is cached between calls.
//!
//! # Write ordering
//!
//! Creation stores the new content record, then the child inode, then the
//! parent's directory block, then the parent inode. A failure part-way leaves
//! unreferenced records behind but never a directory entry pointing at a
//! missing inode.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::block::{check_extent, BlockEngine};
use crate::codec::{DirectoryBlock, FileBlockMap, FileKind, Inode, RootPointer};
use crate::config::FsOptions;
use crate::dir::PathResolver;
use crate::error::{FsError, FsResult};
use crate::id::Id;
use crate::layout::{mode, MAX_FILE_SIZE, ROOT_POINTER_ID};
use crate::store::{KvStore, RecordStore};

/// Attributes of one entry, as reported by [`KvFs::getattr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    pub id: Id,
    pub kind: FileKind,
    /// Full mode, type bits included.
    pub mode: u32,
    /// Permission bits only.
    pub perm: u32,
    pub uid: u32,
    pub gid: u32,
    /// Bytes for files, occupied entries for directories.
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub nlink: u32,
}

impl From<&Inode> for FileAttributes {
    fn from(inode: &Inode) -> Self {
        let kind = inode.kind();
        Self {
            id: inode.self_id,
            kind,
            mode: inode.mode,
            perm: inode.permissions(),
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
            nlink: match kind {
                FileKind::Directory => 2,
                FileKind::RegularFile => 1,
            },
        }
    }
}

/// One named entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attributes: FileAttributes,
}

/// Current time in whole seconds since the Unix epoch.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

/// Path of the directory containing `path`.
fn parent_path(path: &str) -> &str {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// A filesystem persisted in a [`KvStore`].
///
/// Each operation holds a per-instance lock for its whole duration, so calls
/// through one `KvFs` never interleave their read-modify-write sequences.
/// Separate processes sharing a store are not coordinated.
pub struct KvFs<S> {
    records: RecordStore<S>,
    options: FsOptions,
    op_lock: Mutex<()>,
}

impl<S: KvStore> fmt::Debug for KvFs<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvFs")
            .field("root_id", &self.root_id())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<S: KvStore> KvFs<S> {
    /// Opens the filesystem stored in `backend`, creating an empty root if the
    /// store has none yet.
    ///
    /// An existing root pointer or root inode that cannot be loaded (missing,
    /// wrong size, not a directory) is returned as an error; the filesystem is
    /// unusable without it.
    #[instrument(level = "info", skip(backend))]
    pub fn new(backend: S, options: FsOptions) -> FsResult<Self> {
        let records = RecordStore::new(backend);
        let root = if records.contains(&ROOT_POINTER_ID)? {
            Self::load_root(&records)?
        } else {
            Self::create_root(&records, &options)?
        };
        records.attach_root(root);

        Ok(Self {
            records,
            options,
            op_lock: Mutex::new(()),
        })
    }

    fn load_root(records: &RecordStore<S>) -> FsResult<Inode> {
        let pointer: RootPointer = records.load(&ROOT_POINTER_ID)?;
        let root: Inode = records.load(&pointer.root_id)?;
        if !root.is_dir() {
            return Err(FsError::NotADirectory {
                path: "/".to_owned(),
            });
        }
        info!(root = %root.self_id, entries = root.size, "Loaded existing root");
        Ok(root)
    }

    fn create_root(records: &RecordStore<S>, options: &FsOptions) -> FsResult<Inode> {
        let root = Inode::new(
            Id::generate(),
            Id::generate(),
            mode::S_IFDIR | (options.root_perm & mode::PERMISSION_MASK),
            options.uid,
            options.gid,
            now(),
        );
        records.save(&root.data_id, &DirectoryBlock::empty(root.data_id))?;
        records.save_inode(&root)?;
        records.save(
            &ROOT_POINTER_ID,
            &RootPointer {
                root_id: root.self_id,
            },
        )?;
        info!(root = %root.self_id, uid = options.uid, gid = options.gid, "Created new root");
        Ok(root)
    }

    /// Identifier of the root inode.
    pub fn root_id(&self) -> Id {
        self.records.root().map_or(Id::ZERO, |root| root.id())
    }

    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    /// The record layer, for inspection.
    pub fn records(&self) -> &RecordStore<S> {
        &self.records
    }

    /// Releases the filesystem and returns its backend.
    ///
    /// Every operation has already persisted its records; this only hands the
    /// backend back so it can be closed.
    pub fn into_backend(self) -> S {
        debug!("Filesystem closed");
        self.records.into_backend()
    }

    fn resolver(&self) -> PathResolver<'_, S> {
        PathResolver::new(&self.records)
    }

    fn engine(&self) -> BlockEngine<'_, S> {
        BlockEngine::new(&self.records)
    }

    fn resolve_file(&self, path: &str) -> FsResult<Inode> {
        let inode = self.resolver().resolve(path)?;
        if inode.is_dir() {
            return Err(FsError::IsADirectory {
                path: path.to_owned(),
            });
        }
        Ok(inode)
    }

    // ---- metadata ----

    /// Returns the attributes of the entry at `path`.
    #[instrument(level = "debug", skip(self))]
    pub fn getattr(&self, path: &str) -> FsResult<FileAttributes> {
        let _guard = self.op_lock.lock();
        let inode = self.resolver().resolve(path)?;
        Ok(FileAttributes::from(&inode))
    }

    /// Lists a directory: `"."`, `".."`, then occupied entries in slot order.
    #[instrument(level = "debug", skip(self))]
    pub fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let _guard = self.op_lock.lock();
        let resolver = self.resolver();
        let dir = resolver.resolve(path)?;
        let block = resolver.directory(&dir, path)?;

        let mut names = Vec::with_capacity(2 + block.occupied_count());
        names.push(".".to_owned());
        names.push("..".to_owned());
        names.extend(block.occupied().map(|slot| slot.name.clone()));
        Ok(names)
    }

    /// Lists a directory's occupied entries with their attributes.
    ///
    /// `"."` and `".."` are not included.
    #[instrument(level = "debug", skip(self))]
    pub fn list(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let _guard = self.op_lock.lock();
        let resolver = self.resolver();
        let dir = resolver.resolve(path)?;
        let block = resolver.directory(&dir, path)?;

        block
            .occupied()
            .map(|slot| {
                let child: Inode = self.records.load(&slot.child_id)?;
                Ok(DirEntry {
                    name: slot.name.clone(),
                    attributes: FileAttributes::from(&child),
                })
            })
            .collect()
    }

    /// Checks that `path` exists. No permission checks are made.
    #[instrument(level = "debug", skip(self))]
    pub fn open(&self, path: &str) -> FsResult<FileAttributes> {
        self.getattr(path)
    }

    /// Replaces the permission bits, keeping the file type.
    #[instrument(level = "debug", skip(self))]
    pub fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let _guard = self.op_lock.lock();
        let mut inode = self.resolver().resolve(path)?;
        inode.mode = (inode.mode & mode::S_IFMT) | (mode & mode::PERMISSION_MASK);
        inode.ctime = now();
        self.records.save_inode(&inode)
    }

    /// Changes owner and/or group; `None` leaves the value unchanged.
    #[instrument(level = "debug", skip(self))]
    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>) -> FsResult<()> {
        let _guard = self.op_lock.lock();
        let mut inode = self.resolver().resolve(path)?;
        if let Some(uid) = uid {
            inode.uid = uid;
        }
        if let Some(gid) = gid {
            inode.gid = gid;
        }
        inode.ctime = now();
        self.records.save_inode(&inode)
    }

    /// Sets access and/or modification time; `None` leaves the value unchanged.
    #[instrument(level = "debug", skip(self))]
    pub fn utime(&self, path: &str, atime: Option<i64>, mtime: Option<i64>) -> FsResult<()> {
        let _guard = self.op_lock.lock();
        let mut inode = self.resolver().resolve(path)?;
        if let Some(atime) = atime {
            inode.atime = atime;
        }
        if let Some(mtime) = mtime {
            inode.mtime = mtime;
        }
        inode.ctime = now();
        self.records.save_inode(&inode)
    }

    /// No-op; every write is already persisted.
    pub fn flush(&self, _path: &str) -> FsResult<()> {
        Ok(())
    }

    /// No-op; no per-open state is kept.
    pub fn release(&self, _path: &str) -> FsResult<()> {
        Ok(())
    }

    // ---- namespace ----

    /// Creates an empty regular file. Type bits in `mode` are ignored.
    #[instrument(level = "debug", skip(self))]
    pub fn create(&self, path: &str, mode: u32, uid: u32, gid: u32) -> FsResult<FileAttributes> {
        self.create_entry(path, mode::S_IFREG | (mode & mode::PERMISSION_MASK), uid, gid)
    }

    /// Creates an empty directory. Type bits in `mode` are ignored.
    #[instrument(level = "debug", skip(self))]
    pub fn mkdir(&self, path: &str, mode: u32, uid: u32, gid: u32) -> FsResult<FileAttributes> {
        self.create_entry(path, mode::S_IFDIR | (mode & mode::PERMISSION_MASK), uid, gid)
    }

    fn create_entry(&self, path: &str, mode: u32, uid: u32, gid: u32) -> FsResult<FileAttributes> {
        let _guard = self.op_lock.lock();
        let resolver = self.resolver();
        let (mut parent, name) = resolver.resolve_parent(path)?;
        let mut block = resolver.directory(&parent, path)?;

        if block.find(&name).is_some() {
            return Err(FsError::AlreadyExists {
                path: path.to_owned(),
            });
        }

        let now = now();
        let inode = Inode::new(Id::generate(), Id::generate(), mode, uid, gid, now);
        if block.insert(&name, inode.self_id).is_none() {
            warn!(parent = parent_path(path), "Directory is full");
            return Err(FsError::DirectoryFull {
                path: parent_path(path).to_owned(),
            });
        }

        match inode.kind() {
            FileKind::Directory => self
                .records
                .save(&inode.data_id, &DirectoryBlock::empty(inode.data_id))?,
            FileKind::RegularFile => self.records.save(&inode.data_id, &FileBlockMap::default())?,
        }
        self.records.save_inode(&inode)?;
        self.records.save(&parent.data_id, &block)?;

        parent.size = block.occupied_count() as u64;
        parent.mtime = now;
        parent.ctime = now;
        self.records.save_inode(&parent)?;

        debug!(id = %inode.self_id, kind = ?inode.kind(), "Entry created");
        Ok(FileAttributes::from(&inode))
    }

    /// Removes a file's directory entry. Its records stay in the store.
    #[instrument(level = "debug", skip(self))]
    pub fn unlink(&self, path: &str) -> FsResult<()> {
        let _guard = self.op_lock.lock();
        let resolver = self.resolver();
        let (parent, name) = resolver.resolve_parent(path)?;
        let block = resolver.directory(&parent, path)?;

        let child_id = block.find(&name).ok_or_else(|| FsError::not_found(path))?;
        let child: Inode = self.records.load(&child_id)?;
        if child.is_dir() {
            return Err(FsError::IsADirectory {
                path: path.to_owned(),
            });
        }
        self.detach(parent, block, &name)
    }

    /// Removes an empty directory's entry. Its records stay in the store.
    #[instrument(level = "debug", skip(self))]
    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        let _guard = self.op_lock.lock();
        let resolver = self.resolver();
        let target = resolver.resolve(path)?;
        if !target.is_dir() {
            return Err(FsError::NotADirectory {
                path: path.to_owned(),
            });
        }
        if !resolver.directory(&target, path)?.is_empty() {
            return Err(FsError::DirectoryNotEmpty {
                path: path.to_owned(),
            });
        }

        let (parent, name) = resolver.resolve_parent(path)?;
        let block = resolver.directory(&parent, path)?;
        self.detach(parent, block, &name)
    }

    fn detach(&self, mut parent: Inode, mut block: DirectoryBlock, name: &str) -> FsResult<()> {
        let child_id = block
            .remove(name)
            .ok_or_else(|| FsError::not_found(name))?;
        self.records.save(&parent.data_id, &block)?;

        let now = now();
        parent.size = block.occupied_count() as u64;
        parent.mtime = now;
        parent.ctime = now;
        self.records.save_inode(&parent)?;

        debug!(%child_id, "Entry detached");
        Ok(())
    }

    // ---- content ----

    /// Reads up to `size` bytes at `offset`, short at end of file.
    #[instrument(level = "debug", skip(self))]
    pub fn read(&self, path: &str, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let _guard = self.op_lock.lock();
        let inode = self.resolve_file(path)?;
        if offset >= inode.size {
            return Ok(Vec::new());
        }

        let end = offset.saturating_add(size as u64).min(inode.size);
        #[allow(clippy::cast_possible_truncation)]
        let len = (end - offset) as usize;
        let map: FileBlockMap = self.records.load(&inode.data_id)?;
        self.engine().read(&map, offset, len)
    }

    /// Writes `data` at `offset`, extending the file if needed.
    ///
    /// Writing past the end of file leaves a gap that reads as zeros.
    #[instrument(level = "debug", skip(self, data), fields(len = data.len()))]
    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        check_extent(offset, data.len() as u64)?;
        let _guard = self.op_lock.lock();
        let mut inode = self.resolve_file(path)?;
        if data.is_empty() {
            return Ok(0);
        }

        let mut map: FileBlockMap = self.records.load(&inode.data_id)?;
        let engine = self.engine();
        if offset > inode.size {
            engine.zero_range(&map, inode.size, offset)?;
        }
        let written = engine.write(&inode.data_id, &mut map, data, offset)?;

        let now = now();
        inode.size = inode.size.max(offset + written as u64);
        inode.mtime = now;
        inode.ctime = now;
        self.records.save_inode(&inode)?;
        Ok(written)
    }

    /// Sets the file length.
    ///
    /// Shrinking only records the new size. Growing writes zeros over the new
    /// range through the normal write path.
    #[instrument(level = "debug", skip(self))]
    pub fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        if size > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge {
                requested: size,
                max: MAX_FILE_SIZE,
            });
        }
        let _guard = self.op_lock.lock();
        let mut inode = self.resolve_file(path)?;

        if size > inode.size {
            let mut map: FileBlockMap = self.records.load(&inode.data_id)?;
            #[allow(clippy::cast_possible_truncation)]
            let zeros = vec![0u8; (size - inode.size) as usize];
            self.engine()
                .write(&inode.data_id, &mut map, &zeros, inode.size)?;
        }

        let now = now();
        inode.size = size;
        inode.mtime = now;
        inode.ctime = now;
        self.records.save_inode(&inode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fresh() -> KvFs<MemoryStore> {
        KvFs::new(MemoryStore::new(), FsOptions::with_owner(1000, 1000)).unwrap()
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/a/b"), "/a");
        assert_eq!(parent_path("/a/b/"), "/a");
        assert_eq!(parent_path("a"), "/");
    }

    #[test]
    fn test_fresh_root() {
        let fs = fresh();
        let attrs = fs.getattr("/").unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert_eq!(attrs.perm, 0o775);
        assert_eq!(attrs.uid, 1000);
        assert_eq!(attrs.size, 0);
        assert_eq!(attrs.id, fs.root_id());
        assert_eq!(fs.readdir("/").unwrap(), vec![".", ".."]);
    }

    #[test]
    fn test_create_bumps_parent() {
        let fs = fresh();
        fs.create("/a", 0o644, 1, 2).unwrap();
        fs.mkdir("/d", 0o755, 1, 2).unwrap();

        let root = fs.getattr("/").unwrap();
        assert_eq!(root.size, 2);
        assert_eq!(fs.records().root().unwrap().get().size, 2);

        let file = fs.getattr("/a").unwrap();
        assert_eq!(file.kind, FileKind::RegularFile);
        assert_eq!(file.mode, mode::S_IFREG | 0o644);
        assert_eq!((file.uid, file.gid), (1, 2));
    }

    #[test]
    fn test_create_existing_fails() {
        let fs = fresh();
        fs.create("/a", 0o644, 0, 0).unwrap();
        assert!(matches!(
            fs.create("/a", 0o644, 0, 0),
            Err(FsError::AlreadyExists { .. })
        ));
        assert!(matches!(
            fs.mkdir("/a", 0o755, 0, 0),
            Err(FsError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_chmod_keeps_type() {
        let fs = fresh();
        fs.mkdir("/d", 0o755, 0, 0).unwrap();
        fs.chmod("/d", 0o100_700).unwrap();
        let attrs = fs.getattr("/d").unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert_eq!(attrs.perm, 0o700);
    }

    #[test]
    fn test_chown_and_utime_partial() {
        let fs = fresh();
        fs.create("/f", 0o644, 1, 1).unwrap();
        fs.chown("/f", Some(5), None).unwrap();
        fs.utime("/f", Some(10), None).unwrap();
        fs.utime("/f", None, Some(20)).unwrap();

        let attrs = fs.getattr("/f").unwrap();
        assert_eq!((attrs.uid, attrs.gid), (5, 1));
        assert_eq!((attrs.atime, attrs.mtime), (10, 20));
    }

    #[test]
    fn test_content_ops_reject_directories() {
        let fs = fresh();
        fs.mkdir("/d", 0o755, 0, 0).unwrap();
        assert!(matches!(fs.read("/d", 0, 1), Err(FsError::IsADirectory { .. })));
        assert!(matches!(fs.write("/d", b"x", 0), Err(FsError::IsADirectory { .. })));
        assert!(matches!(fs.truncate("/d", 1), Err(FsError::IsADirectory { .. })));
        assert!(matches!(fs.unlink("/d"), Err(FsError::IsADirectory { .. })));
    }

    #[test]
    fn test_rmdir_on_file_is_not_a_directory() {
        let fs = fresh();
        fs.create("/f", 0o644, 0, 0).unwrap();
        assert!(matches!(fs.rmdir("/f"), Err(FsError::NotADirectory { .. })));
    }

    #[test]
    fn test_write_past_eof_hides_truncated_bytes() {
        let fs = fresh();
        fs.create("/f", 0o644, 0, 0).unwrap();
        fs.write("/f", b"abcdef", 0).unwrap();
        fs.truncate("/f", 2).unwrap();
        fs.write("/f", b"Z", 5).unwrap();

        assert_eq!(fs.read("/f", 0, 100).unwrap(), b"ab\0\0\0Z");
    }

    #[test]
    fn test_empty_write_does_not_extend() {
        let fs = fresh();
        fs.create("/f", 0o644, 0, 0).unwrap();
        assert_eq!(fs.write("/f", b"", 100).unwrap(), 0);
        assert_eq!(fs.getattr("/f").unwrap().size, 0);
    }

    #[test]
    fn test_debug_shows_root() {
        let fs = fresh();
        let text = format!("{fs:?}");
        assert!(text.starts_with("KvFs"));
        assert!(text.contains(&fs.root_id().to_string()));
    }

    #[test]
    fn test_list_reports_attributes() {
        let fs = fresh();
        fs.mkdir("/d", 0o755, 0, 0).unwrap();
        fs.create("/d/f", 0o644, 0, 0).unwrap();
        fs.write("/d/f", b"xyz", 0).unwrap();

        let entries = fs.list("/d").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "f");
        assert_eq!(entries[0].attributes.size, 3);
    }
}
