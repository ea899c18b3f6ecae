//! Directory tables and path resolution.
//!
//! A directory's entries live in a fixed-capacity [`DirectoryBlock`]; an empty
//! name marks a free slot. Paths are resolved by walking directory blocks from
//! the cached root.

use tracing::trace;

use crate::codec::{DirSlot, DirectoryBlock, Inode};
use crate::error::{FsError, FsResult};
use crate::id::Id;
use crate::layout::{MAX_NAME_LEN, MAX_PATH_LEN};
use crate::store::{KvStore, RecordStore};

impl DirectoryBlock {
    /// Returns the child id of the first occupied slot named `name`.
    pub fn find(&self, name: &str) -> Option<Id> {
        if name.is_empty() {
            return None;
        }
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.child_id)
    }

    /// Records `name → child_id` in the first free slot.
    ///
    /// Returns the slot index, or `None` when every slot is taken. Callers
    /// check for duplicates first.
    pub fn insert(&mut self, name: &str, child_id: Id) -> Option<usize> {
        debug_assert!(!name.is_empty() && name.len() <= MAX_NAME_LEN);
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_free())?;
        slot.name = name.to_owned();
        slot.child_id = child_id;
        Some(index)
    }

    /// Tombstones the slot named `name`, returning the detached child id.
    pub fn remove(&mut self, name: &str) -> Option<Id> {
        if name.is_empty() {
            return None;
        }
        let slot = self.slots.iter_mut().find(|slot| slot.name == name)?;
        let child_id = slot.child_id;
        *slot = DirSlot::default();
        Some(child_id)
    }

    /// Occupied slots in slot order.
    pub fn occupied(&self) -> impl Iterator<Item = &DirSlot> {
        self.slots.iter().filter(|slot| !slot.is_free())
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied().count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied().next().is_none()
    }
}

/// Splits a path into its non-empty segments.
///
/// Leading, trailing and repeated separators are ignored, so `"//a/b/"`
/// yields `["a", "b"]` and `"/"` yields nothing.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Rejects paths longer than [`MAX_PATH_LEN`] bytes. A path of exactly the
/// limit is accepted; no terminator byte is reserved.
pub fn check_path(path: &str) -> FsResult<()> {
    if path.len() > MAX_PATH_LEN {
        return Err(FsError::NameTooLong {
            len: path.len(),
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Rejects names that do not fit a directory slot.
pub fn check_name(name: &str) -> FsResult<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(FsError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Walks directory records from the root inode.
pub struct PathResolver<'a, S> {
    records: &'a RecordStore<S>,
}

impl<'a, S: KvStore> PathResolver<'a, S> {
    pub fn new(records: &'a RecordStore<S>) -> Self {
        Self { records }
    }

    /// Resolves `path` to its inode.
    ///
    /// `"/"` (or any path with no segments) returns the cached root without
    /// touching the store. Each segment fetches the current directory's block
    /// and then the matching child's inode.
    pub fn resolve(&self, path: &str) -> FsResult<Inode> {
        check_path(path)?;
        let mut current = self.root(path)?;
        for segment in split_path(path) {
            current = self.child(&current, segment, path)?;
        }
        Ok(current)
    }

    /// Resolves everything but the last segment.
    ///
    /// Returns the parent directory inode and the final name. Fails with
    /// [`FsError::InvalidPath`] for paths with no segments or ending in `.`
    /// or `..`, and
    /// [`FsError::NameTooLong`] when the final name does not fit a slot.
    pub fn resolve_parent(&self, path: &str) -> FsResult<(Inode, String)> {
        check_path(path)?;
        let segments: Vec<&str> = split_path(path).collect();
        let Some((name, prefix)) = segments.split_last() else {
            return Err(FsError::InvalidPath {
                path: path.to_owned(),
            });
        };
        check_name(name)?;
        if matches!(*name, "." | "..") {
            return Err(FsError::InvalidPath {
                path: path.to_owned(),
            });
        }

        let mut parent = self.root(path)?;
        for segment in prefix {
            parent = self.child(&parent, segment, path)?;
        }
        if !parent.is_dir() {
            return Err(FsError::NotADirectory {
                path: path.to_owned(),
            });
        }
        Ok((parent, (*name).to_owned()))
    }

    /// Loads the directory block of a directory inode.
    pub fn directory(&self, dir: &Inode, path: &str) -> FsResult<DirectoryBlock> {
        if !dir.is_dir() {
            return Err(FsError::NotADirectory {
                path: path.to_owned(),
            });
        }
        self.records.load(&dir.data_id)
    }

    fn root(&self, path: &str) -> FsResult<Inode> {
        self.records
            .root()
            .map(|root| root.get())
            .ok_or_else(|| FsError::not_found(path))
    }

    fn child(&self, dir: &Inode, name: &str, path: &str) -> FsResult<Inode> {
        let block = self.directory(dir, path)?;
        let child_id = block.find(name).ok_or_else(|| FsError::not_found(path))?;
        trace!(name, %child_id, "resolved segment");
        self.records.load(&child_id)
    }
}
