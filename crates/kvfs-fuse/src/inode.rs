//! Inode management for the FUSE adapter.
//!
//! `kvfs-core` addresses entries by path; the kernel addresses them by inode
//! number. [`InodeTable`] maps between the two and tracks the kernel's
//! `nlookup` reference count so entries are evicted only after `forget`.

use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use kvfs_core::FileKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// Path of the root directory.
pub const ROOT_PATH: &str = "/";

/// Joins a directory path and an entry name.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Path of the directory containing `path`; the root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => ROOT_PATH,
        Some((parent, _)) => parent,
    }
}

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    /// Absolute path within the filesystem.
    pub path: String,
    pub kind: FileKind,
    /// Lookup count for `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    /// Creates a new inode entry with nlookup = 1.
    pub fn new(path: String, kind: FileKind) -> Self {
        Self {
            path,
            kind,
            nlookup: AtomicU64::new(1),
        }
    }

    /// Creates a new inode entry with nlookup = 0, for `readdir` results.
    pub fn new_no_lookup(path: String, kind: FileKind) -> Self {
        Self {
            path,
            kind,
            nlookup: AtomicU64::new(0),
        }
    }

    /// Increments the lookup count and returns the new value.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lookup count and returns the new value, or `None` if it
    /// would go negative.
    pub fn dec_nlookup(&self, count: u64) -> Option<u64> {
        let old = self.nlookup.fetch_sub(count, Ordering::AcqRel);
        if old < count {
            self.nlookup.fetch_add(count, Ordering::Relaxed);
            None
        } else {
            Some(old - count)
        }
    }

    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }
}

/// Thread-safe bidirectional map between inode numbers and paths.
pub struct InodeTable {
    path_to_ino: DashMap<String, u64>,
    entries: DashMap<u64, InodeEntry>,
    next_ino: AtomicU64,
}

impl InodeTable {
    /// Creates a table with the root directory pre-allocated.
    pub fn new() -> Self {
        let table = Self {
            path_to_ino: DashMap::new(),
            entries: DashMap::new(),
            next_ino: AtomicU64::new(ROOT_INODE + 1),
        };
        table.path_to_ino.insert(ROOT_PATH.to_owned(), ROOT_INODE);
        table.entries.insert(
            ROOT_INODE,
            InodeEntry::new(ROOT_PATH.to_owned(), FileKind::Directory),
        );
        table
    }

    /// Returns the inode for `path`, allocating one if needed, and increments
    /// its lookup count.
    pub fn get_or_insert(&self, path: &str, kind: FileKind) -> u64 {
        let (ino, inserted) = self.insert_with(path, || InodeEntry::new(path.to_owned(), kind));
        if !inserted && let Some(entry) = self.entries.get(&ino) {
            entry.inc_nlookup();
        }
        ino
    }

    /// Returns the inode for `path`, allocating one if needed, without
    /// touching the lookup count.
    ///
    /// `readdir` results must not affect nlookup; only replies carrying an
    /// entry (`lookup`, `create`, `mkdir`) do.
    pub fn get_or_insert_no_lookup_inc(&self, path: &str, kind: FileKind) -> u64 {
        if let Some(ino) = self.get_inode(path) {
            return ino;
        }
        self.insert_with(path, || InodeEntry::new_no_lookup(path.to_owned(), kind))
            .0
    }

    /// Maps `path` to a fresh inode unless it already has one. The flag is
    /// true if this call allocated.
    fn insert_with(&self, path: &str, make_entry: impl FnOnce() -> InodeEntry) -> (u64, bool) {
        let mut inserted = false;
        let ino = *self
            .path_to_ino
            .entry(path.to_owned())
            .or_insert_with(|| {
                inserted = true;
                let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
                self.entries.insert(ino, make_entry());
                ino
            });
        (ino, inserted)
    }

    /// Looks up an entry by inode number.
    pub fn get(&self, ino: u64) -> Option<Ref<'_, u64, InodeEntry>> {
        self.entries.get(&ino)
    }

    /// Returns a copy of the path for `ino`.
    pub fn path(&self, ino: u64) -> Option<String> {
        self.entries.get(&ino).map(|entry| entry.path.clone())
    }

    /// Looks up an inode by path.
    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_ino.get(path).map(|r| *r)
    }

    /// Decrements the lookup count. Evicts the entry when it reaches zero and
    /// returns `true` if it did. The root is never evicted.
    pub fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == ROOT_INODE {
            return false;
        }
        if let Some(entry) = self.entries.get(&ino)
            && entry.dec_nlookup(nlookup) == Some(0)
        {
            drop(entry);
            return self.evict(ino);
        }
        false
    }

    fn evict(&self, ino: u64) -> bool {
        match self.entries.remove(&ino) {
            Some((_, entry)) => {
                self.path_to_ino.remove_if(&entry.path, |_, mapped| *mapped == ino);
                true
            }
            None => false,
        }
    }

    /// Drops the path mapping after the entry is removed from its directory.
    ///
    /// The inode entry itself stays until the kernel forgets it, since the
    /// kernel may still pass the number in later requests.
    pub fn invalidate_path(&self, path: &str) {
        if path != ROOT_PATH {
            self.path_to_ino.remove(path);
        }
    }

    /// Number of inodes in the table, root included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table only contains the root inode.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_path_helpers() {
        assert_eq!(child_path("/", "a"), "/a");
        assert_eq!(child_path("/a", "b"), "/a/b");
        assert_eq!(parent_path("/a/b"), "/a");
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/"), "/");
    }

    #[test]
    fn test_root_inode_exists() {
        let table = InodeTable::new();
        let entry = table.get(ROOT_INODE).unwrap();
        assert_eq!(entry.path, "/");
        assert_eq!(entry.kind, FileKind::Directory);
        assert!(table.is_empty());
    }

    #[test]
    fn test_allocate_inode() {
        let table = InodeTable::new();
        let ino = table.get_or_insert("/docs", FileKind::Directory);
        assert!(ino > ROOT_INODE);
        assert_eq!(table.get_or_insert("/docs", FileKind::Directory), ino);
        assert_eq!(table.get(ino).unwrap().nlookup(), 2);
        assert_eq!(table.path(ino).as_deref(), Some("/docs"));
    }

    #[test]
    fn test_forget_evicts() {
        let table = InodeTable::new();
        let ino = table.get_or_insert("/tmp.txt", FileKind::RegularFile);

        assert!(table.forget(ino, 1));
        assert!(table.get(ino).is_none());
        assert!(table.get_inode("/tmp.txt").is_none());
    }

    #[test]
    fn test_forget_root_never_evicts() {
        let table = InodeTable::new();
        assert!(!table.forget(ROOT_INODE, 100));
        assert!(table.get(ROOT_INODE).is_some());
    }

    #[test]
    fn test_forget_over_count_is_ignored() {
        let table = InodeTable::new();
        let ino = table.get_or_insert("/f", FileKind::RegularFile);
        assert!(!table.forget(ino, 5));
        assert_eq!(table.get(ino).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_no_lookup_inc() {
        let table = InodeTable::new();
        let ino = table.get_or_insert_no_lookup_inc("/f", FileKind::RegularFile);
        assert_eq!(table.get(ino).unwrap().nlookup(), 0);

        assert_eq!(table.get_or_insert("/f", FileKind::RegularFile), ino);
        assert_eq!(table.get(ino).unwrap().nlookup(), 1);
    }

    #[test]
    fn test_invalidate_keeps_entry_until_forget() {
        let table = InodeTable::new();
        let old = table.get_or_insert("/f", FileKind::RegularFile);
        table.invalidate_path("/f");

        assert!(table.get_inode("/f").is_none());
        assert!(table.get(old).is_some());

        // Re-created path gets a fresh inode; forgetting the old one leaves it.
        let new = table.get_or_insert("/f", FileKind::RegularFile);
        assert_ne!(old, new);
        assert!(table.forget(old, 1));
        assert_eq!(table.get_inode("/f"), Some(new));
    }

    #[test]
    fn test_concurrent_allocation() {
        let table = Arc::new(InodeTable::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| table.get_or_insert(&format!("/f{i}"), FileKind::RegularFile))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for other in &results[1..] {
            assert_eq!(other, &results[0]);
        }
        assert_eq!(table.len(), 51);
        assert_eq!(table.get(results[0][0]).unwrap().nlookup(), 8);
    }
}
