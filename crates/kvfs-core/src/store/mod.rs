//! Key-value backends and the record adapter on top of them.
//!
//! - [`KvStore`] is the contract every backend implements: `get` and `put`
//!   keyed by [`Id`].
//! - [`MemoryStore`] keeps records in a `DashMap` (tests, benches, scratch
//!   mounts).
//! - [`SqliteStore`] persists records in a single SQLite table.
//! - [`RecordStore`] adds the size check on fetch, typed load/save of
//!   [`Record`]s, and keeps the [`RootCache`] in step with writes.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::codec::{check_size, Inode, Record, RecordKind};
use crate::error::{FsResult, StoreError};
use crate::id::Id;

/// A flat key-value substrate keyed by fixed-size identifiers.
///
/// Implementations must be safe to share between threads; they provide no
/// transactions and no ordering guarantees beyond a single call.
pub trait KvStore: Send + Sync {
    /// Returns the bytes stored under `key`, or `None` if absent.
    fn get(&self, key: &Id) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn put(&self, key: &Id, value: &[u8]) -> Result<(), StoreError>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &Id) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &Id, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}

impl<T: KvStore + ?Sized> KvStore for Box<T> {
    fn get(&self, key: &Id) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn put(&self, key: &Id, value: &[u8]) -> Result<(), StoreError> {
        (**self).put(key, value)
    }
}

/// In-memory mirror of the root inode.
///
/// Every path resolution starts here, so the root is never fetched during an
/// operation. [`RecordStore::store`] replaces the cached value whole whenever
/// the root's key is written.
#[derive(Debug)]
pub struct RootCache {
    id: Id,
    inode: RwLock<Inode>,
}

impl RootCache {
    pub fn new(inode: Inode) -> Self {
        Self {
            id: inode.self_id,
            inode: RwLock::new(inode),
        }
    }

    /// Identifier of the root inode.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns a copy of the cached root inode.
    pub fn get(&self) -> Inode {
        self.inode.read().clone()
    }

    fn replace(&self, inode: Inode) {
        *self.inode.write() = inode;
    }
}

/// Record-level adapter over a [`KvStore`].
pub struct RecordStore<S> {
    backend: S,
    root: OnceLock<RootCache>,
}

impl<S: KvStore> RecordStore<S> {
    /// Wraps a backend. The root cache is attached later with
    /// [`attach_root`](Self::attach_root), once the root is known.
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            root: OnceLock::new(),
        }
    }

    /// Installs the root cache. Only the first call has any effect; later
    /// calls return `false`.
    pub fn attach_root(&self, inode: Inode) -> bool {
        let id = inode.self_id;
        if self.root.set(RootCache::new(inode)).is_err() {
            warn!(root = %id, "Root cache already attached, ignoring");
            return false;
        }
        debug!(root = %id, "Root cache attached");
        true
    }

    /// Returns the root cache, if attached.
    pub fn root(&self) -> Option<&RootCache> {
        self.root.get()
    }

    /// Borrows the underlying backend.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Unwraps the backend.
    pub fn into_backend(self) -> S {
        self.backend
    }

    /// Fetches raw bytes, requiring exactly the size of `kind`.
    ///
    /// Fails with [`StoreError::NotFound`] if nothing is stored under `id`
    /// and with a size mismatch if the stored length is wrong.
    pub fn fetch(&self, id: &Id, kind: RecordKind) -> FsResult<Vec<u8>> {
        trace!(%id, %kind, "fetch");
        let bytes = self
            .backend
            .get(id)?
            .ok_or(StoreError::NotFound { id: *id })?;
        check_size(kind, bytes.len())?;
        Ok(bytes)
    }

    /// Stores raw bytes, refreshing the root cache if `id` is the root.
    pub fn store(&self, id: &Id, bytes: &[u8]) -> FsResult<()> {
        trace!(%id, len = bytes.len(), "store");
        self.backend.put(id, bytes)?;
        if let Some(root) = self.root.get()
            && root.id() == *id
        {
            root.replace(Inode::decode(bytes)?);
        }
        Ok(())
    }

    /// Fetches and decodes a record.
    pub fn load<R: Record>(&self, id: &Id) -> FsResult<R> {
        let bytes = self.fetch(id, R::KIND)?;
        Ok(R::decode_exact(&bytes)?)
    }

    /// Encodes and stores a record.
    pub fn save<R: Record>(&self, id: &Id, record: &R) -> FsResult<()> {
        self.store(id, &record.encode())
    }

    /// Stores an inode under its own identifier.
    pub fn save_inode(&self, inode: &Inode) -> FsResult<()> {
        self.save(&inode.self_id, inode)
    }

    /// Returns true if anything is stored under `id`.
    pub fn contains(&self, id: &Id) -> FsResult<bool> {
        Ok(self.backend.get(id)?.is_some())
    }
}
