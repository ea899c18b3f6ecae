//! A filesystem stored in a flat key-value store.
//!
//! Every directory, file and block of file content is a fixed-size record
//! keyed by a 128-bit [`Id`]. The layers, bottom-up:
//!
//! - [`store`]: the [`KvStore`] contract, in-memory and SQLite backends, and
//!   the [`RecordStore`] adapter that size-checks fetches and keeps the root
//!   inode cached.
//! - [`codec`]: byte layouts of every record kind.
//! - [`block`]: direct and single-indirect block addressing of file content.
//! - [`dir`]: directory tables and path resolution.
//! - [`fs`]: the path-based operation set ([`KvFs`]).
//!
//! ```no_run
//! use kvfs_core::{FsOptions, KvFs, MemoryStore};
//!
//! let fs = KvFs::new(MemoryStore::new(), FsOptions::default())?;
//! fs.mkdir("/docs", 0o755, 0, 0)?;
//! fs.create("/docs/hello.txt", 0o644, 0, 0)?;
//! fs.write("/docs/hello.txt", b"hello", 0)?;
//! assert_eq!(fs.read("/docs/hello.txt", 0, 64)?, b"hello");
//! # Ok::<(), kvfs_core::FsError>(())
//! ```

pub mod block;
pub mod codec;
pub mod config;
pub mod dir;
pub mod error;
pub mod fs;
pub mod id;
pub mod layout;
pub mod store;

pub use codec::{FileKind, Inode};
pub use config::FsOptions;
pub use error::{FormatError, FsError, FsResult, StoreError};
pub use fs::{DirEntry, FileAttributes, KvFs};
pub use id::Id;
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use store::{KvStore, MemoryStore, RecordStore};
