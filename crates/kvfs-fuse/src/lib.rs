//! FUSE adapter for kvfs.
//!
//! Mounts a [`KvFs`](kvfs_core::KvFs) as a native filesystem. The kernel
//! addresses entries by inode number while `kvfs-core` works on paths;
//! [`InodeTable`] translates between the two and [`KvFuse`] forwards each
//! request to the matching core operation.
//!
//! # Usage
//!
//! ```ignore
//! use kvfs_core::{FsOptions, KvFs, SqliteStore};
//! use kvfs_fuse::{mount, MountConfig};
//!
//! let fs = KvFs::new(SqliteStore::open("store.db")?, FsOptions::default())?;
//! mount(fs, Path::new("/mnt/kvfs"), MountConfig::default())?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod inode;

pub use backend::{is_available, mount, mount_options, spawn, FuseMountHandle};
pub use config::MountConfig;
pub use error::{FuseError, FuseResult, ToErrno};
pub use filesystem::KvFuse;
pub use inode::{InodeEntry, InodeTable, ROOT_INODE};
