//! Error handling and mapping for the FUSE adapter.
//!
//! Filesystem errors from `kvfs-core` carry no errno; this module maps them,
//! and the adapter's own failures, to the POSIX codes FUSE returns to the
//! kernel.

use kvfs_core::{FormatError, FsError, StoreError};
use std::ffi::OsString;
use std::io;
use thiserror::Error;

/// Adapter-level errors.
#[derive(Debug, Error)]
pub enum FuseError {
    /// Filesystem operation error.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// The kernel referenced an inode number the table does not know.
    #[error("Invalid inode: {0}")]
    InvalidInode(u64),

    /// A name that is not valid UTF-8.
    #[error("Invalid file name: {0:?}")]
    InvalidName(OsString),

    /// A negative file offset.
    #[error("Invalid offset: {0}")]
    InvalidOffset(i64),

    /// Operation not supported.
    #[error("Operation not supported")]
    NotSupported,
}

impl FuseError {
    /// Converts this error to a libc error code for FUSE.
    pub fn to_errno(&self) -> i32 {
        match self {
            FuseError::Fs(e) => fs_error_to_errno(e),
            FuseError::InvalidInode(_) => libc::ENOENT,
            FuseError::InvalidName(_) | FuseError::InvalidOffset(_) => libc::EINVAL,
            FuseError::NotSupported => libc::ENOTSUP,
        }
    }
}

/// Converts a filesystem error to a libc error code.
///
/// Corrupt records and backend failures both surface as `EIO`, including a
/// record that a directory entry refers to but the store no longer holds.
pub fn fs_error_to_errno(e: &FsError) -> i32 {
    match e {
        FsError::NotFound { .. } => libc::ENOENT,
        FsError::NameTooLong { .. } => libc::ENAMETOOLONG,
        FsError::FileTooLarge { .. } => libc::EFBIG,
        FsError::DirectoryNotEmpty { .. } => libc::ENOTEMPTY,
        FsError::DirectoryFull { .. } => libc::ENOSPC,
        FsError::AlreadyExists { .. } => libc::EEXIST,
        FsError::NotADirectory { .. } => libc::ENOTDIR,
        FsError::IsADirectory { .. } => libc::EISDIR,
        FsError::InvalidPath { .. } => libc::EINVAL,
        FsError::Format(FormatError::SizeMismatch { .. } | FormatError::InvalidName { .. }) => {
            libc::EIO
        }
        FsError::Store(e) => store_error_to_errno(e),
    }
}

/// Converts a store error to a libc error code.
pub fn store_error_to_errno(e: &StoreError) -> i32 {
    match e {
        StoreError::NotFound { .. } | StoreError::Io { .. } => libc::EIO,
    }
}

/// Converts an I/O error to a libc error code, `EIO` when it carries none.
pub fn io_error_to_errno(e: &io::Error) -> i32 {
    e.raw_os_error().unwrap_or(libc::EIO)
}

/// Result type for FUSE operations.
pub type FuseResult<T> = Result<T, FuseError>;

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for FsError {
    fn to_errno(&self) -> i32 {
        fs_error_to_errno(self)
    }
}

impl ToErrno for FuseError {
    fn to_errno(&self) -> i32 {
        FuseError::to_errno(self)
    }
}

impl ToErrno for io::Error {
    fn to_errno(&self) -> i32 {
        io_error_to_errno(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvfs_core::codec::RecordKind;
    use kvfs_core::Id;

    #[test]
    fn test_fs_error_mapping() {
        let path = || "/x".to_string();
        let cases = [
            (FsError::NotFound { path: path() }, libc::ENOENT),
            (FsError::NameTooLong { len: 300, max: 255 }, libc::ENAMETOOLONG),
            (
                FsError::FileTooLarge {
                    requested: 1,
                    max: 0,
                },
                libc::EFBIG,
            ),
            (FsError::DirectoryNotEmpty { path: path() }, libc::ENOTEMPTY),
            (FsError::DirectoryFull { path: path() }, libc::ENOSPC),
            (FsError::AlreadyExists { path: path() }, libc::EEXIST),
            (FsError::NotADirectory { path: path() }, libc::ENOTDIR),
            (FsError::IsADirectory { path: path() }, libc::EISDIR),
            (FsError::InvalidPath { path: path() }, libc::EINVAL),
        ];
        for (error, errno) in cases {
            assert_eq!(error.to_errno(), errno, "{error}");
        }
    }

    #[test]
    fn test_corruption_and_store_failures_are_eio() {
        let format = FsError::Format(FormatError::SizeMismatch {
            kind: RecordKind::Inode,
            expected: 76,
            actual: 3,
        });
        assert_eq!(format.to_errno(), libc::EIO);

        let dangling = FsError::Store(StoreError::NotFound { id: Id::generate() });
        assert_eq!(dangling.to_errno(), libc::EIO);

        let io = FsError::Store(StoreError::from(io::Error::other("disk gone")));
        assert_eq!(io.to_errno(), libc::EIO);
    }

    #[test]
    fn test_fuse_error_variants() {
        assert_eq!(FuseError::InvalidInode(9).to_errno(), libc::ENOENT);
        assert_eq!(
            FuseError::InvalidName(OsString::from("x")).to_errno(),
            libc::EINVAL
        );
        assert_eq!(FuseError::InvalidOffset(-1).to_errno(), libc::EINVAL);
        assert_eq!(FuseError::NotSupported.to_errno(), libc::ENOTSUP);
        assert_eq!(
            FuseError::from(FsError::IsADirectory {
                path: "/d".to_string()
            })
            .to_errno(),
            libc::EISDIR
        );
    }

    #[test]
    fn test_io_error_mapping() {
        let e = io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(io_error_to_errno(&e), libc::EACCES);
        assert_eq!(io_error_to_errno(&io::Error::other("custom")), libc::EIO);
    }
}
