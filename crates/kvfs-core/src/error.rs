//! Error types for the storage engine.
//!
//! Three layers, innermost first:
//! - [`StoreError`] for backend failures and missing keys,
//! - [`FormatError`] for records whose bytes do not decode,
//! - [`FsError`] for everything a filesystem operation can report.

use std::io;

use thiserror::Error;

use crate::codec::RecordKind;
use crate::id::Id;

/// Failures of the key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record is stored under the key.
    #[error("No record stored under {id}")]
    NotFound { id: Id },

    /// The backend failed to read or write.
    #[error("Store I/O failed: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StoreError {
    /// Creates an I/O error with an underlying cause.
    pub fn io(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Io {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if the error reports a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<io::Error> for StoreError {
    fn from(source: io::Error) -> Self {
        StoreError::io("backend I/O", source)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(source: rusqlite::Error) -> Self {
        StoreError::io("SQLite", source)
    }
}

/// A record's bytes could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The byte length does not match the fixed size of the record kind.
    #[error("{kind} record is {actual} bytes, expected {expected}")]
    SizeMismatch {
        kind: RecordKind,
        expected: usize,
        actual: usize,
    },

    /// A directory slot holds a name that is too long or not UTF-8.
    #[error("Directory slot {slot} holds an invalid name")]
    InvalidName { slot: usize },
}

/// Errors returned by filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    /// A path segment or named entry does not exist.
    #[error("No such file or directory: {path}")]
    NotFound { path: String },

    /// A path or entry name exceeds its fixed capacity.
    #[error("Name too long: {len} bytes (max {max})")]
    NameTooLong { len: usize, max: usize },

    /// The requested extent exceeds the largest representable file.
    #[error("File too large: {requested} bytes requested (max {max})")]
    FileTooLarge { requested: u64, max: u64 },

    /// The directory still has entries.
    #[error("Directory not empty: {path}")]
    DirectoryNotEmpty { path: String },

    /// Every slot of the parent directory is occupied.
    #[error("Directory full: {path}")]
    DirectoryFull { path: String },

    /// An entry with this name already exists.
    #[error("File exists: {path}")]
    AlreadyExists { path: String },

    /// A directory was required.
    #[error("Not a directory: {path}")]
    NotADirectory { path: String },

    /// A regular file was required.
    #[error("Is a directory: {path}")]
    IsADirectory { path: String },

    /// The path cannot name the target of this operation.
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    /// A stored record failed to decode.
    #[error("Corrupt record: {0}")]
    Format(#[from] FormatError),

    /// The backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FsError {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound { path: path.into() }
    }

    /// Returns true if the error means "no such entry".
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }
}

/// Result type for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let e = FsError::not_found("/a/b");
        assert!(e.to_string().contains("/a/b"));
        assert!(e.is_not_found());

        let e = FsError::FileTooLarge {
            requested: 10,
            max: 5,
        };
        assert!(e.to_string().contains("10"));
    }

    #[test]
    fn test_size_mismatch_display() {
        let e = FormatError::SizeMismatch {
            kind: RecordKind::Inode,
            expected: 76,
            actual: 75,
        };
        assert_eq!(e.to_string(), "inode record is 75 bytes, expected 76");
    }

    #[test]
    fn test_store_error_converts() {
        let e: FsError = StoreError::NotFound { id: Id::ZERO }.into();
        assert!(matches!(e, FsError::Store(ref s) if s.is_not_found()));
        assert!(!e.is_not_found());
    }
}
