//! Process exit codes.

pub const SUCCESS: u8 = 0;
pub const GENERAL_ERROR: u8 = 1;
/// Path, store file or config file does not exist.
pub const NOT_FOUND: u8 = 3;
pub const PERMISSION_DENIED: u8 = 4;
/// The operation is not valid for the target (not empty, already exists, ...).
pub const INVALID_OPERATION: u8 = 5;
/// The store holds records of the wrong size or dangling references.
pub const STORE_INVALID: u8 = 6;
pub const MOUNT_FAILED: u8 = 7;
pub const CANCELLED: u8 = 130;
