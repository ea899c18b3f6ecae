//! On-store geometry and record sizes.
//!
//! All record kinds have a fixed encoded size known at compile time. The sizes
//! are pairwise distinct so the store adapter's length check also tells record
//! kinds apart when a stale or wrong identifier is followed.

use crate::id::Id;

/// Size of an [`Id`] in bytes.
pub const ID_SIZE: usize = 16;

/// Size of one data block in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Number of direct block slots in a file block map.
pub const DIRECT_BLOCKS: usize = 12;

/// Number of slots in the single indirect block map.
pub const INDIRECT_BLOCKS: usize = 1024;

/// Total number of addressable blocks per file.
pub const MAX_BLOCKS: usize = DIRECT_BLOCKS + INDIRECT_BLOCKS;

/// Largest representable file extent in bytes.
pub const MAX_FILE_SIZE: u64 = (MAX_BLOCKS * BLOCK_SIZE) as u64;

/// Number of entry slots in a directory block.
pub const DIR_ENTRIES: usize = 64;

/// Longest entry name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Longest accepted path in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Well-known key of the root pointer record.
pub const ROOT_POINTER_ID: Id = Id::from_u128(0x6b76_6673_726f_6f74_0000_0000_0000_0001);

/// Encoded size of the root pointer record.
pub const ROOT_POINTER_SIZE: usize = ID_SIZE;

/// Encoded size of an inode.
///
/// `self_id`, `data_id`, `uid`, `gid`, `mode`, three timestamps, `size`.
pub const INODE_SIZE: usize = 2 * ID_SIZE + 3 * 4 + 3 * 8 + 8;

/// Encoded size of one directory slot: length byte, name buffer, child id.
pub const DIR_SLOT_SIZE: usize = 1 + MAX_NAME_LEN + ID_SIZE;

/// Encoded size of a directory block.
pub const DIRECTORY_SIZE: usize = ID_SIZE + DIR_ENTRIES * DIR_SLOT_SIZE;

/// Encoded size of a file block map.
pub const BLOCK_MAP_SIZE: usize = (DIRECT_BLOCKS + 1) * ID_SIZE;

/// Encoded size of a data block.
pub const DATA_BLOCK_SIZE: usize = BLOCK_SIZE;

/// Encoded size of an indirect block map.
pub const INDIRECT_SIZE: usize = INDIRECT_BLOCKS * ID_SIZE;

/// File type mask and bits, mirroring POSIX `st_mode`.
pub mod mode {
    /// Mask selecting the file type bits.
    pub const S_IFMT: u32 = 0o170_000;
    /// Directory.
    pub const S_IFDIR: u32 = 0o040_000;
    /// Regular file.
    pub const S_IFREG: u32 = 0o100_000;
    /// Mask selecting permission, setuid, setgid and sticky bits.
    pub const PERMISSION_MASK: u32 = 0o7777;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_are_distinct() {
        let sizes = [
            ROOT_POINTER_SIZE,
            INODE_SIZE,
            DIRECTORY_SIZE,
            BLOCK_MAP_SIZE,
            DATA_BLOCK_SIZE,
            INDIRECT_SIZE,
        ];
        for (i, a) in sizes.iter().enumerate() {
            for b in &sizes[i + 1..] {
                assert_ne!(a, b, "record sizes must not collide");
            }
        }
    }

    #[test]
    fn test_geometry() {
        assert_eq!(INODE_SIZE, 76);
        assert_eq!(BLOCK_MAP_SIZE, 208);
        assert_eq!(MAX_FILE_SIZE, 1036 * 4096);
        assert!(!ROOT_POINTER_ID.is_zero());
    }
}
