//! Fixed-size binary records.
//!
//! Each record kind encodes to exactly [`RecordKind::size`] bytes, integers
//! little-endian. Decoding rejects any buffer of a different length with
//! [`FormatError::SizeMismatch`] before looking at the contents, so a record
//! of the wrong kind fetched through a stale identifier is never
//! half-interpreted.

use std::fmt;

use crate::error::FormatError;
use crate::id::Id;
use crate::layout::{
    mode, BLOCK_MAP_SIZE, BLOCK_SIZE, DATA_BLOCK_SIZE, DIRECT_BLOCKS, DIRECTORY_SIZE, DIR_ENTRIES,
    ID_SIZE, INDIRECT_BLOCKS, INDIRECT_SIZE, INODE_SIZE, MAX_NAME_LEN, ROOT_POINTER_SIZE,
};

/// The kinds of record kept in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    RootPointer,
    Inode,
    Directory,
    BlockMap,
    DataBlock,
    IndirectMap,
}

impl RecordKind {
    /// Encoded size of this kind in bytes.
    pub const fn size(self) -> usize {
        match self {
            RecordKind::RootPointer => ROOT_POINTER_SIZE,
            RecordKind::Inode => INODE_SIZE,
            RecordKind::Directory => DIRECTORY_SIZE,
            RecordKind::BlockMap => BLOCK_MAP_SIZE,
            RecordKind::DataBlock => DATA_BLOCK_SIZE,
            RecordKind::IndirectMap => INDIRECT_SIZE,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::RootPointer => "root pointer",
            RecordKind::Inode => "inode",
            RecordKind::Directory => "directory",
            RecordKind::BlockMap => "block map",
            RecordKind::DataBlock => "data block",
            RecordKind::IndirectMap => "indirect map",
        };
        f.write_str(name)
    }
}

/// A fixed-size record that can round-trip through the store.
pub trait Record: Sized {
    /// The kind tag, which also fixes the encoded size.
    const KIND: RecordKind;

    /// Encodes the record into exactly `Self::KIND.size()` bytes.
    fn encode(&self) -> Vec<u8>;

    /// Decodes a buffer already known to have the right length.
    fn decode_exact(bytes: &[u8]) -> Result<Self, FormatError>;

    /// Decodes a buffer, rejecting any length other than the kind's size.
    fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        check_size(Self::KIND, bytes.len())?;
        Self::decode_exact(bytes)
    }
}

/// Fails with [`FormatError::SizeMismatch`] unless `actual` is the size of `kind`.
pub fn check_size(kind: RecordKind, actual: usize) -> Result<(), FormatError> {
    let expected = kind.size();
    if actual == expected {
        Ok(())
    } else {
        Err(FormatError::SizeMismatch {
            kind,
            expected,
            actual,
        })
    }
}

/// Little-endian cursor over a size-checked buffer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        slice
    }

    fn id(&mut self) -> Id {
        Id::read_from(self.take(ID_SIZE))
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4));
        u32::from_le_bytes(b)
    }

    fn u64(&mut self) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8));
        u64::from_le_bytes(b)
    }

    fn i64(&mut self) -> i64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8));
        i64::from_le_bytes(b)
    }
}

/// The root pointer: names the inode of the filesystem root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootPointer {
    pub root_id: Id,
}

impl Record for RootPointer {
    const KIND: RecordKind = RecordKind::RootPointer;

    fn encode(&self) -> Vec<u8> {
        self.root_id.as_bytes().to_vec()
    }

    fn decode_exact(bytes: &[u8]) -> Result<Self, FormatError> {
        Ok(Self {
            root_id: Reader::new(bytes).id(),
        })
    }
}

/// Kind of a filesystem entry, derived from the inode mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory,
    RegularFile,
}

/// Metadata for one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// Key under which this inode is stored.
    pub self_id: Id,
    /// Directory block (directories) or file block map (files).
    pub data_id: Id,
    pub uid: u32,
    pub gid: u32,
    /// Type and permission bits, as in `st_mode`.
    pub mode: u32,
    /// Seconds since the Unix epoch.
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    /// Byte length for files, occupied entry count for directories.
    pub size: u64,
}

impl Inode {
    /// Creates an inode with all three timestamps set to `now`.
    pub fn new(self_id: Id, data_id: Id, mode: u32, uid: u32, gid: u32, now: i64) -> Self {
        Self {
            self_id,
            data_id,
            uid,
            gid,
            mode,
            atime: now,
            mtime: now,
            ctime: now,
            size: 0,
        }
    }

    /// Returns the entry kind encoded in the mode bits.
    ///
    /// Anything that is not marked as a directory is treated as a regular file.
    pub fn kind(&self) -> FileKind {
        if self.mode & mode::S_IFMT == mode::S_IFDIR {
            FileKind::Directory
        } else {
            FileKind::RegularFile
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// Permission bits without the type.
    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & mode::PERMISSION_MASK
    }
}

impl Record for Inode {
    const KIND: RecordKind = RecordKind::Inode;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(INODE_SIZE);
        out.extend_from_slice(self.self_id.as_bytes());
        out.extend_from_slice(self.data_id.as_bytes());
        out.extend_from_slice(&self.uid.to_le_bytes());
        out.extend_from_slice(&self.gid.to_le_bytes());
        out.extend_from_slice(&self.mode.to_le_bytes());
        out.extend_from_slice(&self.atime.to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.extend_from_slice(&self.ctime.to_le_bytes());
        out.extend_from_slice(&self.size.to_le_bytes());
        debug_assert_eq!(out.len(), INODE_SIZE);
        out
    }

    fn decode_exact(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::new(bytes);
        Ok(Self {
            self_id: r.id(),
            data_id: r.id(),
            uid: r.u32(),
            gid: r.u32(),
            mode: r.u32(),
            atime: r.i64(),
            mtime: r.i64(),
            ctime: r.i64(),
            size: r.u64(),
        })
    }
}

/// One slot of a directory block. An empty name marks a free slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirSlot {
    pub name: String,
    pub child_id: Id,
}

impl DirSlot {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.name.is_empty()
    }
}

/// Content record of a directory: a fixed-capacity name → child table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryBlock {
    pub self_id: Id,
    pub(crate) slots: Vec<DirSlot>,
}

impl DirectoryBlock {
    /// Creates a directory block with every slot free.
    pub fn empty(self_id: Id) -> Self {
        Self {
            self_id,
            slots: vec![DirSlot::default(); DIR_ENTRIES],
        }
    }

    /// All slots, free ones included, in storage order.
    pub fn slots(&self) -> &[DirSlot] {
        &self.slots
    }
}

impl Record for DirectoryBlock {
    const KIND: RecordKind = RecordKind::Directory;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(DIRECTORY_SIZE);
        out.extend_from_slice(self.self_id.as_bytes());
        for slot in &self.slots {
            let name = slot.name.as_bytes();
            debug_assert!(name.len() <= MAX_NAME_LEN);
            let len = name.len().min(MAX_NAME_LEN);
            #[allow(clippy::cast_possible_truncation)]
            out.push(len as u8);
            out.extend_from_slice(&name[..len]);
            out.resize(out.len() + (MAX_NAME_LEN - len), 0);
            out.extend_from_slice(slot.child_id.as_bytes());
        }
        debug_assert_eq!(out.len(), DIRECTORY_SIZE);
        out
    }

    fn decode_exact(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::new(bytes);
        let self_id = r.id();
        let mut slots = Vec::with_capacity(DIR_ENTRIES);
        for slot in 0..DIR_ENTRIES {
            let len = usize::from(r.u8());
            let raw = r.take(MAX_NAME_LEN);
            let name = std::str::from_utf8(&raw[..len])
                .map_err(|_| FormatError::InvalidName { slot })?
                .to_owned();
            let child_id = r.id();
            slots.push(DirSlot { name, child_id });
        }
        Ok(Self { self_id, slots })
    }
}

/// Content record of a regular file: direct and single-indirect block refs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBlockMap {
    pub direct: [Id; DIRECT_BLOCKS],
    pub single_indirect: Id,
}

impl Record for FileBlockMap {
    const KIND: RecordKind = RecordKind::BlockMap;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLOCK_MAP_SIZE);
        for id in &self.direct {
            out.extend_from_slice(id.as_bytes());
        }
        out.extend_from_slice(self.single_indirect.as_bytes());
        out
    }

    fn decode_exact(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut r = Reader::new(bytes);
        let mut direct = [Id::ZERO; DIRECT_BLOCKS];
        for slot in &mut direct {
            *slot = r.id();
        }
        Ok(Self {
            direct,
            single_indirect: r.id(),
        })
    }
}

/// Secondary table of data block references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlockMap {
    pub blocks: Vec<Id>,
}

impl IndirectBlockMap {
    pub fn empty() -> Self {
        Self {
            blocks: vec![Id::ZERO; INDIRECT_BLOCKS],
        }
    }
}

impl Record for IndirectBlockMap {
    const KIND: RecordKind = RecordKind::IndirectMap;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(INDIRECT_SIZE);
        for id in &self.blocks {
            out.extend_from_slice(id.as_bytes());
        }
        out
    }

    fn decode_exact(bytes: &[u8]) -> Result<Self, FormatError> {
        let blocks = bytes.chunks_exact(ID_SIZE).map(Id::read_from).collect();
        Ok(Self { blocks })
    }
}

/// A fixed-size chunk of file content.
#[derive(Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub bytes: Vec<u8>,
}

impl DataBlock {
    pub fn zeroed() -> Self {
        Self {
            bytes: vec![0; BLOCK_SIZE],
        }
    }
}

impl fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.bytes.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
        write!(f, "DataBlock({used} of {} bytes used)", self.bytes.len())
    }
}

impl Record for DataBlock {
    const KIND: RecordKind = RecordKind::DataBlock;

    fn encode(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    fn decode_exact(bytes: &[u8]) -> Result<Self, FormatError> {
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_inode() -> Inode {
        let mut inode = Inode::new(
            Id::generate(),
            Id::generate(),
            mode::S_IFREG | 0o644,
            1000,
            100,
            1_700_000_000,
        );
        inode.size = 12345;
        inode.atime = -5;
        inode
    }

    #[test]
    fn test_inode_roundtrip() {
        let inode = sample_inode();
        let bytes = inode.encode();
        assert_eq!(bytes.len(), INODE_SIZE);
        assert_eq!(Inode::decode(&bytes).unwrap(), inode);
    }

    #[test]
    fn test_decode_rejects_one_byte_short() {
        let bytes = sample_inode().encode();
        let err = Inode::decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert_eq!(
            err,
            FormatError::SizeMismatch {
                kind: RecordKind::Inode,
                expected: INODE_SIZE,
                actual: INODE_SIZE - 1,
            }
        );

        let map = FileBlockMap::default().encode();
        assert!(matches!(
            FileBlockMap::decode(&map[..BLOCK_MAP_SIZE - 1]),
            Err(FormatError::SizeMismatch { .. })
        ));
        let dir = DirectoryBlock::empty(Id::generate()).encode();
        assert!(matches!(
            DirectoryBlock::decode(&dir[..DIRECTORY_SIZE - 1]),
            Err(FormatError::SizeMismatch { .. })
        ));
        assert!(matches!(
            DataBlock::decode(&[0u8; BLOCK_SIZE - 1]),
            Err(FormatError::SizeMismatch { .. })
        ));
        assert!(matches!(
            IndirectBlockMap::decode(&[0u8; INDIRECT_SIZE - 1]),
            Err(FormatError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_other_kind() {
        let map = FileBlockMap::default().encode();
        let err = Inode::decode(&map).unwrap_err();
        assert!(matches!(
            err,
            FormatError::SizeMismatch {
                kind: RecordKind::Inode,
                actual: BLOCK_MAP_SIZE,
                ..
            }
        ));
    }

    #[test]
    fn test_directory_roundtrip_keeps_slot_positions() {
        let mut dir = DirectoryBlock::empty(Id::generate());
        let a = Id::generate();
        let c = Id::generate();
        dir.slots[0] = DirSlot {
            name: "a".into(),
            child_id: a,
        };
        dir.slots[2] = DirSlot {
            name: "ç".repeat(MAX_NAME_LEN / 2),
            child_id: c,
        };

        let decoded = DirectoryBlock::decode(&dir.encode()).unwrap();
        assert_eq!(decoded, dir);
        assert!(decoded.slots()[1].is_free());
    }

    #[test]
    fn test_directory_invalid_utf8_name() {
        let mut bytes = DirectoryBlock::empty(Id::generate()).encode();
        let slot_start = ID_SIZE;
        bytes[slot_start] = 2;
        bytes[slot_start + 1] = 0xff;
        bytes[slot_start + 2] = 0xfe;
        assert_eq!(
            DirectoryBlock::decode(&bytes).unwrap_err(),
            FormatError::InvalidName { slot: 0 }
        );
    }

    #[test]
    fn test_block_map_roundtrip() {
        let mut map = FileBlockMap::default();
        map.direct[3] = Id::generate();
        map.single_indirect = Id::generate();
        assert_eq!(FileBlockMap::decode(&map.encode()).unwrap(), map);
    }

    #[test]
    fn test_inode_kind() {
        let mut inode = sample_inode();
        assert_eq!(inode.kind(), FileKind::RegularFile);
        inode.mode = mode::S_IFDIR | 0o755;
        assert!(inode.is_dir());
        assert_eq!(inode.permissions(), 0o755);
    }
}
