//! Block storage engine.
//!
//! Maps byte ranges of a file onto its [`FileBlockMap`]: block indices below
//! [`DIRECT_BLOCKS`] live in the direct slots, the next [`INDIRECT_BLOCKS`]
//! in the single indirect map. Unallocated (zero) slots read as zeros and are
//! allocated on first write.

use tracing::{instrument, trace};

use crate::codec::{DataBlock, FileBlockMap, IndirectBlockMap};
use crate::error::{FsError, FsResult};
use crate::id::Id;
use crate::layout::{BLOCK_SIZE, DIRECT_BLOCKS, INDIRECT_BLOCKS, MAX_FILE_SIZE};
use crate::store::{KvStore, RecordStore};

const BLOCK: u64 = BLOCK_SIZE as u64;

/// One block-aligned piece of a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    /// Block index within the file.
    index: usize,
    /// Offset inside the block.
    within: usize,
    /// Bytes covered inside the block.
    len: usize,
}

/// Splits `[from, to)` into per-block spans. Only the first span can start
/// inside a block; only the last can end inside one.
fn spans(from: u64, to: u64) -> impl Iterator<Item = Span> {
    let mut pos = from;
    std::iter::from_fn(move || {
        if pos >= to {
            return None;
        }
        #[allow(clippy::cast_possible_truncation)]
        let span = Span {
            index: (pos / BLOCK) as usize,
            within: (pos % BLOCK) as usize,
            len: (BLOCK - pos % BLOCK).min(to - pos) as usize,
        };
        pos += span.len as u64;
        Some(span)
    })
}

/// Lazily loaded single indirect map of one file.
struct Indirect {
    map: Option<IndirectBlockMap>,
    dirty: bool,
}

impl Indirect {
    fn new() -> Self {
        Self {
            map: None,
            dirty: false,
        }
    }

    /// Block id at indirect slot `slot`, zero if the map itself is absent.
    fn lookup<S: KvStore>(
        &mut self,
        records: &RecordStore<S>,
        map_id: Id,
        slot: usize,
    ) -> FsResult<Id> {
        if map_id.is_zero() {
            return Ok(Id::ZERO);
        }
        if self.map.is_none() {
            self.map = Some(records.load(&map_id)?);
        }
        Ok(self.map.as_ref().map_or(Id::ZERO, |m| m.blocks[slot]))
    }

    /// Loads the map, allocating it in `file` if it does not exist yet.
    fn ensure<S: KvStore>(
        &mut self,
        records: &RecordStore<S>,
        file: &mut FileBlockMap,
    ) -> FsResult<&mut IndirectBlockMap> {
        if file.single_indirect.is_zero() {
            file.single_indirect = Id::generate();
            trace!(id = %file.single_indirect, "Allocated indirect map");
            self.map = Some(IndirectBlockMap::empty());
            self.dirty = true;
        } else if self.map.is_none() {
            self.map = Some(records.load(&file.single_indirect)?);
        }
        Ok(self.map.get_or_insert_with(IndirectBlockMap::empty))
    }
}

/// Reads and writes file content through a [`RecordStore`].
pub struct BlockEngine<'a, S> {
    records: &'a RecordStore<S>,
}

impl<'a, S: KvStore> BlockEngine<'a, S> {
    pub fn new(records: &'a RecordStore<S>) -> Self {
        Self { records }
    }

    /// Reads up to `len` bytes starting at `offset`.
    ///
    /// The caller bounds the range by the file size; this only stops at the
    /// end of the addressable range. Unallocated blocks read as zeros.
    #[instrument(level = "trace", skip(self, map))]
    pub fn read(&self, map: &FileBlockMap, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let end = offset.saturating_add(len as u64).min(MAX_FILE_SIZE);
        if offset >= end {
            return Ok(Vec::new());
        }

        #[allow(clippy::cast_possible_truncation)]
        let mut out = Vec::with_capacity((end - offset) as usize);
        let mut indirect = Indirect::new();

        for span in spans(offset, end) {
            let block_id = if span.index < DIRECT_BLOCKS {
                map.direct[span.index]
            } else {
                indirect.lookup(self.records, map.single_indirect, span.index - DIRECT_BLOCKS)?
            };

            if block_id.is_zero() {
                out.resize(out.len() + span.len, 0);
            } else {
                let block: DataBlock = self.records.load(&block_id)?;
                out.extend_from_slice(&block.bytes[span.within..span.within + span.len]);
            }
        }

        Ok(out)
    }

    /// Writes `data` at `offset`, allocating blocks on demand.
    ///
    /// Partially covered blocks are read-modify-written; blocks that are
    /// overwritten whole or freshly allocated are not fetched. The block map
    /// (stored under `map_id`) and the indirect map, if touched, are persisted
    /// once at the end.
    ///
    /// Fails with [`FsError::FileTooLarge`] before touching any block if the
    /// range ends past [`MAX_FILE_SIZE`].
    #[instrument(level = "trace", skip(self, map, data), fields(len = data.len()))]
    pub fn write(
        &self,
        map_id: &Id,
        map: &mut FileBlockMap,
        data: &[u8],
        offset: u64,
    ) -> FsResult<usize> {
        let end = check_extent(offset, data.len() as u64)?;
        let mut indirect = Indirect::new();
        let mut consumed = 0usize;

        for span in spans(offset, end) {
            let (block_id, fresh) = self.slot_for_write(map, &mut indirect, span.index)?;

            let mut block = if fresh || span.len == BLOCK_SIZE {
                DataBlock::zeroed()
            } else {
                self.records.load(&block_id)?
            };
            block.bytes[span.within..span.within + span.len]
                .copy_from_slice(&data[consumed..consumed + span.len]);
            self.records.save(&block_id, &block)?;

            consumed += span.len;
        }

        if indirect.dirty
            && let Some(ref indirect_map) = indirect.map
        {
            self.records.save(&map.single_indirect, indirect_map)?;
        }
        self.records.save(map_id, map)?;

        trace!(written = consumed, "write complete");
        Ok(consumed)
    }

    /// Zeroes `[from, to)` inside blocks that are already allocated.
    ///
    /// Unallocated blocks already read as zeros and are left alone, so no
    /// block or map is created.
    pub fn zero_range(&self, map: &FileBlockMap, from: u64, to: u64) -> FsResult<()> {
        let to = to.min(MAX_FILE_SIZE);
        let mut indirect = Indirect::new();

        for span in spans(from, to) {
            let block_id = if span.index < DIRECT_BLOCKS {
                map.direct[span.index]
            } else {
                indirect.lookup(self.records, map.single_indirect, span.index - DIRECT_BLOCKS)?
            };
            if block_id.is_zero() {
                continue;
            }

            let mut block: DataBlock = self.records.load(&block_id)?;
            block.bytes[span.within..span.within + span.len].fill(0);
            self.records.save(&block_id, &block)?;
        }
        Ok(())
    }

    /// Returns the block id for `index`, allocating it if the slot is empty.
    /// The flag is true for a newly allocated block.
    fn slot_for_write(
        &self,
        map: &mut FileBlockMap,
        indirect: &mut Indirect,
        index: usize,
    ) -> FsResult<(Id, bool)> {
        let slot = if index < DIRECT_BLOCKS {
            &mut map.direct[index]
        } else {
            &mut indirect.ensure(self.records, map)?.blocks[index - DIRECT_BLOCKS]
        };
        if !slot.is_zero() {
            return Ok((*slot, false));
        }

        let id = Id::generate();
        *slot = id;
        if index >= DIRECT_BLOCKS {
            indirect.dirty = true;
        }
        trace!(index, %id, "Allocated data block");
        Ok((id, true))
    }
}

/// Validates that `[offset, offset + len)` fits in a file and returns its end.
pub fn check_extent(offset: u64, len: u64) -> FsResult<u64> {
    let requested = offset.saturating_add(len);
    if requested > MAX_FILE_SIZE {
        return Err(FsError::FileTooLarge {
            requested,
            max: MAX_FILE_SIZE,
        });
    }
    Ok(requested)
}

/// Number of data blocks a file of `size` bytes spans.
pub fn blocks_for(size: u64) -> u64 {
    size.div_ceil(BLOCK).min((DIRECT_BLOCKS + INDIRECT_BLOCKS) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn setup() -> (RecordStore<MemoryStore>, Id, FileBlockMap) {
        let records = RecordStore::new(MemoryStore::new());
        let map_id = Id::generate();
        let map = FileBlockMap::default();
        records.save(&map_id, &map).unwrap();
        (records, map_id, map)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    #[test]
    fn test_spans_block_aligned() {
        let all: Vec<Span> = spans(BLOCK, 3 * BLOCK).collect();
        assert_eq!(
            all,
            vec![
                Span { index: 1, within: 0, len: BLOCK_SIZE },
                Span { index: 2, within: 0, len: BLOCK_SIZE },
            ]
        );
    }

    #[test]
    fn test_spans_partial_edges() {
        let all: Vec<Span> = spans(BLOCK - 1, BLOCK + 2).collect();
        assert_eq!(
            all,
            vec![
                Span { index: 0, within: BLOCK_SIZE - 1, len: 1 },
                Span { index: 1, within: 0, len: 2 },
            ]
        );
        assert_eq!(spans(5, 5).count(), 0);
    }

    #[test]
    fn test_write_read_single_block() {
        let (records, map_id, mut map) = setup();
        let engine = BlockEngine::new(&records);

        assert_eq!(engine.write(&map_id, &mut map, b"hello", 0).unwrap(), 5);
        assert!(!map.direct[0].is_zero());
        assert!(map.direct[1].is_zero());
        assert_eq!(engine.read(&map, 0, 5).unwrap(), b"hello");

        let stored: FileBlockMap = records.load(&map_id).unwrap();
        assert_eq!(stored, map);
    }

    #[test]
    fn test_write_spanning_blocks_preserves_neighbours() {
        let (records, map_id, mut map) = setup();
        let engine = BlockEngine::new(&records);

        let base = pattern(3 * BLOCK_SIZE);
        engine.write(&map_id, &mut map, &base, 0).unwrap();

        engine
            .write(&map_id, &mut map, &[0xAA; 10], BLOCK - 5)
            .unwrap();

        let mut expected = base.clone();
        expected[BLOCK_SIZE - 5..BLOCK_SIZE + 5].fill(0xAA);
        assert_eq!(engine.read(&map, 0, 3 * BLOCK_SIZE).unwrap(), expected);
    }

    #[test]
    fn test_write_spills_into_indirect() {
        let (records, map_id, mut map) = setup();
        let engine = BlockEngine::new(&records);

        let data = pattern((DIRECT_BLOCKS + 2) * BLOCK_SIZE + 17);
        engine.write(&map_id, &mut map, &data, 0).unwrap();

        assert!(map.direct.iter().all(|id| !id.is_zero()));
        assert!(!map.single_indirect.is_zero());
        let indirect: IndirectBlockMap = records.load(&map.single_indirect).unwrap();
        assert_eq!(indirect.blocks.iter().filter(|id| !id.is_zero()).count(), 3);

        assert_eq!(engine.read(&map, 0, data.len()).unwrap(), data);
    }

    #[test]
    fn test_write_past_direct_range_only_allocates_indirect() {
        let (records, map_id, mut map) = setup();
        let engine = BlockEngine::new(&records);

        let offset = (DIRECT_BLOCKS as u64 + 5) * BLOCK + 3;
        engine.write(&map_id, &mut map, b"far", offset).unwrap();

        assert!(map.direct.iter().all(Id::is_zero));
        assert_eq!(engine.read(&map, offset, 3).unwrap(), b"far");
        assert_eq!(engine.read(&map, 0, 8).unwrap(), vec![0; 8]);
    }

    #[test]
    fn test_unallocated_blocks_read_as_zero() {
        let (records, map_id, mut map) = setup();
        let engine = BlockEngine::new(&records);

        engine.write(&map_id, &mut map, b"x", 2 * BLOCK).unwrap();
        assert!(map.direct[0].is_zero());
        assert!(map.direct[1].is_zero());

        let read = engine.read(&map, 0, 2 * BLOCK_SIZE + 1).unwrap();
        assert!(read[..2 * BLOCK_SIZE].iter().all(|b| *b == 0));
        assert_eq!(read[2 * BLOCK_SIZE], b'x');
    }

    #[test]
    fn test_capacity_boundary() {
        let (records, map_id, mut map) = setup();
        let engine = BlockEngine::new(&records);

        assert_eq!(
            engine
                .write(&map_id, &mut map, b"ab", MAX_FILE_SIZE - 2)
                .unwrap(),
            2
        );

        let before = map.clone();
        let err = engine
            .write(&map_id, &mut map, b"abc", MAX_FILE_SIZE - 2)
            .unwrap_err();
        assert!(matches!(
            err,
            FsError::FileTooLarge { requested, max } if requested == MAX_FILE_SIZE + 1 && max == MAX_FILE_SIZE
        ));
        assert_eq!(map, before);
    }

    #[test]
    fn test_zero_range_skips_unallocated() {
        let (records, map_id, mut map) = setup();
        let engine = BlockEngine::new(&records);

        engine.write(&map_id, &mut map, &pattern(10), 0).unwrap();
        let stored_before = records.backend().len();

        engine.zero_range(&map, 4, 3 * BLOCK).unwrap();

        assert_eq!(records.backend().len(), stored_before);
        let read = engine.read(&map, 0, 10).unwrap();
        assert_eq!(&read[..4], &pattern(4)[..]);
        assert!(read[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_blocks_for() {
        assert_eq!(blocks_for(0), 0);
        assert_eq!(blocks_for(1), 1);
        assert_eq!(blocks_for(BLOCK), 1);
        assert_eq!(blocks_for(BLOCK + 1), 2);
    }
}
