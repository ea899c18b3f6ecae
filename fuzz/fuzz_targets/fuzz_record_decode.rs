//! Fuzz target for record decoding
//!
//! Every record kind must either decode or fail with an error, never panic.
//! Anything that decodes must re-encode to its kind's size and be stable
//! under a second round.

#![no_main]

use arbitrary::Arbitrary;
use kvfs_core::Inode;
use kvfs_core::codec::{
    DataBlock, DirectoryBlock, FileBlockMap, IndirectBlockMap, Record, RecordKind, RootPointer,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    kind: FuzzKind,
    /// Pad or cut `data` to the kind's exact size
    exact: bool,
    data: Vec<u8>,
}

#[derive(Arbitrary, Debug, Clone, Copy)]
enum FuzzKind {
    RootPointer,
    Inode,
    Directory,
    BlockMap,
    DataBlock,
    IndirectMap,
}

impl FuzzKind {
    fn record_kind(self) -> RecordKind {
        match self {
            FuzzKind::RootPointer => RecordKind::RootPointer,
            FuzzKind::Inode => RecordKind::Inode,
            FuzzKind::Directory => RecordKind::Directory,
            FuzzKind::BlockMap => RecordKind::BlockMap,
            FuzzKind::DataBlock => RecordKind::DataBlock,
            FuzzKind::IndirectMap => RecordKind::IndirectMap,
        }
    }
}

fn check<R: Record>(bytes: &[u8], exact: bool) {
    match R::decode(bytes) {
        Ok(record) => {
            assert_eq!(bytes.len(), R::KIND.size(), "decoded a buffer of the wrong size");
            let reencoded = record.encode();
            assert_eq!(reencoded.len(), R::KIND.size());
            let again = R::decode(&reencoded).expect("re-encoded record must decode");
            assert_eq!(again.encode(), reencoded);
        }
        // Only directory names can be invalid at the right size
        Err(_) => assert!(!exact || R::KIND == RecordKind::Directory),
    }
}

fuzz_target!(|input: FuzzInput| {
    let mut bytes = input.data;
    if input.exact {
        bytes.resize(input.kind.record_kind().size(), 0);
    }

    match input.kind {
        FuzzKind::RootPointer => check::<RootPointer>(&bytes, input.exact),
        FuzzKind::Inode => check::<Inode>(&bytes, input.exact),
        FuzzKind::Directory => check::<DirectoryBlock>(&bytes, input.exact),
        FuzzKind::BlockMap => check::<FileBlockMap>(&bytes, input.exact),
        FuzzKind::DataBlock => check::<DataBlock>(&bytes, input.exact),
        FuzzKind::IndirectMap => check::<IndirectBlockMap>(&bytes, input.exact),
    }
});
