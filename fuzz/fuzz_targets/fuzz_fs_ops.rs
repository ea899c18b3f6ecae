//! Fuzz target for filesystem operation sequences
//!
//! Runs arbitrary operations against an in-memory filesystem and a plain
//! model of file contents, and checks that reads and sizes always agree.

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use kvfs_core::{FsOptions, KvFs, MemoryStore};
use libfuzzer_sys::fuzz_target;

const NAMES: [&str; 4] = ["/a", "/b", "/d/a", "/d/b"];

#[derive(Arbitrary, Debug)]
enum Op {
    Create(u8),
    Write { file: u8, offset: u16, data: Vec<u8> },
    Truncate { file: u8, size: u16 },
    Read { file: u8, offset: u16, len: u16 },
    Unlink(u8),
}

fn name(index: u8) -> &'static str {
    NAMES[usize::from(index) % NAMES.len()]
}

fuzz_target!(|ops: Vec<Op>| {
    let fs = KvFs::new(MemoryStore::new(), FsOptions::default()).unwrap();
    fs.mkdir("/d", 0o755, 0, 0).unwrap();
    let mut model: HashMap<&'static str, Vec<u8>> = HashMap::new();

    for op in ops.into_iter().take(64) {
        match op {
            Op::Create(file) => {
                let path = name(file);
                let result = fs.create(path, 0o644, 0, 0);
                assert_eq!(result.is_ok(), !model.contains_key(path));
                model.entry(path).or_default();
            }
            Op::Write { file, offset, data } => {
                let path = name(file);
                let result = fs.write(path, &data, u64::from(offset));
                match model.get_mut(path) {
                    Some(content) => {
                        assert_eq!(result.unwrap(), data.len());
                        if !data.is_empty() {
                            let end = usize::from(offset) + data.len();
                            if content.len() < end {
                                content.resize(end, 0);
                            }
                            content[usize::from(offset)..end].copy_from_slice(&data);
                        }
                    }
                    None => assert!(result.is_err()),
                }
            }
            Op::Truncate { file, size } => {
                let path = name(file);
                let result = fs.truncate(path, u64::from(size));
                match model.get_mut(path) {
                    Some(content) => {
                        result.unwrap();
                        content.resize(usize::from(size), 0);
                    }
                    None => assert!(result.is_err()),
                }
            }
            Op::Read { file, offset, len } => {
                let path = name(file);
                let result = fs.read(path, u64::from(offset), usize::from(len));
                match model.get(path) {
                    Some(content) => {
                        let start = usize::from(offset).min(content.len());
                        let end = (start + usize::from(len)).min(content.len());
                        assert_eq!(result.unwrap(), &content[start..end]);
                    }
                    None => assert!(result.is_err()),
                }
            }
            Op::Unlink(file) => {
                let path = name(file);
                let result = fs.unlink(path);
                assert_eq!(result.is_ok(), model.remove(path).is_some());
            }
        }
    }

    for (path, content) in &model {
        assert_eq!(fs.getattr(path).unwrap().size, content.len() as u64);
    }
});
