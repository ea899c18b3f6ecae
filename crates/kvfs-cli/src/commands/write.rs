use std::io::{self, Read};

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{KvFs, KvStore};

use super::{normalize_path, parse_mode};
use crate::current_owner;

#[derive(ClapArgs)]
pub struct Args {
    /// Destination path in the store
    pub path: String,

    /// Append to the file instead of overwriting
    #[arg(short, long, conflicts_with = "offset")]
    pub append: bool,

    /// Write at this byte offset, keeping the rest of the file
    #[arg(long)]
    pub offset: Option<u64>,

    /// Permission bits if the file is created (octal)
    #[arg(short, long, value_parser = parse_mode, default_value = "644")]
    pub mode: u32,
}

/// How stdin is placed into the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Replace,
    Append,
    At(u64),
}

impl From<&Args> for Placement {
    fn from(args: &Args) -> Self {
        match (args.append, args.offset) {
            (true, _) => Placement::Append,
            (false, Some(offset)) => Placement::At(offset),
            (false, None) => Placement::Replace,
        }
    }
}

#[instrument(level = "info", name = "cmd::write", skip_all, fields(path = %args.path))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let mut content = Vec::new();
    io::stdin().read_to_end(&mut content)?;
    let path = normalize_path(&args.path);
    let written = write_content(fs, &path, &content, Placement::from(args), args.mode)?;
    tracing::info!(written, "Wrote file");
    Ok(())
}

fn write_content<S: KvStore>(
    fs: &KvFs<S>,
    path: &str,
    content: &[u8],
    placement: Placement,
    mode: u32,
) -> Result<usize> {
    let size = match fs.getattr(path) {
        Ok(attrs) => attrs.size,
        Err(e) if e.is_not_found() => {
            let (uid, gid) = current_owner();
            fs.create(path, mode, uid, gid)?.size
        }
        Err(e) => return Err(e.into()),
    };

    let offset = match placement {
        Placement::Replace => {
            fs.truncate(path, 0)?;
            0
        }
        Placement::Append => size,
        Placement::At(offset) => offset,
    };
    Ok(fs.write(path, content, offset)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvfs_core::{FsOptions, MemoryStore};

    fn fs() -> KvFs<MemoryStore> {
        KvFs::new(MemoryStore::new(), FsOptions::default()).unwrap()
    }

    #[test]
    fn test_replace_creates_and_overwrites() {
        let fs = fs();
        write_content(&fs, "/f", b"first version", Placement::Replace, 0o644).unwrap();
        write_content(&fs, "/f", b"second", Placement::Replace, 0o644).unwrap();
        assert_eq!(fs.read("/f", 0, 64).unwrap(), b"second");
    }

    #[test]
    fn test_append_and_offset() {
        let fs = fs();
        write_content(&fs, "/f", b"abc", Placement::Replace, 0o644).unwrap();
        write_content(&fs, "/f", b"def", Placement::Append, 0o644).unwrap();
        write_content(&fs, "/f", b"XY", Placement::At(1), 0o644).unwrap();
        assert_eq!(fs.read("/f", 0, 64).unwrap(), b"aXYdef");
    }

    #[test]
    fn test_write_to_directory_fails() {
        let fs = fs();
        fs.mkdir("/d", 0o755, 0, 0).unwrap();
        assert!(write_content(&fs, "/d", b"x", Placement::Replace, 0o644).is_err());
    }
}
