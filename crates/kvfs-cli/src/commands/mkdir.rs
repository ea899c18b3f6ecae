use anyhow::{bail, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{FileKind, KvFs, KvStore};

use super::{normalize_path, parse_mode};
use crate::current_owner;

#[derive(ClapArgs)]
pub struct Args {
    /// Directory path to create
    pub path: String,

    /// Create parent directories as needed
    #[arg(short, long)]
    pub parents: bool,

    /// Permission bits (octal)
    #[arg(short, long, value_parser = parse_mode, default_value = "755")]
    pub mode: u32,
}

#[instrument(level = "info", name = "cmd::mkdir", skip_all, fields(path = %args.path, parents = args.parents))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let (uid, gid) = current_owner();

    if args.parents {
        create_with_parents(fs, &path, args.mode, uid, gid)
    } else {
        fs.mkdir(&path, args.mode, uid, gid)?;
        Ok(())
    }
}

fn create_with_parents<S: KvStore>(
    fs: &KvFs<S>,
    path: &str,
    mode: u32,
    uid: u32,
    gid: u32,
) -> Result<()> {
    let mut current = String::new();
    for component in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(component);

        match fs.getattr(&current) {
            Ok(attrs) if attrs.kind == FileKind::Directory => {}
            Ok(_) => bail!("Path component is a file: {current}"),
            Err(e) if e.is_not_found() => {
                fs.mkdir(&current, mode, uid, gid)?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvfs_core::{FsOptions, MemoryStore};

    #[test]
    fn test_create_with_parents() {
        let fs = KvFs::new(MemoryStore::new(), FsOptions::default()).unwrap();
        fs.mkdir("/a", 0o755, 0, 0).unwrap();

        create_with_parents(&fs, "/a/b/c", 0o700, 0, 0).unwrap();
        let attrs = fs.getattr("/a/b/c").unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert_eq!(attrs.perm, 0o700);

        // Existing chain is a no-op
        create_with_parents(&fs, "/a/b/c", 0o700, 0, 0).unwrap();
    }

    #[test]
    fn test_parents_through_file_fails() {
        let fs = KvFs::new(MemoryStore::new(), FsOptions::default()).unwrap();
        fs.create("/f", 0o644, 0, 0).unwrap();
        let err = create_with_parents(&fs, "/f/sub", 0o755, 0, 0).unwrap_err();
        assert!(err.to_string().contains("is a file"));
    }
}
