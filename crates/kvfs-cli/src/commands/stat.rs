use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{FileKind, KvFs, KvStore};

use super::{format_mode, normalize_path};

#[derive(ClapArgs)]
pub struct Args {
    /// Path within the store
    pub path: String,
}

#[instrument(level = "info", name = "cmd::stat", skip_all, fields(path = %args.path))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let attrs = fs.getattr(&path)?;

    let kind = match attrs.kind {
        FileKind::Directory => "directory",
        FileKind::RegularFile => "regular file",
    };
    println!("  Path: {path}");
    println!("  Type: {kind}");
    println!("  Size: {}", attrs.size);
    println!(
        "  Mode: {:04o} ({})",
        attrs.perm,
        format_mode(attrs.kind, attrs.perm)
    );
    println!("   Uid: {}  Gid: {}", attrs.uid, attrs.gid);
    println!(" Links: {}", attrs.nlink);
    println!("Access: {}", attrs.atime);
    println!("Modify: {}", attrs.mtime);
    println!("Change: {}", attrs.ctime);
    println!("    Id: {}", attrs.id);
    Ok(())
}
