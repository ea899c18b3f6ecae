use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{KvFs, KvStore};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// File to remove
    pub path: String,

    /// Ignore nonexistent files
    #[arg(short, long)]
    pub force: bool,
}

#[instrument(level = "info", name = "cmd::rm", skip_all, fields(path = %args.path, force = args.force))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    match fs.unlink(&path) {
        Ok(()) => Ok(()),
        Err(e) if args.force && e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
