use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{KvFs, KvStore};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// Empty directory to remove
    pub path: String,
}

#[instrument(level = "info", name = "cmd::rmdir", skip_all, fields(path = %args.path))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    fs.rmdir(&normalize_path(&args.path))?;
    Ok(())
}
