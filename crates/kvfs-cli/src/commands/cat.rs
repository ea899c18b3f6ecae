use anyhow::Result;
use clap::Args as ClapArgs;
use std::io::{self, Write};
use tracing::instrument;

use kvfs_core::{KvFs, KvStore};

use super::normalize_path;

#[derive(ClapArgs)]
pub struct Args {
    /// File path within the store
    pub file: String,
}

#[instrument(level = "info", name = "cmd::cat", skip_all, fields(file = %args.file))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.file);
    let size = usize::try_from(fs.getattr(&path)?.size)?;
    let content = fs.read(&path, 0, size)?;
    io::stdout().write_all(&content)?;
    Ok(())
}
