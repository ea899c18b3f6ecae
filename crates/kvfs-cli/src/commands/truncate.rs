use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{KvFs, KvStore};

use super::normalize_path;
use crate::current_owner;

#[derive(ClapArgs)]
pub struct Args {
    /// File to resize
    pub path: String,

    /// New size in bytes
    pub size: u64,

    /// Do not create the file if it does not exist
    #[arg(short = 'c', long)]
    pub no_create: bool,
}

#[instrument(level = "info", name = "cmd::truncate", skip_all, fields(path = %args.path, size = args.size))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    match fs.getattr(&path) {
        Ok(_) => {}
        Err(e) if e.is_not_found() && !args.no_create => {
            let (uid, gid) = current_owner();
            fs.create(&path, 0o644, uid, gid)?;
        }
        Err(e) => return Err(e.into()),
    }
    fs.truncate(&path, args.size)?;
    Ok(())
}
