use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::fs::now;
use kvfs_core::{KvFs, KvStore};

use super::{normalize_path, parse_mode};
use crate::current_owner;

#[derive(ClapArgs)]
pub struct Args {
    /// Path to the file to create
    pub path: String,

    /// Permission bits for a new file (octal)
    #[arg(short, long, value_parser = parse_mode, default_value = "644")]
    pub mode: u32,
}

#[instrument(level = "info", name = "cmd::touch", skip_all, fields(path = %args.path))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);

    match fs.getattr(&path) {
        Ok(_) => {
            let stamp = now();
            fs.utime(&path, Some(stamp), Some(stamp))?;
        }
        Err(e) if e.is_not_found() => {
            let (uid, gid) = current_owner();
            fs.create(&path, args.mode, uid, gid)?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
