//! Init command - create a new store with an empty root directory.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{FsOptions, KvFs, SqliteStore};

use super::parse_mode;
use crate::current_owner;

#[derive(ClapArgs)]
pub struct Args {
    /// Permission bits of the root directory (octal)
    #[arg(long, value_parser = parse_mode, default_value = "775")]
    pub perm: u32,
}

#[instrument(level = "info", name = "cmd::init", skip_all, fields(store = %store.display()))]
pub fn execute(store: &Path, args: &Args) -> Result<()> {
    if store.exists() {
        return Err(anyhow::Error::new(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Store already exists: {}", store.display()),
        )));
    }
    if let Some(parent) = store.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let backend = SqliteStore::open(store)
        .with_context(|| format!("Failed to create store: {}", store.display()))?;
    let (uid, gid) = current_owner();
    let fs = KvFs::new(backend, FsOptions::with_owner(uid, gid).root_perm(args.perm))
        .context("Failed to initialize root directory")?;
    let root = fs.root_id();
    fs.into_backend().close()?;

    println!("Initialized empty store at {}", store.display());
    tracing::info!(%root, "Store initialized");
    Ok(())
}
