//! Mount command - mount a store as a filesystem.
//!
//! Serves the mount from a background FUSE session and blocks until
//! SIGINT, SIGTERM or SIGHUP, then unmounts.

use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{KvFs, KvStore};
use kvfs_fuse::MountConfig;

use crate::config::MountSettings;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Directory where the store will be mounted
    #[arg(value_name = "MOUNTPOINT")]
    pub mountpoint: PathBuf,

    /// Mount read-only
    #[arg(long)]
    pub read_only: bool,

    /// Allow other users to access the mount (needs user_allow_other in /etc/fuse.conf)
    #[arg(long)]
    pub allow_other: bool,

    /// Keep the mount if this process dies
    #[arg(long)]
    pub no_auto_unmount: bool,

    /// Attribute cache TTL in milliseconds
    #[arg(long, value_name = "MS")]
    pub ttl_ms: Option<u64>,

    /// Name shown as the mount source
    #[arg(long)]
    pub fsname: Option<String>,

    /// Create the mountpoint directory if it doesn't exist
    #[arg(long)]
    pub create_mountpoint: bool,
}

/// Combines config file defaults with command-line overrides.
fn mount_config(args: &Args, settings: &MountSettings) -> MountConfig {
    MountConfig::default()
        .attr_ttl(Duration::from_millis(args.ttl_ms.unwrap_or(settings.attr_ttl_ms)))
        .fsname(args.fsname.clone().unwrap_or_else(|| settings.fsname.clone()))
        .auto_unmount(settings.auto_unmount && !args.no_auto_unmount)
        .allow_other(settings.allow_other || args.allow_other)
        .read_only(args.read_only)
}

#[instrument(level = "info", name = "cmd::mount", skip_all, fields(mountpoint = %args.mountpoint.display()))]
pub fn execute<S: KvStore + 'static>(
    fs: KvFs<S>,
    args: &Args,
    settings: &MountSettings,
) -> Result<()> {
    let mountpoint = &args.mountpoint;
    if !mountpoint.exists() {
        if args.create_mountpoint {
            std::fs::create_dir_all(mountpoint).with_context(|| {
                format!("Failed to create mountpoint: {}", mountpoint.display())
            })?;
        } else {
            anyhow::bail!(
                "Mountpoint does not exist: {} (use --create-mountpoint)",
                mountpoint.display()
            );
        }
    }
    if !mountpoint.is_dir() {
        anyhow::bail!("Mountpoint is not a directory: {}", mountpoint.display());
    }

    let config = mount_config(args, settings);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("Failed to set signal handler")?;

    let handle = kvfs_fuse::spawn(fs, mountpoint, config)
        .with_context(|| format!("Failed to mount store at {}", mountpoint.display()))?;
    eprintln!(
        "Mounted at {}. Press Ctrl+C to unmount.",
        handle.mountpoint().display()
    );

    // A closed channel also means shutdown
    let _ = rx.recv();

    eprintln!("Unmounting...");
    handle.unmount();
    Ok(())
}
