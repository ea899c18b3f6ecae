#![deny(unsafe_code)]

mod commands;
mod config;
mod exit_code;

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kvfs_core::{FsError, FsOptions, KvFs, SqliteStore, StoreError};

use crate::commands::{cat, init, ls, mkdir, rm, rmdir, stat, touch, truncate, write};
use crate::config::CliConfig;

#[cfg(feature = "fuse")]
use crate::commands::mount;

/// Command-line interface for kvfs key-value filesystems
#[derive(Parser)]
#[command(name = "kvfs")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Create a new store
    kvfs --store ~/fs.db init

    # Populate it
    kvfs --store ~/fs.db mkdir /docs
    echo hello | kvfs --store ~/fs.db write /docs/hello.txt

    # Browse it
    kvfs --store ~/fs.db ls -l /docs

    # Mount it (store path from KVFS_STORE or the config file)
    kvfs mount /mnt/kvfs
")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the store file
    #[arg(long, env = "KVFS_STORE", global = true)]
    store: Option<PathBuf>,

    /// Configuration file (default: <config dir>/kvfs/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty store
    Init(init::Args),

    /// List directory contents
    Ls(ls::Args),

    /// Write file contents to stdout
    Cat(cat::Args),

    /// Show attributes of a file or directory
    Stat(stat::Args),

    /// Create a directory
    Mkdir(mkdir::Args),

    /// Create an empty file or update its timestamps
    Touch(touch::Args),

    /// Write stdin to a file
    Write(write::Args),

    /// Remove a file
    Rm(rm::Args),

    /// Remove an empty directory
    Rmdir(rmdir::Args),

    /// Set the size of a file
    Truncate(truncate::Args),

    #[cfg(feature = "fuse")]
    /// Mount the store as a filesystem
    Mount(mount::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");

            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        setup_tracing(cli.verbose);
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let store = cli.store.clone().or_else(|| config.store.clone());

    match cli.command {
        Commands::Init(args) => init::execute(&require_store(store)?, &args),

        #[cfg(feature = "fuse")]
        Commands::Mount(args) => {
            let fs = open_fs(&require_store(store)?)?;
            mount::execute(fs, &args, &config.mount)
        }

        Commands::Ls(args) => with_fs(store, |fs| ls::execute(fs, &args)),
        Commands::Cat(args) => with_fs(store, |fs| cat::execute(fs, &args)),
        Commands::Stat(args) => with_fs(store, |fs| stat::execute(fs, &args)),
        Commands::Mkdir(args) => with_fs(store, |fs| mkdir::execute(fs, &args)),
        Commands::Touch(args) => with_fs(store, |fs| touch::execute(fs, &args)),
        Commands::Write(args) => with_fs(store, |fs| write::execute(fs, &args)),
        Commands::Rm(args) => with_fs(store, |fs| rm::execute(fs, &args)),
        Commands::Rmdir(args) => with_fs(store, |fs| rmdir::execute(fs, &args)),
        Commands::Truncate(args) => with_fs(store, |fs| truncate::execute(fs, &args)),
    }
}

fn require_store(store: Option<PathBuf>) -> Result<PathBuf> {
    store.ok_or_else(|| {
        anyhow::anyhow!("No store given: pass --store, set KVFS_STORE, or set `store` in the config file")
    })
}

/// Opens an existing store as a filesystem.
pub fn open_fs(path: &Path) -> Result<KvFs<SqliteStore>> {
    if !path.exists() {
        return Err(anyhow::Error::new(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Store does not exist: {} (run `kvfs init` first)", path.display()),
        )));
    }
    let store = SqliteStore::open(path)
        .with_context(|| format!("Failed to open store: {}", path.display()))?;
    let (uid, gid) = current_owner();
    KvFs::new(store, FsOptions::with_owner(uid, gid))
        .with_context(|| format!("Failed to load filesystem from {}", path.display()))
}

/// Runs a command against the store and closes it afterwards.
fn with_fs<F>(store: Option<PathBuf>, f: F) -> Result<()>
where
    F: FnOnce(&KvFs<SqliteStore>) -> Result<()>,
{
    let path = require_store(store)?;
    let fs = open_fs(&path)?;
    f(&fs)?;
    fs.into_backend()
        .close()
        .with_context(|| format!("Failed to close store: {}", path.display()))
}

/// User and group ids of the running process.
#[cfg(unix)]
pub fn current_owner() -> (u32, u32) {
    (
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
    )
}

#[cfg(not(unix))]
pub fn current_owner() -> (u32, u32) {
    (0, 0)
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}

/// Categorize an error into an exit code by walking the error chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(fs_err) = cause.downcast_ref::<FsError>() {
            return match fs_err {
                FsError::NotFound { .. } => exit_code::NOT_FOUND,
                FsError::Format(_) | FsError::Store(StoreError::NotFound { .. }) => {
                    exit_code::STORE_INVALID
                }
                FsError::Store(StoreError::Io { .. }) => exit_code::GENERAL_ERROR,
                FsError::NameTooLong { .. }
                | FsError::FileTooLarge { .. }
                | FsError::DirectoryNotEmpty { .. }
                | FsError::DirectoryFull { .. }
                | FsError::AlreadyExists { .. }
                | FsError::NotADirectory { .. }
                | FsError::IsADirectory { .. }
                | FsError::InvalidPath { .. } => exit_code::INVALID_OPERATION,
            };
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                io::ErrorKind::AlreadyExists => return exit_code::INVALID_OPERATION,
                io::ErrorKind::Interrupted => return exit_code::CANCELLED,
                _ => {}
            }
        }
    }

    let msg = format!("{e:#}").to_lowercase();
    if msg.contains("mount") {
        exit_code::MOUNT_FAILED
    } else {
        exit_code::GENERAL_ERROR
    }
}
