//! List command - list directory contents.
//!
//! # Examples
//!
//! ```bash
//! # List root directory
//! kvfs --store fs.db ls
//!
//! # List with details
//! kvfs --store fs.db ls -l /docs
//! ```

use anyhow::Result;
use clap::Args as ClapArgs;
use tracing::instrument;

use kvfs_core::{DirEntry, FileAttributes, FileKind, KvFs, KvStore};

use super::{format_mode, normalize_path};

#[derive(ClapArgs)]
pub struct Args {
    /// Directory to list (default: root)
    #[arg(default_value = "/")]
    pub path: String,

    /// Show detailed information
    #[arg(short, long)]
    pub long: bool,

    /// Include `.` and `..`
    #[arg(short, long)]
    pub all: bool,

    /// One entry per line (script-friendly)
    #[arg(short = '1')]
    pub one_per_line: bool,
}

#[instrument(level = "info", name = "cmd::ls", skip_all, fields(path = %args.path))]
pub fn execute<S: KvStore>(fs: &KvFs<S>, args: &Args) -> Result<()> {
    let path = normalize_path(&args.path);
    let entries = fs.list(&path)?;

    if args.long {
        if args.all {
            let this = fs.getattr(&path)?;
            println!("{}", long_line(".", &this));
        }
        for entry in &entries {
            println!("{}", long_line(&entry.name, &entry.attributes));
        }
    } else {
        print_short_format(&entries, args.all, args.one_per_line);
    }
    Ok(())
}

fn long_line(name: &str, attrs: &FileAttributes) -> String {
    let suffix = if attrs.kind == FileKind::Directory && name != "." {
        "/"
    } else {
        ""
    };
    format!(
        "{} {:>2} {:>5} {:>5} {:>10} {:>12} {name}{suffix}",
        format_mode(attrs.kind, attrs.perm),
        attrs.nlink,
        attrs.uid,
        attrs.gid,
        attrs.size,
        attrs.mtime,
    )
}

fn print_short_format(entries: &[DirEntry], all: bool, one_per_line: bool) {
    let mut names: Vec<String> = Vec::with_capacity(entries.len() + 2);
    if all {
        names.push(".".to_string());
        names.push("..".to_string());
    }
    for entry in entries {
        if entry.attributes.kind == FileKind::Directory {
            names.push(format!("{}/", entry.name));
        } else {
            names.push(entry.name.clone());
        }
    }

    if names.is_empty() {
        return;
    }
    if one_per_line || names.len() > 10 {
        for name in names {
            println!("{name}");
        }
    } else {
        println!("{}", names.join("  "));
    }
}
