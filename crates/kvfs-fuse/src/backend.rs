//! Mounting and unmounting.
//!
//! [`mount`] serves a filesystem on the calling thread until it is unmounted.
//! [`spawn`] serves it on a background session and returns a
//! [`FuseMountHandle`] that unmounts when dropped.

use crate::config::MountConfig;
use crate::filesystem::KvFuse;
use fuser::{BackgroundSession, MountOption};
use kvfs_core::{KvFs, KvStore};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// How long `spawn` waits for the mount syscall to return.
pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(10);

/// Polling interval while waiting for a spawned mount to become active.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a dropped handle waits for its session before detaching the mount.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a mounted filesystem.
///
/// Wraps the fuser `BackgroundSession`. Dropping this handle triggers unmount.
pub struct FuseMountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
}

impl FuseMountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmounts and waits for the session to finish.
    ///
    /// Blocks while files on the mount are still open.
    pub fn unmount(mut self) {
        tracing::info!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem");
        if let Some(session) = self.session.take() {
            session.join();
        }
        tracing::info!(mountpoint = %self.mountpoint.display(), "FUSE unmount successful");
    }
}

impl Drop for FuseMountHandle {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::debug!(mountpoint = %self.mountpoint.display(), "Unmounting on drop");

        // BackgroundSession::join blocks while the kernel still holds open
        // files, so it runs on its own thread with a deadline.
        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            session.join();
            let _ = done_tx.send(());
        });
        if done_rx.recv_timeout(JOIN_TIMEOUT).is_err() {
            tracing::warn!(
                mountpoint = %self.mountpoint.display(),
                timeout = ?JOIN_TIMEOUT,
                "Session did not stop, detaching mount"
            );
            detach_mount(&self.mountpoint);
        }
    }
}

/// Detaches a busy mount with the platform unmount tool.
///
/// Best effort: failures are logged and otherwise ignored.
fn detach_mount(mountpoint: &Path) {
    #[cfg(target_os = "linux")]
    let status = std::process::Command::new("fusermount")
        .arg("-uz")
        .arg(mountpoint)
        .status();
    #[cfg(not(target_os = "linux"))]
    let status = std::process::Command::new("umount")
        .arg("-f")
        .arg(mountpoint)
        .status();

    match status {
        Ok(status) if status.success() => {
            tracing::debug!(mountpoint = %mountpoint.display(), "Mount detached");
        }
        Ok(status) => {
            tracing::warn!(mountpoint = %mountpoint.display(), %status, "Unmount tool failed");
        }
        Err(e) => {
            tracing::warn!(mountpoint = %mountpoint.display(), error = %e, "Unmount tool not runnable");
        }
    }
}

/// Returns whether the FUSE kernel interface looks installed.
pub fn is_available() -> bool {
    #[cfg(target_os = "macos")]
    {
        Path::new("/Library/Filesystems/macfuse.fs").exists()
    }
    #[cfg(target_os = "linux")]
    {
        Path::new("/dev/fuse").exists()
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        false
    }
}

/// Translates a [`MountConfig`] into fuser mount options.
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName(config.fsname.clone()),
        MountOption::Subtype("kvfs".to_string()),
        // Kernel checks permissions against the reported mode bits
        MountOption::DefaultPermissions,
    ];
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    options.push(if config.read_only {
        MountOption::RO
    } else {
        MountOption::RW
    });

    #[cfg(target_os = "macos")]
    options.push(MountOption::CUSTOM("noappledouble".to_string()));

    options
}

/// Mounts `fs` at `mountpoint` and serves requests on the calling thread
/// until the filesystem is unmounted.
pub fn mount<S: KvStore + 'static>(
    fs: KvFs<S>,
    mountpoint: &Path,
    config: MountConfig,
) -> io::Result<()> {
    let options = mount_options(&config);
    tracing::info!(
        mountpoint = %mountpoint.display(),
        fsname = %config.fsname,
        "Starting FUSE mount"
    );
    fuser::mount2(KvFuse::new(fs, config), mountpoint, &options)
}

/// Mounts `fs` at `mountpoint` on a background session.
///
/// Returns once the mount is visible, or fails if the mount syscall does not
/// return within [`MOUNT_TIMEOUT`] (e.g. a stale mount at `mountpoint`).
pub fn spawn<S: KvStore + 'static>(
    fs: KvFs<S>,
    mountpoint: &Path,
    config: MountConfig,
) -> io::Result<FuseMountHandle> {
    if !is_available() {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "FUSE is not available on this system",
        ));
    }

    tracing::info!(
        mountpoint = %mountpoint.display(),
        fsname = %config.fsname,
        "Starting background FUSE mount"
    );
    let options = mount_options(&config);
    let session = spawn_mount_with_timeout(KvFuse::new(fs, config), mountpoint, options)?;
    let handle = FuseMountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
    };
    wait_for_mount(mountpoint, MOUNT_TIMEOUT)?;
    tracing::info!(mountpoint = %mountpoint.display(), "FUSE mount ready");
    Ok(handle)
}

fn spawn_mount_with_timeout<S: KvStore + 'static>(
    fs: KvFuse<S>,
    mountpoint: &Path,
    options: Vec<MountOption>,
) -> io::Result<BackgroundSession> {
    let mountpoint = mountpoint.to_path_buf();
    let (tx, rx) = mpsc::channel();

    std::thread::spawn(move || {
        let result = fuser::spawn_mount2(fs, &mountpoint, &options);
        let _ = tx.send(result);
    });

    match rx.recv_timeout(MOUNT_TIMEOUT) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            "Mount operation timed out - the mountpoint may be on a stale FUSE mount",
        )),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(io::Error::other("Mount thread terminated unexpectedly"))
        }
    }
}

/// Polls until `mountpoint` sits on a different device than its parent.
fn wait_for_mount(mountpoint: &Path, timeout: Duration) -> io::Result<()> {
    use std::os::unix::fs::MetadataExt;

    let parent = mountpoint.parent().unwrap_or(Path::new("/"));
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let (Ok(path_meta), Ok(parent_meta)) =
            (std::fs::metadata(mountpoint), std::fs::metadata(parent))
            && path_meta.dev() != parent_meta.dev()
        {
            tracing::debug!(
                "FUSE mount confirmed active at {} (dev {} != parent dev {})",
                mountpoint.display(),
                path_meta.dev(),
                parent_meta.dev()
            );
            return Ok(());
        }
        std::thread::sleep(POLL_INTERVAL);
    }
    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("FUSE mount did not become ready within {timeout:?}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mount_options() {
        let options = mount_options(&MountConfig::default());
        assert!(options.contains(&MountOption::FSName("kvfs".to_string())));
        assert!(options.contains(&MountOption::Subtype("kvfs".to_string())));
        assert!(options.contains(&MountOption::AutoUnmount));
        assert!(options.contains(&MountOption::DefaultPermissions));
        assert!(options.contains(&MountOption::RW));
        assert!(!options.contains(&MountOption::AllowOther));
    }

    #[test]
    fn test_detach_unmounted_path_is_harmless() {
        let dir = tempfile::TempDir::new().unwrap();
        detach_mount(dir.path());
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_mount_options_follow_config() {
        let config = MountConfig::default()
            .fsname("kvfs:store.db")
            .auto_unmount(false)
            .allow_other(true)
            .read_only(true);
        let options = mount_options(&config);
        assert!(options.contains(&MountOption::FSName("kvfs:store.db".to_string())));
        assert!(!options.contains(&MountOption::AutoUnmount));
        assert!(options.contains(&MountOption::AllowOther));
        assert!(options.contains(&MountOption::RO));
        assert!(!options.contains(&MountOption::RW));
    }
}
