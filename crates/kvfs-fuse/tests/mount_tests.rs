//! Kernel-level tests through a real FUSE mount.
//!
//! Run: `cargo test -p kvfs-fuse --features fuse-tests`

#![cfg(all(unix, feature = "fuse-tests"))]

use kvfs_core::{FsOptions, KvFs, MemoryStore};
use kvfs_fuse::{spawn, FuseMountHandle, MountConfig};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Skips the test when FUSE is not installed.
macro_rules! skip_if_no_fuse {
    () => {
        if !kvfs_fuse::is_available() {
            eprintln!("Skipping test: FUSE not available");
            return;
        }
    };
}

/// A freshly mounted in-memory filesystem.
struct TestMount {
    handle: Option<FuseMountHandle>,
    mount_path: PathBuf,
    _temp: TempDir,
}

impl TestMount {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mount_path = temp.path().join("mnt");
        fs::create_dir(&mount_path).unwrap();

        // SAFETY: getuid/getgid never fail
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        let kvfs = KvFs::new(MemoryStore::new(), FsOptions::with_owner(uid, gid)).unwrap();
        let config = MountConfig::default().fsname("kvfs-test");
        let handle = spawn(kvfs, &mount_path, config).unwrap();

        // Mount can report ready before the first create() is served
        thread::sleep(Duration::from_millis(100));

        Self {
            handle: Some(handle),
            mount_path,
            _temp: temp,
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.mount_path.join(rel)
    }

    fn root(&self) -> &Path {
        &self.mount_path
    }
}

impl Drop for TestMount {
    fn drop(&mut self) {
        drop(self.handle.take());
    }
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Namespace
// =============================================================================

#[test]
fn test_mkdir_create_and_list() {
    skip_if_no_fuse!();
    let mount = TestMount::new();

    fs::create_dir(mount.path("docs")).unwrap();
    fs::write(mount.path("docs/a.txt"), b"a").unwrap();
    fs::write(mount.path("docs/b.txt"), b"b").unwrap();

    assert_eq!(names(&mount.path("docs")), vec!["a.txt", "b.txt"]);
    assert!(mount.path("docs").is_dir());
    assert!(mount.path("docs/a.txt").is_file());
}

#[test]
fn test_remove_entries() {
    skip_if_no_fuse!();
    let mount = TestMount::new();

    fs::create_dir(mount.path("d")).unwrap();
    fs::write(mount.path("d/f"), b"x").unwrap();

    let err = fs::remove_dir(mount.path("d")).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::ENOTEMPTY));

    fs::remove_file(mount.path("d/f")).unwrap();
    fs::remove_dir(mount.path("d")).unwrap();
    assert!(names(mount.root()).is_empty());
    assert!(!mount.path("d").exists());
}

#[test]
fn test_create_existing_dir_fails() {
    skip_if_no_fuse!();
    let mount = TestMount::new();

    fs::create_dir(mount.path("d")).unwrap();
    let err = fs::create_dir(mount.path("d")).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::EEXIST));
}

// =============================================================================
// Content
// =============================================================================

#[test]
fn test_write_read_multi_block() {
    skip_if_no_fuse!();
    let mount = TestMount::new();

    #[allow(clippy::cast_possible_truncation)]
    let data: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(mount.path("big.bin"), &data).unwrap();

    assert_eq!(fs::read(mount.path("big.bin")).unwrap(), data);
    assert_eq!(fs::metadata(mount.path("big.bin")).unwrap().len(), 100_000);
}

#[test]
fn test_sparse_write_reads_zeros() {
    skip_if_no_fuse!();
    let mount = TestMount::new();

    let mut file = fs::File::create(mount.path("sparse")).unwrap();
    file.seek(SeekFrom::Start(5000)).unwrap();
    file.write_all(b"tail").unwrap();
    drop(file);

    let content = fs::read(mount.path("sparse")).unwrap();
    assert_eq!(content.len(), 5004);
    assert!(content[..5000].iter().all(|&b| b == 0));
    assert_eq!(&content[5000..], b"tail");
}

#[test]
fn test_truncate_through_set_len() {
    skip_if_no_fuse!();
    let mount = TestMount::new();

    fs::write(mount.path("t"), b"abc").unwrap();
    let file = fs::OpenOptions::new()
        .write(true)
        .open(mount.path("t"))
        .unwrap();
    file.set_len(10).unwrap();
    drop(file);

    let mut content = Vec::new();
    fs::File::open(mount.path("t"))
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, b"abc\0\0\0\0\0\0\0");
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_chmod_roundtrip() {
    skip_if_no_fuse!();
    let mount = TestMount::new();

    fs::write(mount.path("f"), b"x").unwrap();
    fs::set_permissions(mount.path("f"), fs::Permissions::from_mode(0o600)).unwrap();

    let mode = fs::metadata(mount.path("f")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
