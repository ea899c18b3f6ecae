//! Options applied when a filesystem is opened.

/// Default permission bits of a freshly created root (`rwxrwxr-x`).
pub const DEFAULT_ROOT_PERM: u32 = 0o775;

/// Options for [`KvFs::new`](crate::KvFs::new).
///
/// Owner and permission bits only matter for a fresh store, where they seed
/// the root directory. An existing root is loaded as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsOptions {
    /// Owner of a newly created root directory.
    pub uid: u32,

    /// Group of a newly created root directory.
    pub gid: u32,

    /// Permission bits of a newly created root directory.
    ///
    /// Default: `0o775`.
    pub root_perm: u32,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            root_perm: DEFAULT_ROOT_PERM,
        }
    }
}

impl FsOptions {
    /// Creates options owning the root as `uid:gid`.
    pub fn with_owner(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    #[must_use]
    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = gid;
        self
    }

    /// Sets the root permission bits. Type bits in `perm` are ignored.
    #[must_use]
    pub fn root_perm(mut self, perm: u32) -> Self {
        self.root_perm = perm & crate::layout::mode::PERMISSION_MASK;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = FsOptions::default();
        assert_eq!(options.uid, 0);
        assert_eq!(options.gid, 0);
        assert_eq!(options.root_perm, 0o775);
    }

    #[test]
    fn test_builder_pattern() {
        let options = FsOptions::with_owner(1000, 100).root_perm(0o040_700);
        assert_eq!(options.uid, 1000);
        assert_eq!(options.gid, 100);
        assert_eq!(options.root_perm, 0o700);
    }
}
