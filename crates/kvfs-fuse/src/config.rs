//! Mount configuration for the FUSE adapter.

use std::time::Duration;

/// Default time-to-live for attributes and entries handed to the kernel.
pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

/// Default filesystem name shown in the mount table.
pub const DEFAULT_FSNAME: &str = "kvfs";

/// Configuration options for a FUSE mount.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Time-to-live for cached attributes and entries.
    ///
    /// Default: 1 second.
    pub attr_ttl: Duration,

    /// Name reported as the mount source.
    pub fsname: String,

    /// Unmount automatically when the process exits.
    pub auto_unmount: bool,

    /// Let users other than the mounting user access the mount.
    ///
    /// Requires `user_allow_other` in `/etc/fuse.conf`.
    pub allow_other: bool,

    /// Mount read-only.
    pub read_only: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_TTL,
            fsname: DEFAULT_FSNAME.to_string(),
            auto_unmount: true,
            allow_other: false,
            read_only: false,
        }
    }
}

impl MountConfig {
    /// Sets the cache TTL for attributes and entries.
    #[must_use]
    pub fn attr_ttl(mut self, ttl: Duration) -> Self {
        self.attr_ttl = ttl;
        self
    }

    #[must_use]
    pub fn fsname(mut self, name: impl Into<String>) -> Self {
        self.fsname = name.into();
        self
    }

    #[must_use]
    pub fn auto_unmount(mut self, enabled: bool) -> Self {
        self.auto_unmount = enabled;
        self
    }

    #[must_use]
    pub fn allow_other(mut self, enabled: bool) -> Self {
        self.allow_other = enabled;
        self
    }

    #[must_use]
    pub fn read_only(mut self, enabled: bool) -> Self {
        self.read_only = enabled;
        self
    }
}
