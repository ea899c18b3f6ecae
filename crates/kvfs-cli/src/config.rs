//! CLI configuration file.
//!
//! ```toml
//! store = "/home/me/fs.db"
//!
//! [mount]
//! attr_ttl_ms = 1000
//! fsname = "kvfs"
//! auto_unmount = true
//! allow_other = false
//! ```
//!
//! Looked up at `$KVFS_CONFIG_DIR/config.toml` if that variable is set,
//! otherwise in the platform config directory. A missing default file means
//! defaults; a missing file passed with `--config` is an error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Store used when neither `--store` nor `KVFS_STORE` is given.
    pub store: Option<PathBuf>,

    pub mount: MountSettings,
}

/// Defaults for `kvfs mount`; flags override them.
#[cfg_attr(not(feature = "fuse"), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MountSettings {
    pub attr_ttl_ms: u64,
    pub fsname: String,
    pub auto_unmount: bool,
    pub allow_other: bool,
}

impl Default for MountSettings {
    fn default() -> Self {
        Self {
            attr_ttl_ms: 1000,
            fsname: "kvfs".to_string(),
            auto_unmount: true,
            allow_other: false,
        }
    }
}

impl CliConfig {
    /// Loads `explicit`, or the default config file if one exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Default location of the config file.
pub fn default_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("KVFS_CONFIG_DIR") {
        return Some(PathBuf::from(dir).join(CONFIG_FILE));
    }
    directories::ProjectDirs::from("", "", "kvfs").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CliConfig::default();
        assert!(config.store.is_none());
        assert_eq!(config.mount.attr_ttl_ms, 1000);
        assert_eq!(config.mount.fsname, "kvfs");
        assert!(config.mount.auto_unmount);
        assert!(!config.mount.allow_other);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = CliConfig::parse(
            r#"
store = "/tmp/fs.db"

[mount]
allow_other = true
"#,
        )
        .unwrap();
        assert_eq!(config.store, Some(PathBuf::from("/tmp/fs.db")));
        assert!(config.mount.allow_other);
        assert_eq!(config.mount.fsname, "kvfs");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(CliConfig::parse("stroe = \"/tmp/fs.db\"").is_err());
    }

    #[test]
    fn test_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kvfs.toml");
        fs::write(&path, "store = \"/data/fs.db\"\n").unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store, Some(PathBuf::from("/data/fs.db")));

        assert!(CliConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
