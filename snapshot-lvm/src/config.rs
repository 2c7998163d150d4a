// SPDX-License-Identifier: GPL-3.0-only

//! Driver configuration loaded from TOML
//!
//! ```toml
//! volume_group = "vg0"
//! thin_pool = "pool0"
//! device = "/dev/sdb"
//! fs_type = "ext4"
//! thin_pool_extents = "90%FREE"
//!
//! [retry]
//! max_attempts = 10
//! delay_micros = 100
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};
use crate::filesystem::FsType;
use crate::identity::validate_name;
use crate::lifecycle::DEFAULT_THIN_POOL_EXTENTS;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "SNAPSHOT_LVM_CONFIG";

/// Config file used when neither a flag nor the environment names one
pub const DEFAULT_CONFIG_PATH: &str = "/etc/snapshot-lvm/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error for {path:?}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("invalid config {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_micros: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_micros: DEFAULT_RETRY_DELAY.as_micros() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_micros(self.delay_micros))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    pub volume_group: String,
    pub thin_pool: String,
    /// Physical device backing the volume group
    pub device: Option<String>,
    pub fs_type: FsType,
    pub thin_pool_extents: String,
    pub retry: RetryConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            volume_group: "snapshots".to_string(),
            thin_pool: "snapshots-pool".to_string(),
            device: None,
            fs_type: FsType::Ext4,
            thin_pool_extents: DEFAULT_THIN_POOL_EXTENTS.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let config: DriverConfig = toml::from_str(&raw).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit`, else `$SNAPSHOT_LVM_CONFIG`, else the default
    /// path if it exists, else built-in defaults
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(value) = std::env::var(CONFIG_ENV)
            && !value.trim().is_empty()
        {
            return Self::load(Path::new(&value));
        }

        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            return Self::load(default_path);
        }

        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_name("volume group", &self.volume_group)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;
        validate_name("thin pool", &self.thin_pool)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;

        self.fs_type.validate().map_err(|reason| {
            ConfigError::Invalid(format!("fs_type '{}': {reason}", self.fs_type))
        })?;

        if self.thin_pool_extents.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "thin_pool_extents must not be empty".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_tool_conventions() {
        let config = DriverConfig::default();
        assert_eq!(config.thin_pool_extents, "90%FREE");
        assert_eq!(config.retry.policy(), RetryPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_full_file() {
        let file = write_config(
            r#"
volume_group = "vg0"
thin_pool = "pool0"
device = "/dev/sdb"
fs_type = "xfs"
thin_pool_extents = "80%FREE"

[retry]
max_attempts = 3
delay_micros = 250
"#,
        );

        let config = DriverConfig::load(file.path()).unwrap();
        assert_eq!(config.volume_group, "vg0");
        assert_eq!(config.device.as_deref(), Some("/dev/sdb"));
        assert_eq!(config.fs_type, FsType::Xfs);
        assert_eq!(
            config.retry.policy(),
            RetryPolicy::new(3, Duration::from_micros(250))
        );
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let file = write_config("volume_group = \"vg1\"\n");
        let config = DriverConfig::load(file.path()).unwrap();
        assert_eq!(config.volume_group, "vg1");
        assert_eq!(config.thin_pool, "snapshots-pool");
        assert_eq!(config.retry.max_attempts, 10);
    }

    #[test]
    fn rejects_zero_attempts_and_bad_names() {
        let file = write_config("[retry]\nmax_attempts = 0\n");
        assert!(matches!(
            DriverConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));

        let file = write_config("volume_group = \"vg/0\"\n");
        assert!(matches!(
            DriverConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_fs_type_that_is_not_a_plain_name() {
        for fs_type in ["../../tmp/x", "ext4 "] {
            let config = DriverConfig {
                fs_type: FsType::from(fs_type),
                ..DriverConfig::default()
            };
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }

        let file = write_config("fs_type = \"xfs/../x\"\n");
        assert!(matches!(
            DriverConfig::load(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let file = write_config("volume_grp = \"vg0\"\n");
        assert!(matches!(
            DriverConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn explicit_path_wins_and_missing_file_is_io_error() {
        let missing = Path::new("/nonexistent/snapshot-lvm.toml");
        assert!(matches!(
            DriverConfig::resolve(Some(missing)),
            Err(ConfigError::Io { .. })
        ));
    }
}
