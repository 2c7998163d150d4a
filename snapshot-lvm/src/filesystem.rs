// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Filesystem laid down on a fresh (non-snapshot) volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FsType {
    Ext4,
    Xfs,
    /// Any other `mkfs.<name>` helper, invoked without extra flags
    Other(String),
}

impl FsType {
    pub fn name(&self) -> &str {
        match self {
            FsType::Ext4 => "ext4",
            FsType::Xfs => "xfs",
            FsType::Other(name) => name,
        }
    }

    /// Check that the name selects a plain `mkfs.<name>` helper from `PATH`
    pub fn validate(&self) -> Result<(), &'static str> {
        let name = self.name();
        if name.is_empty() {
            return Err("must not be empty");
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err("allowed characters are a-z 0-9");
        }
        Ok(())
    }

    /// `mkfs.<name>`
    pub fn mkfs_program(&self) -> String {
        format!("mkfs.{}", self.name())
    }

    /// Flags placed before the device path
    pub fn mkfs_flags(&self) -> Vec<String> {
        let flags: &[&str] = match self {
            // Skip discard and lazy init so the volume is ready immediately.
            FsType::Ext4 => &["-E", "nodiscard,lazy_itable_init=0,lazy_journal_init=0"],
            // Overwrite any stale signature; no discard.
            FsType::Xfs => &["-f", "-K"],
            FsType::Other(_) => &[],
        };
        flags.iter().map(|flag| flag.to_string()).collect()
    }
}

impl From<&str> for FsType {
    fn from(value: &str) -> Self {
        match value {
            "ext4" => FsType::Ext4,
            "xfs" => FsType::Xfs,
            other => FsType::Other(other.to_string()),
        }
    }
}

impl From<String> for FsType {
    fn from(value: String) -> Self {
        FsType::from(value.as_str())
    }
}

impl From<FsType> for String {
    fn from(value: FsType) -> Self {
        value.name().to_string()
    }
}

impl FromStr for FsType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FsType::from(s))
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext4_disables_discard_and_lazy_init() {
        let flags = FsType::from("ext4").mkfs_flags();
        assert_eq!(flags[0], "-E");
        assert!(flags[1].contains("nodiscard"));
        assert!(flags[1].contains("lazy_itable_init=0"));
        assert!(flags[1].contains("lazy_journal_init=0"));
    }

    #[test]
    fn xfs_forces_overwrite() {
        let flags = FsType::from("xfs").mkfs_flags();
        assert!(flags.contains(&"-f".to_string()));
        assert!(flags.contains(&"-K".to_string()));
    }

    #[test]
    fn unknown_filesystem_gets_no_flags() {
        let fs = FsType::from("btrfs");
        assert!(fs.mkfs_flags().is_empty());
        assert_eq!(fs.mkfs_program(), "mkfs.btrfs");
    }

    #[test]
    fn only_plain_lowercase_names_are_valid() {
        for good in ["ext4", "xfs", "btrfs", "vfat", "ext3"] {
            assert!(FsType::from(good).validate().is_ok(), "{good:?}");
        }
        for bad in ["", "ext4 ", "../../tmp/x", "Ext4", "ext4;id", "fat-32"] {
            assert!(FsType::from(bad).validate().is_err(), "{bad:?}");
        }
    }

    #[test]
    fn serializes_as_plain_name() {
        let json = serde_json::to_string(&FsType::Xfs).unwrap();
        assert_eq!(json, "\"xfs\"");
        let parsed: FsType = serde_json::from_str("\"vfat\"").unwrap();
        assert_eq!(parsed, FsType::Other("vfat".to_string()));
    }
}
