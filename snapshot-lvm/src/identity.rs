// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use crate::error::{LvmError, Result};

/// Check a volume group, logical volume, or pool name before it reaches a
/// tool command line.
///
/// Accepts the LVM name charset `[A-Za-z0-9+_.-]`; rejects empty names,
/// names starting with `-`, and `.`/`..`.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let invalid = |reason| LvmError::InvalidName {
        kind,
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.starts_with('-') {
        return Err(invalid("must not start with '-'"));
    }
    if name == "." || name == ".." {
        return Err(invalid("must not be '.' or '..'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '_' | '.' | '-'))
    {
        return Err(invalid("allowed characters are A-Z a-z 0-9 + _ . -"));
    }

    Ok(())
}

/// A logical volume addressed by its group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeIdentity {
    group: String,
    volume: String,
}

impl VolumeIdentity {
    pub fn new(group: &str, volume: &str) -> Result<Self> {
        validate_name("volume group", group)?;
        validate_name("logical volume", volume)?;
        Ok(Self {
            group: group.to_string(),
            volume: volume.to_string(),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn volume(&self) -> &str {
        &self.volume
    }

    /// `<group>/<volume>`, as LVM tools address it
    pub fn lvm_path(&self) -> String {
        format!("{}/{}", self.group, self.volume)
    }

    /// `/dev/<group>/<volume>`
    pub fn device_path(&self) -> PathBuf {
        PathBuf::from("/dev").join(&self.group).join(&self.volume)
    }

    /// A sibling volume in the same group
    pub fn sibling(&self, volume: &str) -> Result<Self> {
        Self::new(&self.group, volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_device_and_lvm_paths() {
        let id = VolumeIdentity::new("vg0", "lv1").unwrap();
        assert_eq!(id.device_path(), PathBuf::from("/dev/vg0/lv1"));
        assert_eq!(id.lvm_path(), "vg0/lv1");
        assert_eq!(id.sibling("lv2").unwrap().lvm_path(), "vg0/lv2");
    }

    #[test]
    fn rejects_unsafe_names() {
        for bad in ["", "-y", "..", "a/b", "lv 1", "lv;rm", "$(x)"] {
            assert!(
                matches!(
                    validate_name("logical volume", bad),
                    Err(LvmError::InvalidName { .. })
                ),
                "{bad:?} should be rejected"
            );
        }
        for good in ["lv1", "snap_2.x", "pool-0", "a+b"] {
            assert!(validate_name("logical volume", good).is_ok());
        }
    }
}
