// SPDX-License-Identifier: GPL-3.0-only

//! Volume lifecycle protocols
//!
//! Each operation is a short ordered sequence of tool invocations issued
//! through the shared [`Executor`]. The first unexpected failure is wrapped
//! with the step that failed and returned immediately; nothing is rolled back.
//!
//! Volume states as seen by callers:
//! `absent -> created -> activated -> (formatted | snapshot content) -> absent`.
//! Activation state is never cached; removal always unmounts first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LvmError, Result};
use crate::executor::Executor;
use crate::filesystem::FsType;
use crate::identity::{VolumeIdentity, validate_name};
use crate::policy;

/// Default `--extents` argument for thin-pool creation
pub const DEFAULT_THIN_POOL_EXTENTS: &str = "90%FREE";

/// Snapshot kind reported by the snapshot framework
///
/// Carried for the caller's bookkeeping; read-only mounting of views is left
/// to the mount step, so no volume permission flags are derived from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    #[default]
    Active,
    Committed,
    View,
}

/// Inputs for [`VolumeManager::create_volume`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    pub group: String,
    pub name: String,
    /// Thin pool to allocate from; required unless `parent` is set
    pub pool: Option<String>,
    /// Virtual size such as `1G`; required unless `parent` is set
    pub size: Option<String>,
    pub fs_type: FsType,
    /// Snapshot source in the same group
    pub parent: Option<String>,
    #[serde(default)]
    pub kind: SnapshotKind,
}

impl CreateVolumeRequest {
    /// A fresh thin volume that will be formatted
    pub fn thin(group: &str, pool: &str, name: &str, size: &str, fs_type: FsType) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            pool: Some(pool.to_string()),
            size: Some(size.to_string()),
            fs_type,
            parent: None,
            kind: SnapshotKind::Active,
        }
    }

    /// A snapshot of `parent`, which keeps the parent's filesystem
    pub fn snapshot(group: &str, parent: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            pool: None,
            size: None,
            fs_type: FsType::Ext4,
            parent: Some(parent.to_string()),
            kind: SnapshotKind::Active,
        }
    }

    pub fn with_kind(mut self, kind: SnapshotKind) -> Self {
        self.kind = kind;
        self
    }

    /// Tool arguments for the create step, validated before anything runs
    fn create_args(&self, id: &VolumeIdentity) -> Result<Vec<String>> {
        match self.parent.as_deref() {
            Some(parent) => {
                let source = id.sibling(parent)?;
                Ok(vec![
                    "--name".to_string(),
                    id.volume().to_string(),
                    "--snapshot".to_string(),
                    source.lvm_path(),
                ])
            }
            None => {
                let pool = self.pool.as_deref().ok_or_else(|| {
                    LvmError::InvalidRequest(format!(
                        "thin pool required for new volume {}",
                        id.lvm_path()
                    ))
                })?;
                validate_name("thin pool", pool)?;

                let size = self
                    .size
                    .as_deref()
                    .filter(|size| !size.trim().is_empty())
                    .ok_or_else(|| {
                        LvmError::InvalidRequest(format!(
                            "virtual size required for new volume {}",
                            id.lvm_path()
                        ))
                    })?;

                check_fs_type(&self.fs_type, id)?;

                Ok(vec![
                    "--virtualsize".to_string(),
                    size.to_string(),
                    "--name".to_string(),
                    id.volume().to_string(),
                    "--thin".to_string(),
                    format!("{}/{}", id.group(), pool),
                ])
            }
        }
    }
}

/// Drives volume group, thin pool, and logical volume lifecycles
///
/// Cloning is cheap; clones share the same executor and therefore the same
/// serialization token.
#[derive(Clone)]
pub struct VolumeManager {
    executor: Arc<Executor>,
    thin_pool_extents: String,
}

impl VolumeManager {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            thin_pool_extents: DEFAULT_THIN_POOL_EXTENTS.to_string(),
        }
    }

    /// Override the `--extents` value used for thin pools
    pub fn with_thin_pool_extents(mut self, extents: impl Into<String>) -> Self {
        self.thin_pool_extents = extents.into();
        self
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    /// `vgcreate <group> <device>`
    pub fn create_group(&self, device: &str, group: &str) -> Result<String> {
        validate_name("volume group", group)?;
        if device.is_empty() {
            return Err(LvmError::InvalidRequest(
                "device required for volume group".to_string(),
            ));
        }

        let output = self.executor.run("vgcreate", [group, device])?;
        info!("Created volume group {group} on {device}");
        Ok(output)
    }

    /// `vgremove -y <group>`
    pub fn remove_group(&self, group: &str) -> Result<String> {
        validate_name("volume group", group)?;
        let output = self.executor.run("vgremove", ["-y", group])?;
        info!("Removed volume group {group}");
        Ok(output)
    }

    /// Create a thin pool over the configured share of the group's free space
    ///
    /// An existing pool of that name counts as success.
    pub fn create_thin_pool(&self, group: &str, pool: &str) -> Result<String> {
        validate_name("volume group", group)?;
        validate_name("thin pool", pool)?;

        match self.executor.run(
            "lvcreate",
            [
                "--thinpool",
                pool,
                "--extents",
                self.thin_pool_extents.as_str(),
                group,
            ],
        ) {
            Ok(output) => {
                info!("Created thin pool {group}/{pool}");
                Ok(output)
            }
            Err(error) if policy::pool_already_exists(&error) => {
                debug!("Thin pool {group}/{pool} already exists");
                Ok(error.output)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Create, activate, and (for fresh volumes) format a logical volume
    ///
    /// Snapshot volumes are never formatted. Returns the create step's output.
    pub fn create_volume(&self, request: &CreateVolumeRequest) -> Result<String> {
        let id = VolumeIdentity::new(&request.group, &request.name)?;
        let args = request.create_args(&id)?;
        debug!(kind = ?request.kind, "Creating volume {}", id.lvm_path());

        let output = self
            .executor
            .run("lvcreate", args)
            .map_err(|source| LvmError::CreateVolume {
                volume: id.lvm_path(),
                source,
            })?;

        self.executor
            .run("lvchange", activation_args(&id.lvm_path(), true))
            .map_err(|source| LvmError::ActivateVolume {
                volume: id.lvm_path(),
                source,
            })?;

        if request.parent.is_none() {
            self.format(&id, &request.fs_type)?;
        }

        info!("Volume {} ready", id.lvm_path());
        Ok(output)
    }

    /// Lay down a filesystem on an existing, active volume
    pub fn format_volume(&self, group: &str, volume: &str, fs_type: &FsType) -> Result<String> {
        let id = VolumeIdentity::new(group, volume)?;
        check_fs_type(fs_type, &id)?;
        self.format(&id, fs_type)
    }

    fn format(&self, id: &VolumeIdentity, fs_type: &FsType) -> Result<String> {
        let mut args = fs_type.mkfs_flags();
        args.push(id.device_path().to_string_lossy().into_owned());

        self.executor
            .run(&fs_type.mkfs_program(), args)
            .map_err(|source| LvmError::FormatVolume {
                volume: id.lvm_path(),
                source,
            })
    }

    /// Unmount every mount of the volume, then remove it
    ///
    /// A volume that is not mounted is removed directly; any other unmount
    /// failure aborts before `lvremove` runs.
    pub fn remove_volume(&self, group: &str, volume: &str) -> Result<String> {
        let id = VolumeIdentity::new(group, volume)?;
        let device = id.device_path().to_string_lossy().into_owned();

        if let Err(error) = self.executor.run(
            "umount",
            ["--lazy", "--force", "--all-targets", device.as_str()],
        ) {
            if !policy::not_mounted(&error) {
                return Err(LvmError::UnmountVolume {
                    volume: id.lvm_path(),
                    source: error,
                });
            }
            debug!("{device} was not mounted");
        }

        let output = self
            .executor
            .run("lvremove", ["-y".to_string(), id.lvm_path()])
            .map_err(|source| LvmError::RemoveVolume {
                volume: id.lvm_path(),
                source,
            })?;
        info!("Removed volume {}", id.lvm_path());
        Ok(output)
    }

    /// `lvchange -K <group>/<volume> -a y|n`
    pub fn set_volume_active(&self, group: &str, volume: &str, active: bool) -> Result<String> {
        let id = VolumeIdentity::new(group, volume)?;
        Ok(self
            .executor
            .run("lvchange", activation_args(&id.lvm_path(), active))?)
    }

    pub fn activate_volume(&self, group: &str, volume: &str) -> Result<String> {
        self.set_volume_active(group, volume, true)
    }

    pub fn deactivate_volume(&self, group: &str, volume: &str) -> Result<String> {
        self.set_volume_active(group, volume, false)
    }

    /// `vgchange -K <group> -a y|n`
    pub fn set_group_active(&self, group: &str, active: bool) -> Result<String> {
        validate_name("volume group", group)?;
        Ok(self
            .executor
            .run("vgchange", activation_args(group, active))?)
    }

    pub fn activate_group(&self, group: &str) -> Result<String> {
        self.set_group_active(group, true)
    }

    pub fn deactivate_group(&self, group: &str) -> Result<String> {
        self.set_group_active(group, false)
    }

    /// Raw `vgs` listing for `group`; empty output means not found
    pub fn check_group(&self, group: &str) -> Result<String> {
        validate_name("volume group", group)?;
        Ok(self
            .executor
            .run("vgs", [group, "--options", "vg_name", "--no-headings"])?)
    }

    /// Raw `lvs` listing for the volume; empty output means not found
    pub fn check_volume(&self, group: &str, volume: &str) -> Result<String> {
        let id = VolumeIdentity::new(group, volume)?;
        Ok(self.executor.run(
            "lvs",
            [
                id.lvm_path(),
                "--options".to_string(),
                "lv_name".to_string(),
                "--no-heading".to_string(),
            ],
        )?)
    }

    pub fn group_exists(&self, group: &str) -> Result<bool> {
        Ok(!self.check_group(group)?.is_empty())
    }

    pub fn volume_exists(&self, group: &str, volume: &str) -> Result<bool> {
        Ok(!self.check_volume(group, volume)?.is_empty())
    }
}

fn check_fs_type(fs_type: &FsType, id: &VolumeIdentity) -> Result<()> {
    fs_type.validate().map_err(|reason| {
        LvmError::InvalidRequest(format!(
            "filesystem type '{fs_type}' for volume {}: {reason}",
            id.lvm_path()
        ))
    })
}

fn activation_args(target: &str, active: bool) -> Vec<String> {
    vec![
        "-K".to_string(),
        target.to_string(),
        "-a".to_string(),
        if active { "y" } else { "n" }.to_string(),
    ]
}
