// SPDX-License-Identifier: GPL-3.0-only

use tracing::warn;
use which::which;

use crate::filesystem::FsType;

/// Tools every lifecycle operation may invoke
pub const LVM_TOOLS: &[&str] = &[
    "vgcreate", "vgremove", "vgchange", "vgs", "lvcreate", "lvremove", "lvchange", "lvs", "umount",
];

/// Programs needed for `fs_type` volumes that are not on `PATH`
pub fn missing_tools(fs_type: &FsType) -> Vec<String> {
    let mkfs = fs_type.mkfs_program();
    let missing: Vec<String> = LVM_TOOLS
        .iter()
        .map(|tool| tool.to_string())
        .chain(std::iter::once(mkfs))
        .filter(|tool| which(tool).is_err())
        .collect();

    if !missing.is_empty() {
        warn!("Missing tools: {}", missing.join(", "));
    }
    missing
}
