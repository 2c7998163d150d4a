// SPDX-License-Identifier: GPL-3.0-only

//! Tool-specific failures that are treated as success
//!
//! Only the conditions named here are tolerated; every other failure
//! propagates to the caller.

use crate::error::CommandError;

/// `lvcreate --thinpool` exit code when the pool is already present
pub const THIN_POOL_EXISTS_EXIT_CODE: i32 = 5;

/// `umount` output fragment when the device has no mounts
pub const NOT_MOUNTED_MARKER: &str = "not mounted";

/// Thin-pool creation failed only because the pool already exists
pub fn pool_already_exists(error: &CommandError) -> bool {
    error.source.exit_code() == Some(THIN_POOL_EXISTS_EXIT_CODE)
}

/// Unmount failed only because nothing was mounted
pub fn not_mounted(error: &CommandError) -> bool {
    error.output.contains(NOT_MOUNTED_MARKER)
}
