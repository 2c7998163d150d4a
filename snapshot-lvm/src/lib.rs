// SPDX-License-Identifier: GPL-3.0-only

//! Thin-provisioned LVM volumes for container filesystem snapshots
//!
//! This crate drives the external LVM toolset (`vgcreate`, `lvcreate`,
//! `lvchange`, `mkfs.*`, ...) on behalf of a snapshot framework:
//! - [`Executor`]: runs one tool invocation at a time process-wide, with
//!   bounded retry
//! - [`VolumeManager`]: ordered lifecycle protocols (create, activate,
//!   format, unmount, remove) built on the executor
//! - [`DriverConfig`]: TOML configuration for the helper binary
//!
//! The serialization token is explicit state: create one
//! [`SerializationToken`] at startup and hand it to every [`Executor`].

pub mod config;
pub mod error;
pub mod executor;
pub mod filesystem;
pub mod identity;
pub mod lifecycle;
pub mod policy;
pub mod preflight;
pub mod runner;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;

pub use config::{ConfigError, DriverConfig, RetryConfig};
pub use error::{CommandError, LvmError, Result, ToolError};
pub use executor::{Executor, RetryPolicy, SerializationToken};
pub use filesystem::FsType;
pub use identity::{VolumeIdentity, validate_name};
pub use lifecycle::{CreateVolumeRequest, SnapshotKind, VolumeManager};
pub use preflight::missing_tools;
pub use runner::{Invocation, SystemRunner, ToolOutput, ToolRunner};
#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedResponse, ScriptedRunner};
