// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use crate::config::ConfigError;
use crate::runner::Invocation;

/// Why a single tool attempt did not succeed
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("exit status {0}")]
    ExitStatus(i32),

    #[error("terminated by signal {0}")]
    Signal(i32),

    #[error("failed to spawn: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ToolError {
    /// Exit code reported by the tool, if it exited normally
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ToolError::ExitStatus(code) => Some(*code),
            _ => None,
        }
    }
}

/// A tool invocation that still failed after every retry
///
/// Carries the trimmed output of the last attempt so callers can match on
/// tool-specific messages.
#[derive(Error, Debug)]
#[error("{invocation} failed after {attempts} attempt(s): {source}")]
pub struct CommandError {
    pub invocation: Invocation,
    pub output: String,
    pub attempts: u32,
    #[source]
    pub source: ToolError,
}

/// Error types for volume lifecycle operations
#[derive(Error, Debug)]
pub enum LvmError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Unable to create volume {volume}")]
    CreateVolume {
        volume: String,
        #[source]
        source: CommandError,
    },

    #[error("Unable to activate volume {volume}")]
    ActivateVolume {
        volume: String,
        #[source]
        source: CommandError,
    },

    #[error("Unable to format volume {volume}")]
    FormatVolume {
        volume: String,
        #[source]
        source: CommandError,
    },

    #[error("Unable to unmount volume {volume}")]
    UnmountVolume {
        volume: String,
        #[source]
        source: CommandError,
    },

    #[error("Unable to remove volume {volume}")]
    RemoveVolume {
        volume: String,
        #[source]
        source: CommandError,
    },

    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidName {
        kind: &'static str,
        name: String,
        reason: &'static str,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl LvmError {
    /// The failed tool invocation behind this error, if any
    pub fn command(&self) -> Option<&CommandError> {
        match self {
            LvmError::Command(source)
            | LvmError::CreateVolume { source, .. }
            | LvmError::ActivateVolume { source, .. }
            | LvmError::FormatVolume { source, .. }
            | LvmError::UnmountVolume { source, .. }
            | LvmError::RemoveVolume { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for volume operations
pub type Result<T> = std::result::Result<T, LvmError>;
