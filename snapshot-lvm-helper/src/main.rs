// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use snapshot_lvm::{
    CreateVolumeRequest, DriverConfig, Executor, FsType, LvmError, SerializationToken,
    SnapshotKind, SystemRunner, VolumeManager, missing_tools,
};

/// Privileged helper for LVM-backed snapshot volumes
#[derive(Parser)]
#[command(name = "snapshot-lvm-helper")]
#[command(about = "Provision and remove thin LVM volumes for container snapshots", long_about = None)]
struct Cli {
    /// Config file (defaults to $SNAPSHOT_LVM_CONFIG, then /etc/snapshot-lvm/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the volume group on a device
    CreateGroup {
        /// Backing block device (defaults to `device` from the config)
        #[arg(long)]
        device: Option<String>,
        #[arg(long)]
        group: Option<String>,
    },
    /// Remove the volume group
    RemoveGroup {
        #[arg(long)]
        group: Option<String>,
    },
    /// Create the thin pool (an existing pool is not an error)
    CreatePool {
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        pool: Option<String>,
    },
    /// Create and activate a volume, formatting it unless it is a snapshot
    CreateVolume {
        name: String,
        /// Virtual size, e.g. 10G (ignored for snapshots)
        #[arg(long, default_value = "10G")]
        size: String,
        /// Snapshot this volume instead of allocating a fresh one
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        fs_type: Option<String>,
        #[arg(long, value_enum, default_value = "active")]
        kind: KindArg,
        #[arg(long)]
        group: Option<String>,
        #[arg(long)]
        pool: Option<String>,
    },
    /// Unmount and remove a volume
    RemoveVolume {
        name: String,
        #[arg(long)]
        group: Option<String>,
    },
    ActivateVolume {
        name: String,
        #[arg(long)]
        group: Option<String>,
    },
    DeactivateVolume {
        name: String,
        #[arg(long)]
        group: Option<String>,
    },
    ActivateGroup {
        #[arg(long)]
        group: Option<String>,
    },
    DeactivateGroup {
        #[arg(long)]
        group: Option<String>,
    },
    /// Report whether the volume group exists
    GroupExists {
        #[arg(long)]
        group: Option<String>,
    },
    /// Report whether a volume exists
    VolumeExists {
        name: String,
        #[arg(long)]
        group: Option<String>,
    },
    /// List required tools missing from PATH
    Preflight {
        #[arg(long)]
        fs_type: Option<String>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum KindArg {
    Active,
    Committed,
    View,
}

impl From<KindArg> for SnapshotKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Active => SnapshotKind::Active,
            KindArg::Committed => SnapshotKind::Committed,
            KindArg::View => SnapshotKind::View,
        }
    }
}

/// JSON document printed on stdout for every command
#[derive(Debug, Serialize)]
struct CommandReport {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CommandReport {
    fn output(output: String) -> Self {
        Self {
            success: true,
            output: Some(output).filter(|o| !o.is_empty()),
            exists: None,
            missing: None,
            error: None,
        }
    }

    fn exists(exists: bool) -> Self {
        Self {
            success: true,
            output: None,
            exists: Some(exists),
            missing: None,
            error: None,
        }
    }

    fn missing(missing: Vec<String>) -> Self {
        Self {
            success: missing.is_empty(),
            output: None,
            exists: None,
            missing: Some(missing),
            error: None,
        }
    }

    fn failure(error: &LvmError) -> Self {
        let output = error
            .command()
            .map(|command| command.output.clone())
            .filter(|o| !o.is_empty());
        Self {
            success: false,
            output,
            exists: None,
            missing: None,
            error: Some(error_chain(error)),
        }
    }

    /// Process exit code: non-zero whenever the report is not a success
    fn exit_code(&self) -> i32 {
        if self.success { 0 } else { 1 }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        // CommandError already renders its tool error inline
        let cause_message = cause.to_string();
        if !message.ends_with(&cause_message) {
            message.push_str(": ");
            message.push_str(&cause_message);
        }
        source = cause.source();
    }
    message
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("snapshot_lvm=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = DriverConfig::resolve(cli.config.as_deref()).context("Failed to load config")?;

    if unsafe { libc::geteuid() } != 0 {
        tracing::warn!("Not running as root; LVM commands will likely fail");
    }

    // One token for the lifetime of the process
    let token = Arc::new(SerializationToken::new());
    let executor = Executor::new(Arc::new(SystemRunner::new()), token, config.retry.policy());
    let manager =
        VolumeManager::new(Arc::new(executor)).with_thin_pool_extents(&config.thin_pool_extents);

    let report = match run(&manager, &config, cli.command) {
        Ok(report) => report,
        Err(error) => {
            tracing::error!("{}", error_chain(&error));
            CommandReport::failure(&error)
        }
    };

    println!("{}", serde_json::to_string(&report)?);
    if !report.success {
        std::process::exit(report.exit_code());
    }
    Ok(())
}

fn run(
    manager: &VolumeManager,
    config: &DriverConfig,
    command: Commands,
) -> Result<CommandReport, LvmError> {
    let group_or_default =
        |group: Option<String>| group.unwrap_or_else(|| config.volume_group.clone());

    let report = match command {
        Commands::CreateGroup { device, group } => {
            let device = device.or_else(|| config.device.clone()).ok_or_else(|| {
                LvmError::InvalidRequest("no device given and none configured".to_string())
            })?;
            CommandReport::output(manager.create_group(&device, &group_or_default(group))?)
        }
        Commands::RemoveGroup { group } => {
            CommandReport::output(manager.remove_group(&group_or_default(group))?)
        }
        Commands::CreatePool { group, pool } => {
            let pool = pool.unwrap_or_else(|| config.thin_pool.clone());
            CommandReport::output(manager.create_thin_pool(&group_or_default(group), &pool)?)
        }
        Commands::CreateVolume {
            name,
            size,
            parent,
            fs_type,
            kind,
            group,
            pool,
        } => {
            let request = CreateVolumeRequest {
                group: group_or_default(group),
                name,
                pool: Some(pool.unwrap_or_else(|| config.thin_pool.clone())),
                size: Some(size),
                fs_type: fs_type
                    .map(FsType::from)
                    .unwrap_or_else(|| config.fs_type.clone()),
                parent,
                kind: kind.into(),
            };
            CommandReport::output(manager.create_volume(&request)?)
        }
        Commands::RemoveVolume { name, group } => {
            CommandReport::output(manager.remove_volume(&group_or_default(group), &name)?)
        }
        Commands::ActivateVolume { name, group } => {
            CommandReport::output(manager.activate_volume(&group_or_default(group), &name)?)
        }
        Commands::DeactivateVolume { name, group } => {
            CommandReport::output(manager.deactivate_volume(&group_or_default(group), &name)?)
        }
        Commands::ActivateGroup { group } => {
            CommandReport::output(manager.activate_group(&group_or_default(group))?)
        }
        Commands::DeactivateGroup { group } => {
            CommandReport::output(manager.deactivate_group(&group_or_default(group))?)
        }
        Commands::GroupExists { group } => {
            CommandReport::exists(manager.group_exists(&group_or_default(group))?)
        }
        Commands::VolumeExists { name, group } => {
            CommandReport::exists(manager.volume_exists(&group_or_default(group), &name)?)
        }
        Commands::Preflight { fs_type } => {
            let fs_type = fs_type
                .map(FsType::from)
                .unwrap_or_else(|| config.fs_type.clone());
            CommandReport::missing(missing_tools(&fs_type))
        }
    };

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_snapshot_creation() {
        let cli = Cli::try_parse_from([
            "snapshot-lvm-helper",
            "create-volume",
            "lv2",
            "--parent",
            "lv1",
            "--kind",
            "view",
        ])
        .unwrap();

        match cli.command {
            Commands::CreateVolume { name, parent, .. } => {
                assert_eq!(name, "lv2");
                assert_eq!(parent.as_deref(), Some("lv1"));
            }
            _ => panic!("expected create-volume"),
        }
    }

    #[test]
    fn failure_report_includes_cause_chain() {
        let error = LvmError::InvalidRequest("no device".to_string());
        let report = CommandReport::failure(&error);
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("Invalid request: no device"));
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn preflight_with_missing_tools_exits_non_zero() {
        let report = CommandReport::missing(vec!["lvcreate".to_string()]);
        assert!(!report.success);
        assert_eq!(report.exit_code(), 1);

        let report = CommandReport::missing(Vec::new());
        assert!(report.success);
        assert_eq!(report.exit_code(), 0);
    }
}
