//! DevPod provider for Kubernetes
//!
//! Each provider command handles one workspace and exits. The heavy lifting
//! lives in `devpod-workspace`; this crate wires flags and environment into
//! [`devpod_common::Options`] and prints command output on stdout.
//!
//! # Modules
//!
//! - [`config`] - Provider options from flags and environment
//! - [`commands`] - One module per provider command

pub mod commands;
pub mod config;

pub use devpod_common::{Error, Result};

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// DevPod provider that runs workspaces as Kubernetes pods
#[derive(Parser, Debug)]
#[command(name = "devpod-provider-kubernetes")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging ("true" to enable)
    #[arg(long, env = "DEVPOD_DEBUG", global = true)]
    pub debug: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update the workspace and wait until it is running
    Run(commands::run::RunArgs),
    /// Start a previously created workspace
    Start(commands::lifecycle::LifecycleArgs),
    /// Stop the workspace pod, keeping its volume
    Stop(commands::lifecycle::LifecycleArgs),
    /// Delete the workspace and everything it owns
    Delete(commands::lifecycle::LifecycleArgs),
    /// Print the workspace's container details as JSON
    Find(commands::find::FindArgs),
    /// Run a command in the workspace container
    Command(commands::command::CommandArgs),
    /// Print the cluster node architecture (arm64 or amd64)
    TargetArchitecture(commands::target_architecture::TargetArchitectureArgs),
    /// Print the manifests a run would create
    RenderTemplate(commands::render_template::RenderTemplateArgs),
    /// Print the workspace container logs
    Logs(commands::logs::LogsArgs),
    /// Succeed only when reprovisioning is enabled
    CanReprovision(commands::can_reprovision::CanReprovisionArgs),
}

impl Cli {
    /// Whether `DEVPOD_DEBUG` asks for debug logging
    pub fn debug_enabled(&self) -> bool {
        devpod_common::options::parse_flag(self.debug.as_deref())
    }

    /// Run the selected command
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        use commands::lifecycle::Lifecycle;

        match self.command {
            Commands::Run(args) => commands::run::run(args, cancel).await,
            Commands::Start(args) => commands::lifecycle::run(Lifecycle::Start, args, cancel).await,
            Commands::Stop(args) => commands::lifecycle::run(Lifecycle::Stop, args, cancel).await,
            Commands::Delete(args) => {
                commands::lifecycle::run(Lifecycle::Delete, args, cancel).await
            }
            Commands::Find(args) => commands::find::run(args, cancel).await,
            Commands::Command(args) => commands::command::run(args, cancel).await,
            Commands::TargetArchitecture(args) => {
                commands::target_architecture::run(args, cancel).await
            }
            Commands::RenderTemplate(args) => commands::render_template::run(args).await,
            Commands::Logs(args) => commands::logs::run(args, cancel).await,
            Commands::CanReprovision(args) => commands::can_reprovision::run(args),
        }
    }
}
