//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod application;
mod deployment;
mod migration;
mod rollback;
mod transfer;

pub use application::ApplicationCommands;
pub use deployment::DeploymentCommands;
pub use migration::MigrationCommands;
pub use rollback::RollbackCommands;
pub use transfer::TransferCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Application management
    App {
        #[command(subcommand)]
        command: ApplicationCommands,
    },
    /// Deployment lifecycle
    Deploy {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
    /// Rollback events
    Rollback {
        #[command(subcommand)]
        command: RollbackCommands,
    },
    /// Environment migrations
    Migration {
        #[command(subcommand)]
        command: MigrationCommands,
    },
    /// Resource transfers
    Transfer {
        #[command(subcommand)]
        command: TransferCommands,
    },
}

/// Routes a command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::App { command } => application::handle_application_command(command, config).await,
        Commands::Deploy { command } => deployment::handle_deployment_command(command, config).await,
        Commands::Rollback { command } => rollback::handle_rollback_command(command, config).await,
        Commands::Migration { command } => migration::handle_migration_command(command, config).await,
        Commands::Transfer { command } => transfer::handle_transfer_command(command, config).await,
    }
}
