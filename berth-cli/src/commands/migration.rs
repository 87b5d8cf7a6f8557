//! Migration command handlers
//!
//! Creation takes a JSON request file; the captured configs inside are too
//! structured for flags.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use berth_client::OrchestratorClient;
use berth_core::domain::migration::{EnvironmentMigration, MigrationStatus};
use berth_core::domain::resource::{ResourceKind, ResourceRef};
use berth_core::dto::deployment::DecisionRequest;
use berth_core::dto::migration::CreateMigration;
use uuid::Uuid;

use crate::config::Config;

/// Migration subcommands
#[derive(Subcommand)]
pub enum MigrationCommands {
    /// Create a migration from a JSON request file
    Create {
        /// Path to a CreateMigration JSON document
        file: String,
    },
    /// Get migration details
    Get {
        /// Migration ID
        id: Uuid,
    },
    /// List all migrations
    List,
    /// Approve a pending migration
    Approve {
        /// Migration ID
        id: Uuid,
    },
    /// Reject a pending migration
    Reject {
        /// Migration ID
        id: Uuid,

        /// Rejection note
        #[arg(long)]
        note: Option<String>,
    },
    /// Cancel a migration before it starts
    Cancel {
        /// Migration ID
        id: Uuid,
    },
    /// Roll a migration back from its snapshot
    Rollback {
        /// Migration ID
        id: Uuid,
    },
    /// Show migration history for a resource
    History {
        /// Resource kind (application, service, database)
        kind: String,

        /// Resource ID
        id: Uuid,
    },
}

pub async fn handle_migration_command(command: MigrationCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        MigrationCommands::Create { file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file))?;
            let req: CreateMigration =
                serde_json::from_str(&body).context("invalid migration request")?;

            let migration = client.create_migration(req).await?;
            println!("{}", "Migration created:".green().bold());
            print_migration(&migration);
            Ok(())
        }
        MigrationCommands::Get { id } => {
            let migration = client.get_migration(id).await?;
            print_migration(&migration);
            Ok(())
        }
        MigrationCommands::List => {
            let migrations = client.list_migrations().await?;

            if migrations.is_empty() {
                println!("{}", "No migrations found.".yellow());
            } else {
                println!(
                    "{}",
                    format!("Found {} migration(s):", migrations.len()).bold()
                );
                println!();
                for migration in migrations {
                    println!(
                        "  {} {} {} -> server {} [{}]",
                        "▸".cyan(),
                        migration.id.to_string().dimmed(),
                        migration.source,
                        migration.target_server_ref,
                        colorize_status(migration.status)
                    );
                }
            }
            Ok(())
        }
        MigrationCommands::Approve { id } => {
            let migration = client
                .approve_migration(
                    id,
                    DecisionRequest {
                        decided_by: None,
                        note: None,
                    },
                )
                .await?;
            println!("Migration {} -> {}", id, colorize_status(migration.status));
            Ok(())
        }
        MigrationCommands::Reject { id, note } => {
            let migration = client
                .reject_migration(
                    id,
                    DecisionRequest {
                        decided_by: None,
                        note,
                    },
                )
                .await?;
            println!("Migration {} -> {}", id, colorize_status(migration.status));
            Ok(())
        }
        MigrationCommands::Cancel { id } => {
            let migration = client.cancel_migration(id).await?;
            println!("Migration {} -> {}", id, colorize_status(migration.status));
            Ok(())
        }
        MigrationCommands::Rollback { id } => {
            let result = client.rollback_migration(id).await?;
            println!("{}", "Migration rolled back:".green().bold());
            print_migration(&result.migration);
            println!(
                "  Snapshot captured {}",
                result.snapshot.captured_at.format("%Y-%m-%d %H:%M:%S")
            );
            Ok(())
        }
        MigrationCommands::History { kind, id } => {
            let kind = parse_kind(&kind)?;
            let history = client.migration_history(ResourceRef::new(kind, id)).await?;

            if history.is_empty() {
                println!("{}", "No history found for this resource.".yellow());
            } else {
                println!("{}", format!("Found {} version(s):", history.len()).bold());
                for entry in history {
                    println!(
                        "  {} {} (migration {})",
                        entry
                            .created_at
                            .format("%Y-%m-%d %H:%M:%S")
                            .to_string()
                            .dimmed(),
                        entry.version.cyan(),
                        entry.migration_id.to_string().dimmed()
                    );
                }
            }
            Ok(())
        }
    }
}

fn parse_kind(s: &str) -> Result<ResourceKind> {
    match s {
        "application" => Ok(ResourceKind::Application),
        "service" => Ok(ResourceKind::Service),
        "database" => Ok(ResourceKind::Database),
        other => anyhow::bail!(
            "unknown resource kind '{}' (expected application, service, or database)",
            other
        ),
    }
}

fn print_migration(migration: &EnvironmentMigration) {
    println!("  ID:       {}", migration.id.to_string().cyan());
    println!("  Source:   {}", migration.source);
    println!("  Target:   server {}", migration.target_server_ref);
    println!("  Status:   {}", colorize_status(migration.status));
    println!("  Progress: {}%", migration.progress);
    if let Some(step) = &migration.current_step {
        println!("  Step:     {}", step);
    }
    if !migration.linked_resources.is_empty() {
        println!("  Linked:");
        for resource in &migration.linked_resources {
            println!("    - {}", resource);
        }
    }
    if let Some(error) = &migration.error_message {
        println!("  Error:    {}", error.red());
    }
}

fn colorize_status(status: MigrationStatus) -> ColoredString {
    match status {
        MigrationStatus::Pending => status.to_string().yellow(),
        MigrationStatus::Approved => status.to_string().blue(),
        MigrationStatus::InProgress => status.to_string().cyan(),
        MigrationStatus::Completed => status.to_string().green(),
        MigrationStatus::Failed => status.to_string().red(),
        MigrationStatus::Rejected | MigrationStatus::Cancelled => status.to_string().dimmed(),
        MigrationStatus::RolledBack => status.to_string().magenta(),
    }
}
