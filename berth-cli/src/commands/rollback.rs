//! Rollback command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use berth_client::OrchestratorClient;
use berth_core::domain::rollback::{RollbackEventStatus, RollbackReason};
use berth_core::dto::rollback::TriggerRollback;
use uuid::Uuid;

use crate::config::Config;

/// Rollback subcommands
#[derive(Subcommand)]
pub enum RollbackCommands {
    /// Manually trigger a rollback to the last known-good image
    Trigger {
        /// Application ID
        application_id: Uuid,

        /// The deployment being rolled back
        #[arg(long)]
        deployment: Uuid,
    },
    /// Show rollback history for an application
    History {
        /// Application ID
        application_id: Uuid,
    },
}

pub async fn handle_rollback_command(command: RollbackCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        RollbackCommands::Trigger {
            application_id,
            deployment,
        } => {
            let outcome = client
                .trigger_rollback(
                    application_id,
                    TriggerRollback {
                        failed_deployment_id: deployment,
                        reason: RollbackReason::Manual,
                        metrics: Default::default(),
                        triggered_by: None,
                    },
                )
                .await?;

            match outcome.rollback_deployment_id {
                Some(id) => {
                    println!("{}", "Rollback enqueued:".green().bold());
                    println!("  Event:      {}", outcome.event.id.to_string().cyan());
                    println!("  Deployment: {}", id.to_string().cyan());
                }
                None => {
                    println!("{}", "Rollback could not be started:".red().bold());
                    println!(
                        "  {}",
                        outcome
                            .event
                            .error_message
                            .as_deref()
                            .unwrap_or("no known-good deployment")
                            .red()
                    );
                }
            }
            Ok(())
        }
        RollbackCommands::History { application_id } => {
            let events = client.rollback_history(application_id).await?;

            if events.is_empty() {
                println!("{}", "No rollback events found.".yellow());
                return Ok(());
            }

            println!("{}", format!("Found {} event(s):", events.len()).bold());
            println!();
            for event in events {
                let status = match event.status {
                    RollbackEventStatus::Triggered => event.status.to_string().yellow(),
                    RollbackEventStatus::Completed => event.status.to_string().green(),
                    RollbackEventStatus::Failed => event.status.to_string().red(),
                };

                println!("  {} Event {}", "▸".cyan(), event.id.to_string().dimmed());
                println!("    Reason:    {}", event.reason);
                println!("    Status:    {}", status);
                println!(
                    "    Failed:    {}",
                    event.failed_deployment_id.to_string().dimmed()
                );
                if let Some(rollback_id) = event.rollback_deployment_id {
                    println!("    Rollback:  {}", rollback_id.to_string().dimmed());
                }
                println!(
                    "    Triggered: {}",
                    event
                        .triggered_at
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                        .dimmed()
                );
                println!();
            }
            Ok(())
        }
    }
}
