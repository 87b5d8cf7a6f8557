//! Deployment command handlers
//!
//! Enqueueing, inspecting, approving, and cancelling deployments, plus log
//! access and canary promotion.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use berth_client::OrchestratorClient;
use berth_core::domain::deployment::{Deployment, DeploymentStatus, TriggerSource};
use berth_core::dto::deployment::{DecisionRequest, EnqueueDeployment};
use uuid::Uuid;

use crate::config::Config;

/// Deployment subcommands
#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// Enqueue a new deployment
    New {
        /// Application ID
        application_id: Uuid,

        /// Bypass the one-active-deployment guard
        #[arg(long)]
        force: bool,

        /// Commit SHA to deploy
        #[arg(long)]
        commit: Option<String>,
    },
    /// Get deployment details
    Get {
        /// Deployment ID
        id: Uuid,
    },
    /// List deployments for an application
    List {
        /// Application ID
        application_id: Uuid,
    },
    /// Show the latest deployment for an application
    Latest {
        /// Application ID
        application_id: Uuid,
    },
    /// Get deployment logs
    Logs {
        /// Deployment ID
        id: Uuid,

        /// Show entries after this order (for paging)
        #[arg(long, default_value_t = 0)]
        after: i64,
    },
    /// Cancel a deployment
    Cancel {
        /// Deployment ID
        id: Uuid,
    },
    /// Approve a deployment waiting at the gate
    Approve {
        /// Deployment ID
        id: Uuid,

        /// Decision note
        #[arg(long)]
        note: Option<String>,
    },
    /// Reject a deployment waiting at the gate
    Reject {
        /// Deployment ID
        id: Uuid,

        /// Decision note
        #[arg(long)]
        note: Option<String>,
    },
    /// Promote a canary holding at full weight
    Promote {
        /// Deployment ID
        id: Uuid,
    },
}

pub async fn handle_deployment_command(
    command: DeploymentCommands,
    config: &Config,
) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        DeploymentCommands::New {
            application_id,
            force,
            commit,
        } => {
            let deployment = client
                .enqueue_deployment(EnqueueDeployment {
                    application_id,
                    trigger: TriggerSource::Api,
                    triggered_by: None,
                    force,
                    rollback: false,
                    rollback_of: None,
                    is_promotion: false,
                    promoted_from_image: None,
                    pull_request_id: None,
                    commit_sha: commit,
                    commit_message: None,
                })
                .await?;

            println!("{}", "Deployment enqueued:".green().bold());
            print_deployment_summary(&deployment);
            Ok(())
        }
        DeploymentCommands::Get { id } => {
            let deployment = client.get_deployment(id).await?;
            print_deployment_details(&deployment);
            Ok(())
        }
        DeploymentCommands::List { application_id } => {
            let deployments = client.list_deployments(application_id).await?;

            if deployments.is_empty() {
                println!("{}", "No deployments found.".yellow());
            } else {
                println!(
                    "{}",
                    format!("Found {} deployment(s):", deployments.len()).bold()
                );
                println!();
                for deployment in deployments {
                    print_deployment_summary(&deployment);
                }
            }
            Ok(())
        }
        DeploymentCommands::Latest { application_id } => {
            match client.latest_deployment(application_id).await? {
                Some(deployment) => print_deployment_details(&deployment),
                None => println!("{}", "No deployments found.".yellow()),
            }
            Ok(())
        }
        DeploymentCommands::Logs { id, after } => {
            let logs = client.get_logs(id, after, 500).await?;

            if logs.is_empty() {
                println!("{}", "No logs found for this deployment.".yellow());
            } else {
                println!("{}", format!("Logs for deployment {}:", id).bold());
                println!("{}", "─".repeat(80).dimmed());
                for entry in logs {
                    let prefix = format!("[{}]", entry.stage).cyan();
                    if let Some(command) = &entry.command {
                        println!("{} {} {}", prefix, "$".bold(), command);
                    }
                    if !entry.output.is_empty() {
                        println!("{} {}", prefix, entry.output);
                    }
                }
                println!("{}", "─".repeat(80).dimmed());
            }
            Ok(())
        }
        DeploymentCommands::Cancel { id } => {
            let deployment = client.cancel_deployment(id).await?;
            println!(
                "Deployment {} -> {}",
                id,
                colorize_status(deployment.status)
            );
            if deployment.cancel_requested && deployment.status == DeploymentStatus::InProgress {
                println!(
                    "{}",
                    "Cancellation requested; the worker stops at the next stage boundary.".dimmed()
                );
            }
            Ok(())
        }
        DeploymentCommands::Approve { id, note } => {
            let deployment = client
                .approve_deployment(
                    id,
                    DecisionRequest {
                        decided_by: None,
                        note,
                    },
                )
                .await?;
            println!(
                "Deployment {} approved -> {}",
                id,
                colorize_status(deployment.status)
            );
            Ok(())
        }
        DeploymentCommands::Reject { id, note } => {
            let deployment = client
                .reject_deployment(
                    id,
                    DecisionRequest {
                        decided_by: None,
                        note,
                    },
                )
                .await?;
            println!(
                "Deployment {} rejected -> {}",
                id,
                colorize_status(deployment.status)
            );
            Ok(())
        }
        DeploymentCommands::Promote { id } => {
            client.promote_canary(id).await?;
            println!("{}", "Promotion requested.".green());
            Ok(())
        }
    }
}

fn print_deployment_summary(deployment: &Deployment) {
    println!(
        "  {} Deployment {}",
        "▸".cyan(),
        deployment.id.to_string().dimmed()
    );
    println!("    Status:  {}", colorize_status(deployment.status));
    println!(
        "    Created: {}",
        deployment
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if deployment.rollback {
        println!("    {}", "Rollback deployment".yellow());
    }
    println!();
}

fn print_deployment_details(deployment: &Deployment) {
    println!("{}", "Deployment Details:".bold());
    println!("  ID:          {}", deployment.id.to_string().cyan());
    println!(
        "  Application: {}",
        deployment.application_id.to_string().dimmed()
    );
    println!("  Status:      {}", colorize_status(deployment.status));
    println!("  Trigger:     {}", deployment.trigger);
    println!(
        "  Created:     {}",
        deployment.created_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = deployment.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(finished) = deployment.finished_at {
        println!("  Finished:    {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(sha) = &deployment.commit_sha {
        println!("  Commit:      {}", sha.dimmed());
    }
    if let Some(image) = &deployment.image {
        println!("  Image:       {}", image);
    }
    if let Some(worker) = &deployment.worker_id {
        println!("  Worker:      {}", worker.dimmed());
    }
    if let Some(state) = &deployment.canary_state {
        println!(
            "  Canary:      step {} at {}%",
            state.current_step, state.current_weight
        );
    }
    if let Some(stage) = deployment.failed_stage {
        println!("  Failed at:   {}", stage.to_string().red());
    }
    if let Some(error) = &deployment.error_message {
        println!("  Error:       {}", error.red());
    }
}

fn colorize_status(status: DeploymentStatus) -> ColoredString {
    match status {
        DeploymentStatus::Queued => status.to_string().blue(),
        DeploymentStatus::PendingApproval => status.to_string().yellow(),
        DeploymentStatus::InProgress => status.to_string().cyan(),
        DeploymentStatus::Finished => status.to_string().green(),
        DeploymentStatus::Failed => status.to_string().red(),
        DeploymentStatus::Cancelled | DeploymentStatus::Rejected => status.to_string().dimmed(),
    }
}
