//! Transfer command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use berth_client::OrchestratorClient;
use berth_core::domain::transfer::{ResourceTransfer, TransferStatus};
use berth_core::dto::deployment::DecisionRequest;
use berth_core::dto::transfer::CreateTransfer;
use uuid::Uuid;

use crate::config::Config;

/// Transfer subcommands
#[derive(Subcommand)]
pub enum TransferCommands {
    /// Create a transfer from a JSON request file
    Create {
        /// Path to a CreateTransfer JSON document
        file: String,
    },
    /// Get transfer details
    Get {
        /// Transfer ID
        id: Uuid,
    },
    /// Approve a pending transfer
    Approve {
        /// Transfer ID
        id: Uuid,
    },
    /// Reject a pending transfer
    Reject {
        /// Transfer ID
        id: Uuid,

        /// Rejection note
        #[arg(long)]
        note: Option<String>,
    },
    /// Cancel a transfer before it starts
    Cancel {
        /// Transfer ID
        id: Uuid,
    },
}

pub async fn handle_transfer_command(command: TransferCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        TransferCommands::Create { file } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file))?;
            let req: CreateTransfer =
                serde_json::from_str(&body).context("invalid transfer request")?;

            let transfer = client.create_transfer(req).await?;
            println!("{}", "Transfer created:".green().bold());
            print_transfer(&transfer);
            Ok(())
        }
        TransferCommands::Get { id } => {
            let transfer = client.get_transfer(id).await?;
            print_transfer(&transfer);
            Ok(())
        }
        TransferCommands::Approve { id } => {
            let transfer = client
                .approve_transfer(
                    id,
                    DecisionRequest {
                        decided_by: None,
                        note: None,
                    },
                )
                .await?;
            println!("Transfer {} -> {}", id, colorize_status(transfer.status));
            Ok(())
        }
        TransferCommands::Reject { id, note } => {
            let transfer = client
                .reject_transfer(
                    id,
                    DecisionRequest {
                        decided_by: None,
                        note,
                    },
                )
                .await?;
            println!("Transfer {} -> {}", id, colorize_status(transfer.status));
            Ok(())
        }
        TransferCommands::Cancel { id } => {
            let transfer = client.cancel_transfer(id).await?;
            println!("Transfer {} -> {}", id, colorize_status(transfer.status));
            Ok(())
        }
    }
}

fn print_transfer(transfer: &ResourceTransfer) {
    println!("  ID:       {}", transfer.id.to_string().cyan());
    println!("  Source:   {}", transfer.source);
    println!("  Target:   server {}", transfer.target_server_ref);
    println!("  Mode:     {}", transfer.mode);
    if !transfer.tables.is_empty() {
        println!("  Tables:   {}", transfer.tables.join(", "));
    }
    println!("  Status:   {}", colorize_status(transfer.status));
    if transfer.bytes_total > 0 {
        println!(
            "  Copied:   {} / {} bytes ({}%)",
            transfer.bytes_copied, transfer.bytes_total, transfer.progress
        );
    }
    if let Some(step) = &transfer.current_step {
        println!("  Step:     {}", step);
    }
    if let Some(error) = &transfer.error_message {
        println!("  Error:    {}", error.red());
    }
}

fn colorize_status(status: TransferStatus) -> ColoredString {
    match status {
        TransferStatus::Pending => status.to_string().yellow(),
        TransferStatus::Approved => status.to_string().blue(),
        TransferStatus::InProgress => status.to_string().cyan(),
        TransferStatus::Completed => status.to_string().green(),
        TransferStatus::Failed => status.to_string().red(),
        TransferStatus::Rejected | TransferStatus::Cancelled => status.to_string().dimmed(),
    }
}
