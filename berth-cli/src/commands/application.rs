//! Application command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use berth_client::OrchestratorClient;
use berth_core::domain::application::Application;
use berth_core::dto::application::CreateApplication;
use uuid::Uuid;

use crate::config::Config;

/// Application subcommands
#[derive(Subcommand)]
pub enum ApplicationCommands {
    /// Register a new application
    Create {
        /// Application name (also the container name)
        name: String,

        /// Git repository URL
        #[arg(long)]
        repo: String,

        /// Branch deployed by default
        #[arg(long, default_value = "main")]
        branch: String,

        /// Target server reference
        #[arg(long)]
        server: String,

        /// Image name without tag (e.g., registry.example.com/web)
        #[arg(long)]
        image: String,

        /// Port the application listens on
        #[arg(long)]
        port: Option<i32>,

        /// Path probed by the smoke test stage
        #[arg(long)]
        smoke_test: Option<String>,
    },
    /// Get application details
    Get {
        /// Application ID
        id: Uuid,
    },
    /// Show lifecycle settings
    Settings {
        /// Application ID
        id: Uuid,
    },
}

pub async fn handle_application_command(
    command: ApplicationCommands,
    config: &Config,
) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        ApplicationCommands::Create {
            name,
            repo,
            branch,
            server,
            image,
            port,
            smoke_test,
        } => {
            let app = client
                .create_application(CreateApplication {
                    name,
                    git_repository: repo,
                    git_branch: Some(branch),
                    server_ref: server,
                    image_name: image,
                    exposed_port: port,
                    smoke_test_path: smoke_test,
                })
                .await?;

            println!("{}", "Application registered:".green().bold());
            print_application(&app);
            Ok(())
        }
        ApplicationCommands::Get { id } => {
            let app = client.get_application(id).await?;
            print_application(&app);
            Ok(())
        }
        ApplicationCommands::Settings { id } => {
            let settings = client.get_settings(id).await?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn print_application(app: &Application) {
    println!("  ID:         {}", app.id.to_string().cyan());
    println!("  Name:       {}", app.name);
    println!("  Repository: {}", app.git_repository.dimmed());
    println!("  Branch:     {}", app.git_branch);
    println!("  Server:     {}", app.server_ref);
    println!("  Image:      {}", app.image_name);
    if let Some(port) = app.exposed_port {
        println!("  Port:       {}", port);
    }
    if let Some(path) = &app.smoke_test_path {
        println!("  Smoke test: {}", path);
    }
    if let Some(last) = app.last_successful_deployment_id {
        println!("  Last good:  {}", last.to_string().dimmed());
    }
}
