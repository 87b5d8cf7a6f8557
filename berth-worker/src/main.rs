//! Berth Worker
//!
//! A stateless worker that executes deployments, environment migrations, and
//! resource transfers claimed from the orchestrator.
//!
//! Architecture:
//! - Configuration: settings from environment or defaults
//! - Remote: podman/git shell-out collaborators behind traits
//! - Stages: the deployment stage pipeline with bounded retry
//! - Canary: progressive rollout controller with persisted checkpoints
//! - Monitor: post-deploy validation window and auto-rollback triggers
//! - Migrate: environment migration and resource transfer execution
//! - Poller: work claiming and lifecycle management

mod canary;
mod config;
mod deploy;
mod logs;
mod migrate;
mod monitor;
mod poller;
mod remote;
mod stages;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::migrate::ShellResourceMover;
use crate::poller::WorkPoller;
use crate::remote::{HttpHealthSampler, PodmanRuntime, check_podman_available};
use berth_client::OrchestratorClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Berth Worker");

    // Load configuration
    let config = load_config()?;
    info!(
        "Loaded configuration: worker_id={}, orchestrator_url={}",
        config.worker_id, config.orchestrator_url
    );

    check_podman_available().await?;

    // Initialize orchestrator client
    let client = Arc::new(OrchestratorClient::new(config.orchestrator_url.clone()));

    info!("Orchestrator client initialized");

    // Register with orchestrator (with retry logic)
    info!("Registering with orchestrator");
    register_with_retry(
        &client,
        &config.worker_id,
        config.max_parallel_deployments as i32,
    )
    .await?;
    info!("Worker registered successfully");

    // Wire up collaborators
    let runtime = Arc::new(PodmanRuntime::new());
    let sampler = Arc::new(HttpHealthSampler::new(runtime.clone()));
    let mover = Arc::new(ShellResourceMover::new(config.workspace_base.clone()));

    let poller = WorkPoller::new(config.clone(), client, runtime, sampler, mover);

    info!("Worker initialized successfully");
    info!(
        "Poll interval: {:?}, Log send interval: {:?}",
        config.poll_interval, config.log_send_interval
    );

    // Start polling loop
    info!("Starting work polling loop");
    if let Err(e) = poller.run().await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(_) => {
            info!("Failed to load config from environment, using defaults");
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Register with orchestrator with retry logic and exponential backoff
///
/// Handles the case where the orchestrator may not be ready yet when the
/// worker starts (common in container environments).
async fn register_with_retry(
    client: &Arc<OrchestratorClient>,
    worker_id: &str,
    capacity: i32,
) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.register_worker(worker_id, capacity).await {
            Ok(_) => {
                if attempt > 1 {
                    info!(
                        "Successfully registered with orchestrator after {} attempt(s)",
                        attempt
                    );
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!(
                        "Failed to register with orchestrator after {} attempts",
                        MAX_RETRIES
                    );
                    return Err(anyhow::anyhow!(
                        "Failed to register with orchestrator: {}",
                        e
                    ));
                }

                warn!(
                    "Failed to register with orchestrator (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
