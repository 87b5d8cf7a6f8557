//! Work poller
//!
//! Polls the orchestrator for claimable deployments, migrations, and
//! transfers. Each claimed item runs in its own task; a semaphore caps how
//! many run in parallel.

use anyhow::Result;
use berth_client::OrchestratorClient;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::deploy::DeploymentRunner;
use crate::migrate::{MigrationRunner, ResourceMover, TransferRunner};
use crate::remote::{ContainerRuntime, HealthSampler};

pub struct WorkPoller {
    config: Config,
    client: Arc<OrchestratorClient>,
    runtime: Arc<dyn ContainerRuntime>,
    sampler: Arc<dyn HealthSampler>,
    mover: Arc<dyn ResourceMover>,
    semaphore: Arc<Semaphore>,
}

impl WorkPoller {
    pub fn new(
        config: Config,
        client: Arc<OrchestratorClient>,
        runtime: Arc<dyn ContainerRuntime>,
        sampler: Arc<dyn HealthSampler>,
        mover: Arc<dyn ResourceMover>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_deployments));
        Self {
            config,
            client,
            runtime,
            sampler,
            mover,
            semaphore,
        }
    }

    /// Starts the polling loop. Never returns under normal operation.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting work poller (interval: {:?})",
            self.config.poll_interval
        );

        let _heartbeat_handle = self.start_heartbeat_loop();

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for claimable work");

            if let Err(e) = self.poll_once().await {
                error!("Error during poll cycle: {:#}", e);
            }
        }
    }

    /// One poll cycle: claim as much work as free permits allow.
    async fn poll_once(&self) -> Result<()> {
        // Deployments first; migrations and transfers fill leftover capacity.
        while let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            match self.client.claim_deployment(&self.config.worker_id).await {
                Ok(Some(claimed)) => {
                    info!(
                        "Claimed deployment {} for application {}",
                        claimed.deployment.id, claimed.application.name
                    );
                    self.spawn_deployment(claimed, permit);
                }
                Ok(None) => {
                    drop(permit);
                    break;
                }
                Err(e) => {
                    drop(permit);
                    return Err(anyhow::anyhow!("failed to claim deployment: {}", e));
                }
            }
        }

        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            match self.client.claim_migration(&self.config.worker_id).await {
                Ok(Some(migration)) => {
                    info!("Claimed migration {}", migration.id);
                    self.spawn_migration(migration, permit);
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    warn!("Failed to claim migration: {}", e);
                }
            }
        }

        if let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            match self.client.claim_transfer(&self.config.worker_id).await {
                Ok(Some(transfer)) => {
                    info!("Claimed transfer {}", transfer.id);
                    self.spawn_transfer(transfer, permit);
                }
                Ok(None) => drop(permit),
                Err(e) => {
                    drop(permit);
                    warn!("Failed to claim transfer: {}", e);
                }
            }
        }

        Ok(())
    }

    fn spawn_deployment(
        &self,
        claimed: berth_core::dto::deployment::ClaimedDeployment,
        _permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let runner = DeploymentRunner::new(
            self.config.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.runtime),
            Arc::clone(&self.sampler),
        );
        let deployment_id = claimed.deployment.id;

        tokio::spawn(async move {
            if let Err(e) = runner.run(claimed).await {
                error!("Deployment {} runner error: {:#}", deployment_id, e);
            }
            // Permit is released when dropped
        });
    }

    fn spawn_migration(
        &self,
        migration: berth_core::domain::migration::EnvironmentMigration,
        _permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let runner = MigrationRunner::new(Arc::clone(&self.client), Arc::clone(&self.mover));
        let migration_id = migration.id;

        tokio::spawn(async move {
            if let Err(e) = runner.run(migration).await {
                error!("Migration {} runner error: {:#}", migration_id, e);
            }
        });
    }

    fn spawn_transfer(
        &self,
        transfer: berth_core::domain::transfer::ResourceTransfer,
        _permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let runner = TransferRunner::new(Arc::clone(&self.client), Arc::clone(&self.mover));
        let transfer_id = transfer.id;

        tokio::spawn(async move {
            if let Err(e) = runner.run(transfer).await {
                error!("Transfer {} runner error: {:#}", transfer_id, e);
            }
        });
    }

    /// Starts a background task to send heartbeats
    fn start_heartbeat_loop(&self) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(&self.client);
        let worker_id = self.config.worker_id.clone();
        let heartbeat_interval = Duration::from_secs(30);

        tokio::spawn(async move {
            let mut ticker = time::interval(heartbeat_interval);

            loop {
                ticker.tick().await;

                debug!("Sending heartbeat");

                if let Err(e) = client.worker_heartbeat(&worker_id).await {
                    warn!("Failed to send heartbeat: {:#}", e);
                }
            }
        })
    }
}
