//! Deployment runner
//!
//! Owns one claimed deployment from first stage to terminal report. Logs
//! stream to the orchestrator in the background while stages run; the
//! cancellation flag is observed at stage boundaries.

use anyhow::{Context, Result};
use berth_core::domain::deployment::{DeploymentStage, DeploymentStatus};
use berth_core::domain::log::NewLogEntry;
use berth_core::dto::deployment::{ClaimedDeployment, CompleteDeployment};
use berth_core::error::LifecycleError;
use berth_client::OrchestratorClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::canary::{CanaryController, CanaryOutcome};
use crate::config::Config;
use crate::logs::{InMemoryLogBuffer, LogBuffer};
use crate::monitor::HealthMonitor;
use crate::remote::{ContainerRuntime, HealthSampler};
use crate::stages::StageRunner;

pub struct DeploymentRunner {
    config: Config,
    client: Arc<OrchestratorClient>,
    runtime: Arc<dyn ContainerRuntime>,
    sampler: Arc<dyn HealthSampler>,
}

impl DeploymentRunner {
    pub fn new(
        config: Config,
        client: Arc<OrchestratorClient>,
        runtime: Arc<dyn ContainerRuntime>,
        sampler: Arc<dyn HealthSampler>,
    ) -> Self {
        Self {
            config,
            client,
            runtime,
            sampler,
        }
    }

    /// Runs a claimed deployment to its terminal state.
    pub async fn run(&self, claimed: ClaimedDeployment) -> Result<()> {
        let deployment = &claimed.deployment;
        let application = &claimed.application;
        let settings = &claimed.settings;

        info!(
            "Executing deployment {} for application {} ({})",
            deployment.id, application.name, application.id
        );

        let image = effective_image(&claimed);
        let workspace = format!("{}/{}", self.config.workspace_base, deployment.id);

        let logs = InMemoryLogBuffer::new(0);
        let (log_stop, log_sender) = self.spawn_log_sender(deployment.id, logs.clone());

        let stage_runner = StageRunner::new(
            Arc::clone(&self.runtime),
            Arc::clone(&self.sampler),
            self.config.stage_retry_limit,
            self.config.stage_retry_delay,
        );

        let canary_enabled =
            settings.canary.enabled && !deployment.rollback && !deployment.is_promotion;

        let mut outcome = CompleteDeployment {
            status: DeploymentStatus::Finished,
            failed_stage: None,
            error_message: None,
            image: Some(image.clone()),
        };

        'pipeline: for stage in DeploymentStage::ALL {
            // Cooperative cancellation, checked between stages only.
            if self.cancel_requested(deployment.id).await {
                info!("Deployment {} cancelled at stage {}", deployment.id, stage);
                logs.log_stdout(stage.as_str(), "cancellation requested, stopping");
                outcome.status = DeploymentStatus::Cancelled;
                outcome.image = None;
                break 'pipeline;
            }

            // A canary rollout replaces the plain deploy and its health gate;
            // the rollout itself is metric-gated at every step.
            if canary_enabled && stage == DeploymentStage::Deploy {
                let controller = CanaryController::new(
                    Arc::clone(&self.client),
                    Arc::clone(&self.runtime),
                    Arc::clone(&self.sampler),
                );

                match controller
                    .run(deployment, application, &settings.canary, &image, &logs)
                    .await
                {
                    Ok(CanaryOutcome::Promoted) => continue,
                    Ok(CanaryOutcome::Cancelled) => {
                        outcome.status = DeploymentStatus::Cancelled;
                        outcome.image = None;
                        break 'pipeline;
                    }
                    Err(e) => {
                        self.record_failure(&mut outcome, stage, &e, &logs);
                        break 'pipeline;
                    }
                }
            }

            if canary_enabled && stage == DeploymentStage::HealthCheck {
                continue;
            }

            if let Err(e) = stage_runner
                .run_stage(stage, deployment, application, &workspace, &image, &logs)
                .await
            {
                self.record_failure(&mut outcome, stage, &e, &logs);
                break 'pipeline;
            }
        }

        // Stop streaming; the sender finishes any in-flight send and flushes
        // the tail before exiting.
        let _ = log_stop.send(true);
        if let Err(e) = log_sender.await {
            warn!("Log sender for {} exited abnormally: {}", deployment.id, e);
        }

        let status = outcome.status;
        self.client
            .complete_deployment(deployment.id, outcome)
            .await
            .context("Failed to report deployment completion")?;

        info!("Deployment {} completed: {}", deployment.id, status);

        // Successful forward deployments enter their validation window.
        // Rollback deployments are exempt so a bad known-good image cannot
        // trigger a rollback chain.
        if status == DeploymentStatus::Finished && !deployment.rollback {
            self.spawn_monitor(claimed);
        }

        Ok(())
    }

    fn record_failure(
        &self,
        outcome: &mut CompleteDeployment,
        stage: DeploymentStage,
        err: &LifecycleError,
        logs: &InMemoryLogBuffer,
    ) {
        error!("Stage {} failed: {}", stage, err);
        logs.log_stderr(stage.as_str(), err.to_string());

        outcome.status = DeploymentStatus::Failed;
        outcome.failed_stage = Some(stage);
        outcome.error_message = Some(err.to_string());
        outcome.image = None;
    }

    async fn cancel_requested(&self, deployment_id: Uuid) -> bool {
        match self.client.get_deployment(deployment_id).await {
            Ok(d) => d.cancel_requested,
            Err(e) => {
                warn!("Failed to refresh deployment {}: {}", deployment_id, e);
                false
            }
        }
    }

    /// Background task shipping buffered logs on an interval. The returned
    /// sender stops the task; it drains one last batch before exiting so no
    /// buffered entries are lost.
    fn spawn_log_sender(
        &self,
        deployment_id: Uuid,
        logs: InMemoryLogBuffer,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let client = Arc::clone(&self.client);
        let period = self.config.log_send_interval;
        let (stop_tx, stop_rx) = watch::channel(false);

        let handle = tokio::spawn(pump_logs(logs, period, stop_rx, move |batch| {
            let client = Arc::clone(&client);
            async move {
                debug!(
                    "Sending {} log entries for deployment {}",
                    batch.len(),
                    deployment_id
                );
                if let Err(e) = client.append_logs(deployment_id, batch).await {
                    error!("Failed to send logs for {}: {}", deployment_id, e);
                }
            }
        }));

        (stop_tx, handle)
    }

    /// Detached validation-window monitor for a finished deployment.
    fn spawn_monitor(&self, claimed: ClaimedDeployment) {
        let monitor = HealthMonitor::new(
            Arc::clone(&self.client),
            Arc::clone(&self.sampler),
            self.config.monitor_poll_interval,
        );

        tokio::spawn(async move {
            monitor
                .watch(
                    claimed.deployment.id,
                    &claimed.application,
                    &claimed.settings.rollback,
                )
                .await;
        });
    }
}

/// Ships buffered batches on an interval until told to stop, then flushes
/// whatever is left before exiting.
async fn pump_logs<F, Fut>(
    logs: InMemoryLogBuffer,
    period: Duration,
    mut stop: watch::Receiver<bool>,
    mut flush: F,
) where
    F: FnMut(Vec<NewLogEntry>) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let batch = logs.drain();
                if !batch.is_empty() {
                    flush(batch).await;
                }
            }
            _ = stop.changed() => {
                let batch = logs.drain();
                if !batch.is_empty() {
                    flush(batch).await;
                }
                return;
            }
        }
    }
}

/// Image reference this deployment runs: prebuilt for rollbacks and
/// promotions, otherwise a fresh tag derived from the commit or the
/// deployment id.
fn effective_image(claimed: &ClaimedDeployment) -> String {
    if let Some(image) = &claimed.deployment.promoted_from_image {
        return image.clone();
    }

    let tag = claimed
        .deployment
        .commit_sha
        .as_deref()
        .map(|sha| sha.chars().take(12).collect::<String>())
        .unwrap_or_else(|| claimed.deployment.id.simple().to_string());

    format!("{}:{}", claimed.application.image_name, tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::application::Application;
    use berth_core::domain::deployment::{Deployment, TriggerSource};
    use berth_core::domain::settings::ApplicationSettings;

    fn claimed(commit_sha: Option<&str>, promoted: Option<&str>) -> ClaimedDeployment {
        let app_id = Uuid::new_v4();
        ClaimedDeployment {
            deployment: Deployment {
                id: Uuid::new_v4(),
                application_id: app_id,
                status: DeploymentStatus::InProgress,
                trigger: TriggerSource::Api,
                triggered_by: None,
                requires_approval: false,
                approval: None,
                rollback: false,
                rollback_of: None,
                is_promotion: false,
                promoted_from_image: promoted.map(String::from),
                image: None,
                canary_state: None,
                canary_promotion_requested: false,
                pull_request_id: None,
                commit_sha: commit_sha.map(String::from),
                commit_message: None,
                worker_id: Some("w1".into()),
                cancel_requested: false,
                failed_stage: None,
                error_message: None,
                created_at: chrono::Utc::now(),
                started_at: Some(chrono::Utc::now()),
                finished_at: None,
            },
            application: Application {
                id: app_id,
                name: "web".into(),
                git_repository: "https://example.com/web.git".into(),
                git_branch: "main".into(),
                server_ref: "prod-1".into(),
                image_name: "registry.example.com/web".into(),
                exposed_port: Some(8080),
                smoke_test_path: None,
                last_successful_deployment_id: None,
                created_at: chrono::Utc::now(),
            },
            settings: ApplicationSettings::defaults_for(app_id),
        }
    }

    #[test]
    fn test_effective_image_uses_commit_sha() {
        let c = claimed(Some("0123456789abcdef0123"), None);
        assert_eq!(
            effective_image(&c),
            "registry.example.com/web:0123456789ab"
        );
    }

    #[test]
    fn test_effective_image_prefers_prebuilt() {
        let c = claimed(Some("abc"), Some("registry.example.com/web:v41"));
        assert_eq!(effective_image(&c), "registry.example.com/web:v41");
    }

    #[test]
    fn test_effective_image_falls_back_to_deployment_id() {
        let c = claimed(None, None);
        let image = effective_image(&c);
        assert!(image.starts_with("registry.example.com/web:"));
        assert_eq!(
            image.trim_start_matches("registry.example.com/web:").len(),
            32
        );
    }

    #[tokio::test]
    async fn test_log_sender_flushes_tail_on_stop() {
        let logs = InMemoryLogBuffer::new(0);
        let (stop_tx, stop_rx) = watch::channel(false);
        let (sink, mut received) = tokio::sync::mpsc::unbounded_channel();

        // An hour-long period keeps the interval out of the way after its
        // immediate first tick; everything buffered later must come out of
        // the stop-path flush.
        let pump = tokio::spawn(pump_logs(
            logs.clone(),
            Duration::from_secs(3600),
            stop_rx,
            move |batch| {
                let sink = sink.clone();
                async move {
                    let _ = sink.send(batch);
                }
            },
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        logs.log_stdout("finish", "tail one");
        logs.log_stdout("finish", "tail two");

        stop_tx.send(true).unwrap();
        pump.await.unwrap();

        let batch = received.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(received.try_recv().is_err());
    }
}
