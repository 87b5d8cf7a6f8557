//! Canary controller
//!
//! Drives a progressive rollout through its configured weight steps. Every
//! transition is checkpointed to the orchestrator so a restarted worker can
//! resume a rollout exactly where it stopped, including mid-hold.

use berth_core::domain::application::Application;
use berth_core::domain::canary::CanaryState;
use berth_core::domain::deployment::Deployment;
use berth_core::domain::settings::CanarySettings;
use berth_core::error::LifecycleError;
use berth_client::OrchestratorClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::logs::InMemoryLogBuffer;
use crate::remote::{ContainerRuntime, HealthSampler};

/// How often a holding canary re-samples metrics and checks for promote or
/// cancel requests.
const HOLD_POLL_INTERVAL: Duration = Duration::from_secs(10);

const STAGE: &str = "deploy";

/// Outcome of a completed canary rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanaryOutcome {
    Promoted,
    Cancelled,
}

pub struct CanaryController {
    client: Arc<OrchestratorClient>,
    runtime: Arc<dyn ContainerRuntime>,
    sampler: Arc<dyn HealthSampler>,
}

impl CanaryController {
    pub fn new(
        client: Arc<OrchestratorClient>,
        runtime: Arc<dyn ContainerRuntime>,
        sampler: Arc<dyn HealthSampler>,
    ) -> Self {
        Self {
            client,
            runtime,
            sampler,
        }
    }

    /// Runs (or resumes) the rollout for one deployment.
    ///
    /// On abort the candidate is torn down, traffic returns fully to the
    /// stable container, and `CanaryAborted` is returned so the runner marks
    /// the deployment failed.
    pub async fn run(
        &self,
        deployment: &Deployment,
        application: &Application,
        settings: &CanarySettings,
        image: &str,
        logs: &InMemoryLogBuffer,
    ) -> Result<CanaryOutcome, LifecycleError> {
        let mut state = match &deployment.canary_state {
            Some(state) => {
                info!(
                    "Resuming canary for deployment {} at step {} ({}%)",
                    deployment.id, state.current_step, state.current_weight
                );
                state.clone()
            }
            None => {
                let state = CanaryState::new(
                    settings.steps.clone(),
                    application.name.clone(),
                    format!("{}-canary", application.name),
                );

                logs.log_stdout(
                    STAGE,
                    format!("starting canary candidate {}", state.candidate_container),
                );
                let out = self
                    .runtime
                    .run_container(&state.candidate_container, image, None)
                    .await?;
                if !out.success() {
                    return Err(LifecycleError::StageExecution {
                        stage: berth_core::domain::deployment::DeploymentStage::Deploy,
                        exit_code: out.exit_code,
                        message: out.stderr.trim().to_string(),
                    });
                }

                self.checkpoint(deployment.id, &state).await;
                state
            }
        };

        loop {
            // Shift traffic to this step's weight if not there yet.
            if state.current_weight != state.target_weight() || state.step_started_at.is_none() {
                let weight = state.target_weight();
                logs.log_stdout(STAGE, format!("shifting {}% traffic to candidate", weight));

                self.runtime
                    .set_traffic_weight(&state.stable_container, &state.candidate_container, weight)
                    .await?;

                state.begin_step(chrono::Utc::now());
                self.checkpoint(deployment.id, &state).await;
            }

            // Hold at this weight, watching metrics.
            self.hold(deployment, application, settings, &state, logs)
                .await?;

            if state.advance() {
                self.checkpoint(deployment.id, &state).await;
                continue;
            }

            // Full weight reached.
            if settings.auto_promote {
                logs.log_stdout(STAGE, "canary healthy at 100%, auto-promoting");
                self.promote(application, &state, image, logs).await?;
                return Ok(CanaryOutcome::Promoted);
            }

            logs.log_stdout(STAGE, "canary holding at 100%, waiting for manual promote");
            return self
                .wait_for_promotion(deployment, application, &state, image, logs)
                .await;
        }
    }

    /// Holds the current step for the configured wait, sampling metrics.
    async fn hold(
        &self,
        deployment: &Deployment,
        application: &Application,
        settings: &CanarySettings,
        state: &CanaryState,
        logs: &InMemoryLogBuffer,
    ) -> Result<(), LifecycleError> {
        let step_wait = chrono::Duration::minutes(settings.step_wait_minutes);

        loop {
            let remaining = state.remaining_hold(step_wait, chrono::Utc::now());
            if remaining <= chrono::Duration::zero() {
                return Ok(());
            }

            let sleep = HOLD_POLL_INTERVAL.min(
                remaining
                    .to_std()
                    .unwrap_or(HOLD_POLL_INTERVAL),
            );
            tokio::time::sleep(sleep).await;

            if self.cancel_requested(deployment.id).await {
                logs.log_stdout(STAGE, "cancellation requested, aborting canary");
                self.abort(state, logs).await;
                return Err(LifecycleError::CanaryAborted(
                    "cancelled during rollout".into(),
                ));
            }

            let snapshot = match self.sampler.sample(application).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!("Canary metric sample failed: {}", e);
                    continue;
                }
            };

            let unhealthy =
                matches!(snapshot.health_status.as_deref(), Some(s) if s != "healthy");
            let rate_breached = snapshot
                .error_rate
                .is_some_and(|rate| rate > settings.error_rate_threshold);

            if unhealthy || rate_breached {
                let detail = if unhealthy {
                    format!(
                        "candidate unhealthy at {}% ({})",
                        state.current_weight,
                        snapshot.health_status.as_deref().unwrap_or("unknown")
                    )
                } else {
                    format!(
                        "error rate {:.3} above threshold {:.3} at {}%",
                        snapshot.error_rate.unwrap_or_default(),
                        settings.error_rate_threshold,
                        state.current_weight
                    )
                };

                logs.log_stderr(STAGE, detail.clone());
                self.abort(state, logs).await;
                return Err(LifecycleError::CanaryAborted(detail));
            }
        }
    }

    /// Holds at 100% until an operator requests promotion or cancellation.
    async fn wait_for_promotion(
        &self,
        deployment: &Deployment,
        application: &Application,
        state: &CanaryState,
        image: &str,
        logs: &InMemoryLogBuffer,
    ) -> Result<CanaryOutcome, LifecycleError> {
        loop {
            tokio::time::sleep(HOLD_POLL_INTERVAL).await;

            let current = match self.client.get_deployment(deployment.id).await {
                Ok(d) => d,
                Err(e) => {
                    warn!("Failed to refresh deployment {}: {}", deployment.id, e);
                    continue;
                }
            };

            if current.cancel_requested {
                logs.log_stdout(STAGE, "cancellation requested at full weight");
                self.abort(state, logs).await;
                return Ok(CanaryOutcome::Cancelled);
            }

            if current.canary_promotion_requested {
                logs.log_stdout(STAGE, "promotion requested, promoting canary");
                self.promote(application, state, image, logs).await?;
                return Ok(CanaryOutcome::Promoted);
            }
        }
    }

    /// Makes the candidate the new stable container.
    async fn promote(
        &self,
        application: &Application,
        state: &CanaryState,
        image: &str,
        logs: &InMemoryLogBuffer,
    ) -> Result<(), LifecycleError> {
        let out = self
            .runtime
            .run_container(&application.name, image, application.exposed_port)
            .await?;
        if !out.success() {
            return Err(LifecycleError::StageExecution {
                stage: berth_core::domain::deployment::DeploymentStage::Deploy,
                exit_code: out.exit_code,
                message: out.stderr.trim().to_string(),
            });
        }

        let _ = self
            .runtime
            .set_traffic_weight(&state.stable_container, &state.candidate_container, 0)
            .await;
        let _ = self
            .runtime
            .stop_container(&state.candidate_container)
            .await;

        logs.log_stdout(STAGE, "canary promoted to stable");
        Ok(())
    }

    /// Returns all traffic to stable and tears the candidate down.
    async fn abort(&self, state: &CanaryState, logs: &InMemoryLogBuffer) {
        if let Err(e) = self
            .runtime
            .set_traffic_weight(&state.stable_container, &state.candidate_container, 0)
            .await
        {
            warn!("Failed to reset traffic weight during abort: {}", e);
        }

        if let Err(e) = self.runtime.stop_container(&state.candidate_container).await {
            warn!("Failed to stop canary candidate: {}", e);
        }

        logs.log_stdout(STAGE, "traffic restored to stable container");
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

    async fn checkpoint(&self, deployment_id: Uuid, state: &CanaryState) {
        if let Err(e) = self.client.update_canary_state(deployment_id, state).await {
            warn!(
                "Failed to checkpoint canary state for {}: {}",
                deployment_id, e
            );
        }
    }
}
