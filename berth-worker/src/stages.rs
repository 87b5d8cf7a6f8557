//! Stage pipeline
//!
//! Runs the fixed deployment stage sequence. Each stage shells out through
//! the `ContainerRuntime` collaborator; transient infrastructure failures
//! are retried with bounded backoff inside the stage, application-level
//! failures terminate the pipeline immediately.

use berth_core::domain::application::Application;
use berth_core::domain::deployment::{Deployment, DeploymentStage};
use berth_core::error::LifecycleError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::logs::InMemoryLogBuffer;
use crate::remote::{CommandOutput, ContainerRuntime, HealthSampler};

/// Attempts the health check makes before declaring the container unhealthy.
const HEALTH_CHECK_ATTEMPTS: u32 = 10;
/// Delay between health check attempts.
const HEALTH_CHECK_DELAY: Duration = Duration::from_secs(3);

/// Executes individual deployment stages.
pub struct StageRunner {
    runtime: Arc<dyn ContainerRuntime>,
    sampler: Arc<dyn HealthSampler>,
    http: reqwest::Client,
    retry_limit: u32,
    retry_delay: Duration,
}

impl StageRunner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        sampler: Arc<dyn HealthSampler>,
        retry_limit: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            runtime,
            sampler,
            http: reqwest::Client::new(),
            retry_limit,
            retry_delay,
        }
    }

    /// Runs one stage, retrying transient failures up to the retry limit.
    pub async fn run_stage(
        &self,
        stage: DeploymentStage,
        deployment: &Deployment,
        application: &Application,
        workspace: &str,
        image: &str,
        logs: &InMemoryLogBuffer,
    ) -> Result<(), LifecycleError> {
        let mut attempt = 0;
        let mut delay = self.retry_delay;

        loop {
            attempt += 1;

            match self
                .execute_stage(stage, deployment, application, workspace, image, logs)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retry_limit => {
                    warn!(
                        "Stage {} attempt {}/{} hit transient error: {}",
                        stage, attempt, self.retry_limit, e
                    );
                    logs.log_stderr(stage.as_str(), format!("retrying after: {}", e));

                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_stage(
        &self,
        stage: DeploymentStage,
        deployment: &Deployment,
        application: &Application,
        workspace: &str,
        image: &str,
        logs: &InMemoryLogBuffer,
    ) -> Result<(), LifecycleError> {
        info!("Running stage {} for deployment {}", stage, deployment.id);

        match stage {
            DeploymentStage::Prepare => {
                logs.log_stdout(stage.as_str(), format!("preparing workspace {}", workspace));
                tokio::fs::create_dir_all(workspace).await.map_err(|e| {
                    LifecycleError::TransientInfra(format!("cannot create workspace: {}", e))
                })?;
                Ok(())
            }

            DeploymentStage::CloneSource => {
                // Rollbacks and promotions deploy a prebuilt image verbatim.
                if deployment.promoted_from_image.is_some() {
                    logs.log_stdout(stage.as_str(), "using prebuilt image, skipping clone");
                    return Ok(());
                }

                logs.log_command(
                    stage.as_str(),
                    &format!(
                        "git clone --branch {} {}",
                        application.git_branch, application.git_repository
                    ),
                );
                let out = self
                    .runtime
                    .clone_source(&application.git_repository, &application.git_branch, workspace)
                    .await?;
                self.check_output(stage, out, logs)
            }

            DeploymentStage::BuildImage => {
                if deployment.promoted_from_image.is_some() {
                    logs.log_command(stage.as_str(), &format!("podman pull {}", image));
                    let out = self.runtime.pull_image(image).await?;
                    return self.check_output(stage, out, logs);
                }

                logs.log_command(stage.as_str(), &format!("podman build -t {}", image));
                let out = self.runtime.build_image(workspace, image).await?;
                self.check_output(stage, out, logs)
            }

            DeploymentStage::PushImage => {
                if deployment.promoted_from_image.is_some() {
                    logs.log_stdout(stage.as_str(), "prebuilt image already in registry");
                    return Ok(());
                }

                logs.log_command(stage.as_str(), &format!("podman push {}", image));
                let out = self.runtime.push_image(image).await?;
                self.check_output(stage, out, logs)
            }

            DeploymentStage::Deploy => {
                logs.log_command(
                    stage.as_str(),
                    &format!("podman run --name {} {}", application.name, image),
                );
                let out = self
                    .runtime
                    .run_container(&application.name, image, application.exposed_port)
                    .await?;
                self.check_output(stage, out, logs)
            }

            DeploymentStage::HealthCheck => {
                self.wait_until_healthy(application, logs).await
            }

            DeploymentStage::SmokeTest => self.smoke_test(application, logs).await,

            DeploymentStage::Finish => {
                logs.log_stdout(stage.as_str(), "cleaning up workspace");
                if let Err(e) = tokio::fs::remove_dir_all(workspace).await {
                    // Leftover workspaces are reclaimed by the next prepare.
                    warn!("Failed to remove workspace {}: {}", workspace, e);
                }
                Ok(())
            }
        }
    }

    /// Polls the health sampler until the container reports healthy.
    async fn wait_until_healthy(
        &self,
        application: &Application,
        logs: &InMemoryLogBuffer,
    ) -> Result<(), LifecycleError> {
        let stage = DeploymentStage::HealthCheck;

        for attempt in 1..=HEALTH_CHECK_ATTEMPTS {
            let snapshot = self.sampler.sample(application).await?;

            match snapshot.health_status.as_deref() {
                Some("healthy") | None => {
                    logs.log_stdout(
                        stage.as_str(),
                        format!("container healthy after {} attempt(s)", attempt),
                    );
                    return Ok(());
                }
                Some(status) => {
                    logs.log_stdout(
                        stage.as_str(),
                        format!("attempt {}/{}: {}", attempt, HEALTH_CHECK_ATTEMPTS, status),
                    );
                }
            }

            tokio::time::sleep(HEALTH_CHECK_DELAY).await;
        }

        Err(LifecycleError::StageExecution {
            stage,
            exit_code: 1,
            message: format!(
                "container never became healthy after {} attempts",
                HEALTH_CHECK_ATTEMPTS
            ),
        })
    }

    /// Hits the application's smoke test path once. No path configured means
    /// the stage passes trivially.
    async fn smoke_test(
        &self,
        application: &Application,
        logs: &InMemoryLogBuffer,
    ) -> Result<(), LifecycleError> {
        let stage = DeploymentStage::SmokeTest;

        let (Some(path), Some(port)) = (&application.smoke_test_path, application.exposed_port)
        else {
            logs.log_stdout(stage.as_str(), "no smoke test configured, skipping");
            return Ok(());
        };

        let url = format!(
            "http://{}:{}/{}",
            application.server_ref,
            port,
            path.trim_start_matches('/')
        );
        logs.log_command(stage.as_str(), &format!("GET {}", url));

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LifecycleError::TransientInfra(format!("smoke test request: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            logs.log_stdout(stage.as_str(), format!("smoke test passed ({})", status));
            Ok(())
        } else {
            logs.log_stderr(stage.as_str(), format!("smoke test failed ({})", status));
            Err(LifecycleError::StageExecution {
                stage,
                exit_code: status.as_u16() as i32,
                message: format!("smoke test returned {}", status),
            })
        }
    }

    /// Classifies a finished command: zero exit passes, anything else is an
    /// application-level stage failure.
    fn check_output(
        &self,
        stage: DeploymentStage,
        output: CommandOutput,
        logs: &InMemoryLogBuffer,
    ) -> Result<(), LifecycleError> {
        if !output.stdout.trim().is_empty() {
            logs.log_stdout(stage.as_str(), output.stdout.trim());
        }
        if !output.stderr.trim().is_empty() {
            logs.log_stderr(stage.as_str(), output.stderr.trim());
        }

        if output.success() {
            Ok(())
        } else {
            Err(LifecycleError::StageExecution {
                stage,
                exit_code: output.exit_code,
                message: output.stderr.trim().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use berth_core::domain::deployment::{DeploymentStatus, TriggerSource};
    use berth_core::domain::rollback::MetricsSnapshot;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    /// Runtime whose build fails transiently a set number of times.
    struct FlakyRuntime {
        failures_remaining: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContainerRuntime for FlakyRuntime {
        async fn clone_source(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<CommandOutput, LifecycleError> {
            Ok(ok_output())
        }

        async fn build_image(&self, _: &str, _: &str) -> Result<CommandOutput, LifecycleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures_remaining.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
                return Err(LifecycleError::TransientInfra("socket reset".into()));
            }
            Ok(ok_output())
        }

        async fn push_image(&self, _: &str) -> Result<CommandOutput, LifecycleError> {
            Ok(ok_output())
        }

        async fn pull_image(&self, _: &str) -> Result<CommandOutput, LifecycleError> {
            Ok(ok_output())
        }

        async fn run_container(
            &self,
            _: &str,
            _: &str,
            _: Option<i32>,
        ) -> Result<CommandOutput, LifecycleError> {
            Ok(CommandOutput {
                exit_code: 125,
                stdout: String::new(),
                stderr: "image mount failed".into(),
            })
        }

        async fn stop_container(&self, _: &str) -> Result<CommandOutput, LifecycleError> {
            Ok(ok_output())
        }

        async fn set_traffic_weight(
            &self,
            _: &str,
            _: &str,
            _: u8,
        ) -> Result<CommandOutput, LifecycleError> {
            Ok(ok_output())
        }

        async fn restart_count(&self, _: &str) -> Result<i32, LifecycleError> {
            Ok(0)
        }
    }

    struct HealthySampler;

    #[async_trait]
    impl HealthSampler for HealthySampler {
        async fn sample(&self, _: &Application) -> Result<MetricsSnapshot, LifecycleError> {
            Ok(MetricsSnapshot {
                health_status: Some("healthy".into()),
                ..Default::default()
            })
        }
    }

    fn ok_output() -> CommandOutput {
        CommandOutput {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn test_application() -> Application {
        Application {
            id: Uuid::new_v4(),
            name: "web".into(),
            git_repository: "https://example.com/web.git".into(),
            git_branch: "main".into(),
            server_ref: "prod-1".into(),
            image_name: "registry.example.com/web".into(),
            exposed_port: None,
            smoke_test_path: None,
            last_successful_deployment_id: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn test_deployment(application_id: Uuid) -> Deployment {
        Deployment {
            id: Uuid::new_v4(),
            application_id,
            status: DeploymentStatus::InProgress,
            trigger: TriggerSource::Api,
            triggered_by: None,
            requires_approval: false,
            approval: None,
            rollback: false,
            rollback_of: None,
            is_promotion: false,
            promoted_from_image: None,
            image: None,
            canary_state: None,
            canary_promotion_requested: false,
            pull_request_id: None,
            commit_sha: None,
            commit_message: None,
            worker_id: Some("w1".into()),
            cancel_requested: false,
            failed_stage: None,
            error_message: None,
            created_at: chrono::Utc::now(),
            started_at: Some(chrono::Utc::now()),
            finished_at: None,
        }
    }

    fn runner_with(runtime: Arc<dyn ContainerRuntime>) -> StageRunner {
        StageRunner::new(
            runtime,
            Arc::new(HealthySampler),
            3,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let runtime = Arc::new(FlakyRuntime {
            failures_remaining: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let runner = runner_with(runtime.clone());
        let app = test_application();
        let deployment = test_deployment(app.id);
        let logs = InMemoryLogBuffer::new(0);

        let result = runner
            .run_stage(
                DeploymentStage::BuildImage,
                &deployment,
                &app,
                "/tmp/ws",
                "img:1",
                &logs,
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_limit_is_bounded() {
        let runtime = Arc::new(FlakyRuntime {
            failures_remaining: AtomicU32::new(10),
            calls: AtomicU32::new(0),
        });
        let runner = runner_with(runtime.clone());
        let app = test_application();
        let deployment = test_deployment(app.id);
        let logs = InMemoryLogBuffer::new(0);

        let result = runner
            .run_stage(
                DeploymentStage::BuildImage,
                &deployment,
                &app,
                "/tmp/ws",
                "img:1",
                &logs,
            )
            .await;

        assert!(matches!(result, Err(LifecycleError::TransientInfra(_))));
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_retried() {
        let runtime = Arc::new(FlakyRuntime {
            failures_remaining: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        });
        let runner = runner_with(runtime);
        let app = test_application();
        let deployment = test_deployment(app.id);
        let logs = InMemoryLogBuffer::new(0);

        let result = runner
            .run_stage(
                DeploymentStage::Deploy,
                &deployment,
                &app,
                "/tmp/ws",
                "img:1",
                &logs,
            )
            .await;

        match result {
            Err(LifecycleError::StageExecution {
                stage, exit_code, ..
            }) => {
                assert_eq!(stage, DeploymentStage::Deploy);
                assert_eq!(exit_code, 125);
            }
            other => panic!("expected stage failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prebuilt_image_skips_clone_and_push() {
        let runtime = Arc::new(FlakyRuntime {
            failures_remaining: AtomicU32::new(0),
            calls: AtomicU32::new(0),
        });
        let runner = runner_with(runtime.clone());
        let app = test_application();
        let mut deployment = test_deployment(app.id);
        deployment.promoted_from_image = Some("registry.example.com/web:v41".into());
        let logs = InMemoryLogBuffer::new(0);

        for stage in [DeploymentStage::CloneSource, DeploymentStage::PushImage] {
            runner
                .run_stage(stage, &deployment, &app, "/tmp/ws", "img:41", &logs)
                .await
                .unwrap();
        }

        // Build stage pulls instead of building for prebuilt images.
        runner
            .run_stage(
                DeploymentStage::BuildImage,
                &deployment,
                &app,
                "/tmp/ws",
                "img:41",
                &logs,
            )
            .await
            .unwrap();
        assert_eq!(runtime.calls.load(Ordering::SeqCst), 0);
    }
}
