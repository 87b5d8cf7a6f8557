//! Execution collaborators
//!
//! The stage pipeline, canary controller, and health monitor talk to the
//! outside world through these traits. Production uses the podman/git
//! shell-out implementations; tests substitute scripted fakes.

use async_trait::async_trait;
use berth_core::domain::application::Application;
use berth_core::domain::rollback::MetricsSnapshot;
use berth_core::error::LifecycleError;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Container and source operations needed by the stage pipeline.
///
/// Failure to spawn the tool at all is transient (retried); a tool that ran
/// and exited non-zero comes back as a `CommandOutput` for the caller to
/// classify.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Clone the application source at the given branch into the workspace.
    async fn clone_source(
        &self,
        repository: &str,
        branch: &str,
        workspace: &str,
    ) -> Result<CommandOutput, LifecycleError>;

    /// Build the application image from the workspace.
    async fn build_image(
        &self,
        workspace: &str,
        image: &str,
    ) -> Result<CommandOutput, LifecycleError>;

    /// Push a built image to the registry.
    async fn push_image(&self, image: &str) -> Result<CommandOutput, LifecycleError>;

    /// Pull an image that was built elsewhere (rollbacks, promotions).
    async fn pull_image(&self, image: &str) -> Result<CommandOutput, LifecycleError>;

    /// Start a named container from an image.
    async fn run_container(
        &self,
        name: &str,
        image: &str,
        exposed_port: Option<i32>,
    ) -> Result<CommandOutput, LifecycleError>;

    /// Stop and remove a named container. Missing containers are fine.
    async fn stop_container(&self, name: &str) -> Result<CommandOutput, LifecycleError>;

    /// Route `weight` percent of traffic to the candidate container.
    async fn set_traffic_weight(
        &self,
        stable: &str,
        candidate: &str,
        weight: u8,
    ) -> Result<CommandOutput, LifecycleError>;

    /// How many times the container restarted since it started.
    async fn restart_count(&self, name: &str) -> Result<i32, LifecycleError>;
}

/// Health sampling for validation windows and canary holds.
#[async_trait]
pub trait HealthSampler: Send + Sync {
    /// One point-in-time health sample for the running application.
    async fn sample(&self, application: &Application) -> Result<MetricsSnapshot, LifecycleError>;
}

// =============================================================================
// Shell-out implementations
// =============================================================================

/// Podman-backed runtime. Commands run on the worker host; the target server
/// is addressed through the podman connection named by `server_ref`.
pub struct PodmanRuntime;

impl PodmanRuntime {
    pub fn new() -> Self {
        Self
    }

    async fn run_command(program: &str, args: &[&str]) -> Result<CommandOutput, LifecycleError> {
        debug!("Running: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                LifecycleError::TransientInfra(format!("failed to spawn {}: {}", program, e))
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

impl Default for PodmanRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks that podman is installed and responding.
pub async fn check_podman_available() -> anyhow::Result<()> {
    let output = Command::new("podman")
        .arg("--version")
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("failed to execute 'podman --version': {}", e))?;

    if !output.status.success() {
        anyhow::bail!("podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    tracing::info!("Podman is available: {}", version.trim());

    Ok(())
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn clone_source(
        &self,
        repository: &str,
        branch: &str,
        workspace: &str,
    ) -> Result<CommandOutput, LifecycleError> {
        Self::run_command(
            "git",
            &[
                "clone",
                "--depth",
                "1",
                "--branch",
                branch,
                repository,
                workspace,
            ],
        )
        .await
    }

    async fn build_image(
        &self,
        workspace: &str,
        image: &str,
    ) -> Result<CommandOutput, LifecycleError> {
        Self::run_command("podman", &["build", "-t", image, workspace]).await
    }

    async fn push_image(&self, image: &str) -> Result<CommandOutput, LifecycleError> {
        Self::run_command("podman", &["push", image]).await
    }

    async fn pull_image(&self, image: &str) -> Result<CommandOutput, LifecycleError> {
        Self::run_command("podman", &["pull", image]).await
    }

    async fn run_container(
        &self,
        name: &str,
        image: &str,
        exposed_port: Option<i32>,
    ) -> Result<CommandOutput, LifecycleError> {
        let port_mapping = exposed_port.map(|p| format!("{}:{}", p, p));

        let mut args = vec!["run", "-d", "--replace", "--name", name];
        if let Some(mapping) = &port_mapping {
            args.push("-p");
            args.push(mapping);
        }
        args.push(image);

        Self::run_command("podman", &args).await
    }

    async fn stop_container(&self, name: &str) -> Result<CommandOutput, LifecycleError> {
        Self::run_command("podman", &["rm", "-f", name]).await
    }

    async fn set_traffic_weight(
        &self,
        stable: &str,
        candidate: &str,
        weight: u8,
    ) -> Result<CommandOutput, LifecycleError> {
        // The proxy in front of the containers owns the actual routing; this
        // relabels the containers so it picks the split up on its next reload.
        Self::run_command(
            "podman",
            &[
                "container",
                "update",
                "--label",
                &format!("berth.weight={}", weight),
                candidate,
            ],
        )
        .await?;
        Self::run_command(
            "podman",
            &[
                "container",
                "update",
                "--label",
                &format!("berth.weight={}", 100 - weight),
                stable,
            ],
        )
        .await
    }

    async fn restart_count(&self, name: &str) -> Result<i32, LifecycleError> {
        let output = Self::run_command(
            "podman",
            &["inspect", "--format", "{{.RestartCount}}", name],
        )
        .await?;

        if !output.success() {
            return Err(LifecycleError::TransientInfra(format!(
                "podman inspect {} failed: {}",
                name,
                output.stderr.trim()
            )));
        }

        output
            .stdout
            .trim()
            .parse::<i32>()
            .map_err(|e| LifecycleError::TransientInfra(format!("bad restart count: {}", e)))
    }
}

/// Rolling failure fraction over the most recent health probes, windowed
/// per application so one noisy neighbour cannot skew another's rate.
pub struct RollingErrorRate {
    window: usize,
    samples: std::sync::Mutex<std::collections::HashMap<uuid::Uuid, std::collections::VecDeque<bool>>>,
}

impl RollingErrorRate {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            samples: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn record(&self, application_id: uuid::Uuid, failed: bool) {
        let mut samples = self.samples.lock().unwrap();
        let probes = samples.entry(application_id).or_default();
        if probes.len() == self.window {
            probes.pop_front();
        }
        probes.push_back(failed);
    }

    /// None until the application has at least one recorded probe.
    pub fn rate(&self, application_id: uuid::Uuid) -> Option<f64> {
        let samples = self.samples.lock().unwrap();
        let probes = samples.get(&application_id).filter(|p| !p.is_empty())?;
        let failed = probes.iter().filter(|f| **f).count();
        Some(failed as f64 / probes.len() as f64)
    }
}

/// HTTP health sampler hitting the application's own health endpoint.
pub struct HttpHealthSampler {
    client: reqwest::Client,
    runtime: std::sync::Arc<dyn ContainerRuntime>,
    errors: RollingErrorRate,
}

const ERROR_RATE_WINDOW: usize = 20;

impl HttpHealthSampler {
    pub fn new(runtime: std::sync::Arc<dyn ContainerRuntime>) -> Self {
        Self {
            client: reqwest::Client::new(),
            runtime,
            errors: RollingErrorRate::new(ERROR_RATE_WINDOW),
        }
    }
}

#[async_trait]
impl HealthSampler for HttpHealthSampler {
    async fn sample(&self, application: &Application) -> Result<MetricsSnapshot, LifecycleError> {
        let restart_count = self
            .runtime
            .restart_count(&application.name)
            .await
            .unwrap_or(0);

        let health_status = match application.exposed_port {
            Some(port) => {
                let url = format!("http://{}:{}/health", application.server_ref, port);
                let status = match self.client.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => "healthy".to_string(),
                    Ok(resp) => format!("unhealthy ({})", resp.status().as_u16()),
                    Err(_) => "unreachable".to_string(),
                };
                self.errors.record(application.id, status != "healthy");
                Some(status)
            }
            // No exposed port means liveness comes from the restart counter.
            None => None,
        };

        Ok(MetricsSnapshot {
            health_status,
            restart_count,
            error_rate: self.errors.rate(application.id),
            consecutive_failures: 0,
            window_elapsed_seconds: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_rate_empty_window_is_unknown() {
        let errors = RollingErrorRate::new(4);
        assert_eq!(errors.rate(Uuid::new_v4()), None);
    }

    #[test]
    fn test_error_rate_is_failure_fraction() {
        let errors = RollingErrorRate::new(4);
        let app = Uuid::new_v4();

        errors.record(app, true);
        errors.record(app, false);
        errors.record(app, false);
        errors.record(app, false);

        assert_eq!(errors.rate(app), Some(0.25));
    }

    #[test]
    fn test_error_rate_evicts_oldest_probe() {
        let errors = RollingErrorRate::new(2);
        let app = Uuid::new_v4();

        errors.record(app, true);
        errors.record(app, false);
        errors.record(app, false);

        assert_eq!(errors.rate(app), Some(0.0));
    }

    #[test]
    fn test_error_rate_windows_are_per_application() {
        let errors = RollingErrorRate::new(4);
        let noisy = Uuid::new_v4();
        let quiet = Uuid::new_v4();

        errors.record(noisy, true);
        errors.record(quiet, false);

        assert_eq!(errors.rate(noisy), Some(1.0));
        assert_eq!(errors.rate(quiet), Some(0.0));
    }
}
