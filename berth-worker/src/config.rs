//! Worker configuration
//!
//! Defines all configurable parameters for the worker including polling
//! intervals, stage retry behavior, and orchestrator connection settings.

use std::time::Duration;

/// Worker configuration
///
/// All timeouts and intervals are configurable to allow tuning for
/// different environments (dev vs prod, fast vs slow networks).
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this worker instance
    pub worker_id: String,

    /// Orchestrator base URL (e.g., "http://localhost:8080")
    pub orchestrator_url: String,

    /// How often to poll the orchestrator for claimable work
    pub poll_interval: Duration,

    /// How often to flush buffered logs to the orchestrator
    pub log_send_interval: Duration,

    /// Max deployments this worker runs in parallel
    pub max_parallel_deployments: usize,

    /// Attempts per stage for transient infrastructure failures
    pub stage_retry_limit: u32,

    /// Base delay between stage retries (doubled per attempt)
    pub stage_retry_delay: Duration,

    /// Sampling interval for the post-deploy health monitor
    pub monitor_poll_interval: Duration,

    /// Base directory for per-deployment workspaces
    pub workspace_base: String,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(worker_id: String, orchestrator_url: String) -> Self {
        Self {
            worker_id,
            orchestrator_url,
            poll_interval: Duration::from_secs(5),
            log_send_interval: Duration::from_secs(5),
            max_parallel_deployments: 2,
            stage_retry_limit: 3,
            stage_retry_delay: Duration::from_secs(2),
            monitor_poll_interval: Duration::from_secs(30),
            workspace_base: "/tmp/berth-workspaces".to_string(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - WORKER_ID (required)
    /// - ORCHESTRATOR_URL (required)
    /// - POLL_INTERVAL (optional, seconds, default: 5)
    /// - LOG_SEND_INTERVAL (optional, seconds, default: 5)
    /// - MAX_PARALLEL_DEPLOYMENTS (optional, default: 2)
    /// - STAGE_RETRY_LIMIT (optional, default: 3)
    /// - STAGE_RETRY_DELAY (optional, seconds, default: 2)
    /// - MONITOR_POLL_INTERVAL (optional, seconds, default: 30)
    /// - WORKSPACE_BASE (optional, default: /tmp/berth-workspaces)
    pub fn from_env() -> anyhow::Result<Self> {
        let worker_id = std::env::var("WORKER_ID")
            .map_err(|_| anyhow::anyhow!("WORKER_ID environment variable not set"))?;

        let orchestrator_url = std::env::var("ORCHESTRATOR_URL")
            .map_err(|_| anyhow::anyhow!("ORCHESTRATOR_URL environment variable not set"))?;

        let poll_interval = env_duration_secs("POLL_INTERVAL", 5);
        let log_send_interval = env_duration_secs("LOG_SEND_INTERVAL", 5);
        let stage_retry_delay = env_duration_secs("STAGE_RETRY_DELAY", 2);
        let monitor_poll_interval = env_duration_secs("MONITOR_POLL_INTERVAL", 30);

        let max_parallel_deployments = std::env::var("MAX_PARALLEL_DEPLOYMENTS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(2);

        let stage_retry_limit = std::env::var("STAGE_RETRY_LIMIT")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(3);

        let workspace_base = std::env::var("WORKSPACE_BASE")
            .unwrap_or_else(|_| "/tmp/berth-workspaces".to_string());

        Ok(Self {
            worker_id,
            orchestrator_url,
            poll_interval,
            log_send_interval,
            max_parallel_deployments,
            stage_retry_limit,
            stage_retry_delay,
            monitor_poll_interval,
            workspace_base,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_id.is_empty() {
            anyhow::bail!("worker_id cannot be empty");
        }

        if self.orchestrator_url.is_empty() {
            anyhow::bail!("orchestrator_url cannot be empty");
        }

        if !self.orchestrator_url.starts_with("http://")
            && !self.orchestrator_url.starts_with("https://")
        {
            anyhow::bail!("orchestrator_url must start with http:// or https://");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.max_parallel_deployments == 0 {
            anyhow::bail!("max_parallel_deployments must be greater than 0");
        }

        if self.stage_retry_limit == 0 {
            anyhow::bail!("stage_retry_limit must be greater than 0");
        }

        Ok(())
    }
}

fn env_duration_secs(name: &str, default: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(default))
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_parallel_deployments, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        assert!(config.validate().is_ok());

        config.worker_id = String::new();
        assert!(config.validate().is_err());

        config.worker_id = "test".to_string();

        config.orchestrator_url = "not-a-url".to_string();
        assert!(config.validate().is_err());

        config.orchestrator_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());

        config.max_parallel_deployments = 0;
        assert!(config.validate().is_err());
    }
}
