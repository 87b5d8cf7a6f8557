//! Post-deploy health monitor
//!
//! After a deployment finishes, the worker watches the application for the
//! configured validation window. When a sampled snapshot breaches one of the
//! enabled rules the monitor fires a single rollback trigger and stops.

use berth_core::domain::application::Application;
use berth_core::domain::rollback::{MetricsSnapshot, RollbackReason};
use berth_core::domain::settings::RollbackSettings;
use berth_core::dto::rollback::TriggerRollback;
use berth_client::OrchestratorClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::remote::HealthSampler;

/// Decides whether a snapshot breaches the configured rollback rules.
///
/// Pure so the decision table is testable without containers. Rules are
/// checked in severity order; the first breach wins.
pub fn evaluate(settings: &RollbackSettings, metrics: &MetricsSnapshot) -> Option<RollbackReason> {
    if !settings.auto_rollback_enabled {
        return None;
    }

    if settings.on_crash_loop && metrics.restart_count > settings.max_restarts {
        return Some(RollbackReason::CrashLoop);
    }

    if settings.on_health_check_fail
        && matches!(metrics.health_status.as_deref(), Some(s) if s != "healthy")
    {
        return Some(RollbackReason::HealthCheckFail);
    }

    // The error-rate rule fires on either the rolling rate or a run of
    // consecutive failed probes.
    if settings.on_error_rate {
        if let Some(rate) = metrics.error_rate {
            if rate > settings.error_rate_threshold {
                return Some(RollbackReason::ErrorRate);
            }
        }
        if metrics.consecutive_failures > 0
            && metrics.consecutive_failures >= settings.consecutive_failures
        {
            return Some(RollbackReason::ErrorRate);
        }
    }

    None
}

/// Watches one finished deployment for its validation window.
pub struct HealthMonitor {
    client: Arc<OrchestratorClient>,
    sampler: Arc<dyn HealthSampler>,
    poll_interval: Duration,
}

impl HealthMonitor {
    pub fn new(
        client: Arc<OrchestratorClient>,
        sampler: Arc<dyn HealthSampler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            sampler,
            poll_interval,
        }
    }

    /// Runs the validation window to completion.
    ///
    /// Returns the reason when a rollback was triggered, None when the
    /// deployment survived the window.
    pub async fn watch(
        &self,
        deployment_id: Uuid,
        application: &Application,
        settings: &RollbackSettings,
    ) -> Option<RollbackReason> {
        if !settings.auto_rollback_enabled {
            debug!(
                "Auto-rollback disabled for application {}, skipping validation window",
                application.id
            );
            return None;
        }

        let window = Duration::from_secs(settings.validation_seconds.max(0) as u64);
        let started = chrono::Utc::now();

        info!(
            "Monitoring deployment {} for {}s",
            deployment_id,
            window.as_secs()
        );

        let mut consecutive_failures = 0;
        let mut ticker = tokio::time::interval(self.poll_interval);
        // First tick fires immediately; skip it so the container gets one
        // interval to settle.
        ticker.tick().await;

        loop {
            let elapsed = (chrono::Utc::now() - started).num_seconds();
            if elapsed >= settings.validation_seconds {
                info!(
                    "Deployment {} survived its {}s validation window",
                    deployment_id, settings.validation_seconds
                );
                return None;
            }

            ticker.tick().await;

            // A newer deployment supersedes this window.
            match self.client.latest_deployment(application.id).await {
                Ok(Some(latest)) if latest.id != deployment_id => {
                    info!(
                        "Deployment {} superseded by {}, stopping monitor",
                        deployment_id, latest.id
                    );
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Could not check for newer deployments of {}: {}",
                        application.id, e
                    );
                }
            }

            let mut snapshot = match self.sampler.sample(application).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    // A failed sample is not evidence of an unhealthy app.
                    warn!("Health sample failed for {}: {}", application.id, e);
                    continue;
                }
            };

            if matches!(snapshot.health_status.as_deref(), Some(s) if s != "healthy") {
                consecutive_failures += 1;
            } else {
                consecutive_failures = 0;
            }

            snapshot.consecutive_failures = consecutive_failures;
            snapshot.window_elapsed_seconds = (chrono::Utc::now() - started).num_seconds();

            if let Some(reason) = evaluate(settings, &snapshot) {
                warn!(
                    "Deployment {} breached rollback rule {} after {}s",
                    deployment_id, reason, snapshot.window_elapsed_seconds
                );

                let req = TriggerRollback {
                    failed_deployment_id: deployment_id,
                    reason,
                    metrics: snapshot,
                    triggered_by: None,
                };

                match self.client.trigger_rollback(application.id, req).await {
                    Ok(outcome) => {
                        info!(
                            "Rollback event {} recorded (rollback deployment: {:?})",
                            outcome.event.id, outcome.rollback_deployment_id
                        );
                    }
                    Err(e) => {
                        error!(
                            "Failed to trigger rollback for application {}: {}",
                            application.id, e
                        );
                    }
                }

                return Some(reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::domain::settings::ApplicationSettings;

    fn settings() -> RollbackSettings {
        let mut s = ApplicationSettings::defaults_for(Uuid::new_v4()).rollback;
        s.auto_rollback_enabled = true;
        s
    }

    fn healthy_snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            health_status: Some("healthy".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_healthy_snapshot_passes() {
        assert_eq!(evaluate(&settings(), &healthy_snapshot()), None);
    }

    #[test]
    fn test_disabled_monitor_never_fires() {
        let mut s = settings();
        s.auto_rollback_enabled = false;

        let metrics = MetricsSnapshot {
            restart_count: 99,
            consecutive_failures: 99,
            error_rate: Some(1.0),
            ..Default::default()
        };

        assert_eq!(evaluate(&s, &metrics), None);
    }

    #[test]
    fn test_crash_loop_requires_exceeding_max_restarts() {
        let s = settings();
        assert_eq!(s.max_restarts, 3);

        let mut metrics = healthy_snapshot();
        metrics.restart_count = 3;
        assert_eq!(evaluate(&s, &metrics), None);

        metrics.restart_count = 4;
        assert_eq!(evaluate(&s, &metrics), Some(RollbackReason::CrashLoop));
    }

    #[test]
    fn test_unhealthy_container_triggers_health_rule() {
        let s = settings();

        let metrics = MetricsSnapshot {
            health_status: Some("unhealthy (503)".into()),
            ..Default::default()
        };
        assert_eq!(evaluate(&s, &metrics), Some(RollbackReason::HealthCheckFail));
    }

    #[test]
    fn test_consecutive_probe_failures_fire_error_rate_rule() {
        let mut s = settings();
        s.on_crash_loop = false;
        s.on_health_check_fail = false;
        s.on_error_rate = true;

        let mut metrics = MetricsSnapshot {
            health_status: Some("unreachable".into()),
            consecutive_failures: s.consecutive_failures - 1,
            ..Default::default()
        };
        assert_eq!(evaluate(&s, &metrics), None);

        metrics.consecutive_failures = s.consecutive_failures + 10;
        assert_eq!(evaluate(&s, &metrics), Some(RollbackReason::ErrorRate));
    }

    #[test]
    fn test_error_rate_threshold() {
        let mut s = settings();
        s.on_error_rate = true;

        let mut metrics = healthy_snapshot();
        metrics.error_rate = Some(s.error_rate_threshold);
        assert_eq!(evaluate(&s, &metrics), None);

        metrics.error_rate = Some(s.error_rate_threshold + 0.01);
        assert_eq!(evaluate(&s, &metrics), Some(RollbackReason::ErrorRate));
    }

    #[test]
    fn test_crash_loop_wins_over_error_rate() {
        let s = settings();
        let metrics = MetricsSnapshot {
            restart_count: s.max_restarts + 1,
            error_rate: Some(1.0),
            ..Default::default()
        };
        assert_eq!(evaluate(&s, &metrics), Some(RollbackReason::CrashLoop));
    }

    #[test]
    fn test_missing_error_rate_is_not_a_breach() {
        let mut s = settings();
        s.on_crash_loop = false;
        s.on_health_check_fail = false;
        s.on_error_rate = true;

        let metrics = MetricsSnapshot {
            error_rate: None,
            ..Default::default()
        };
        assert_eq!(evaluate(&s, &metrics), None);
    }
}
