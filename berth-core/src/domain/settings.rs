//! Per-application rollback and canary settings
//!
//! Read-only input to the worker and health monitor; mutated through the
//! configuration surface outside the deployment lifecycle. Defaults here are
//! the shipped defaults, not invariants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation window default. Widened from the historical 300s because short
/// windows miss gradual degradation.
pub const DEFAULT_VALIDATION_SECONDS: i64 = 1800;

/// Rollback/canary configuration subset for one application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationSettings {
    pub application_id: Uuid,
    /// Approval gate flag for the target environment.
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub rollback: RollbackSettings,
    #[serde(default)]
    pub canary: CanarySettings,
}

impl ApplicationSettings {
    pub fn defaults_for(application_id: Uuid) -> Self {
        Self {
            application_id,
            requires_approval: false,
            rollback: RollbackSettings::default(),
            canary: CanarySettings::default(),
        }
    }
}

/// Auto-rollback configuration evaluated by the health monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSettings {
    pub auto_rollback_enabled: bool,
    /// Post-deployment observation period in seconds.
    pub validation_seconds: i64,
    /// Restarts above this count within the window trigger a crash-loop rollback.
    pub max_restarts: i32,
    pub on_health_check_fail: bool,
    pub on_crash_loop: bool,
    pub on_error_rate: bool,
    /// Rolling error-rate fraction (0.0..=1.0) that triggers a rollback.
    pub error_rate_threshold: f64,
    /// Consecutive failed probes that trigger a rollback.
    pub consecutive_failures: i32,
}

impl Default for RollbackSettings {
    fn default() -> Self {
        Self {
            auto_rollback_enabled: false,
            validation_seconds: DEFAULT_VALIDATION_SECONDS,
            max_restarts: 3,
            on_health_check_fail: true,
            on_crash_loop: true,
            on_error_rate: false,
            error_rate_threshold: 0.1,
            consecutive_failures: 5,
        }
    }
}

/// Progressive rollout configuration consumed by the canary controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanarySettings {
    pub enabled: bool,
    /// Ordered traffic percentages; the last step should be 100.
    pub steps: Vec<u8>,
    /// Hold time at each step before sampling and advancing.
    pub step_wait_minutes: i64,
    /// Swap candidate to stable automatically on reaching 100%.
    pub auto_promote: bool,
    /// Error-rate fraction that aborts the rollout mid-step.
    pub error_rate_threshold: f64,
}

impl Default for CanarySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            steps: vec![10, 25, 50, 100],
            step_wait_minutes: 5,
            auto_promote: true,
            error_rate_threshold: 0.05,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_defaults() {
        let s = RollbackSettings::default();
        assert_eq!(s.validation_seconds, 1800);
        assert_eq!(s.max_restarts, 3);
        assert!(!s.auto_rollback_enabled);
    }

    #[test]
    fn test_canary_default_steps_end_at_full_weight() {
        let s = CanarySettings::default();
        assert_eq!(s.steps.last(), Some(&100));
    }

    #[test]
    fn test_settings_tolerate_missing_fields() {
        // Older rows may predate the canary block entirely.
        let json = format!(r#"{{"application_id":"{}"}}"#, Uuid::new_v4());
        let s: ApplicationSettings = serde_json::from_str(&json).unwrap();
        assert!(!s.canary.enabled);
        assert_eq!(s.rollback.validation_seconds, DEFAULT_VALIDATION_SECONDS);
    }
}
