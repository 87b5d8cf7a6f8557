//! Canary rollout state
//!
//! Persisted as JSONB on the deployment row after every transition, so a
//! worker restart resumes the rollout at the stored step instead of starting
//! over. Unknown fields are tolerated on read for forward compatibility.

use serde::{Deserialize, Serialize};

/// Progressive-rollout sub-state-machine state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanaryState {
    /// Ordered traffic weights, e.g. `[10, 25, 50, 100]`.
    pub steps: Vec<u8>,
    /// Index into `steps` of the step currently serving traffic.
    pub current_step: usize,
    /// Weight currently routed to the candidate.
    pub current_weight: u8,
    /// When the current step began holding, None before the first shift.
    pub step_started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub stable_container: String,
    pub candidate_container: String,
}

impl CanaryState {
    pub fn new(steps: Vec<u8>, stable_container: String, candidate_container: String) -> Self {
        Self {
            steps,
            current_step: 0,
            current_weight: 0,
            step_started_at: None,
            stable_container,
            candidate_container,
        }
    }

    /// Weight the current step should route to the candidate.
    pub fn target_weight(&self) -> u8 {
        self.steps.get(self.current_step).copied().unwrap_or(100)
    }

    /// Records that traffic has been shifted to the current step's weight.
    pub fn begin_step(&mut self, now: chrono::DateTime<chrono::Utc>) {
        self.current_weight = self.target_weight();
        self.step_started_at = Some(now);
    }

    /// Advances to the next step. Returns false when already at the last one.
    pub fn advance(&mut self) -> bool {
        if self.current_step + 1 < self.steps.len() {
            self.current_step += 1;
            self.step_started_at = None;
            true
        } else {
            false
        }
    }

    /// Whether the candidate holds full traffic.
    pub fn at_full_weight(&self) -> bool {
        self.current_weight >= 100 || self.steps.get(self.current_step).copied() == Some(100)
    }

    /// How long the current step still has to hold before sampling, given the
    /// configured wait. Zero when the step never started or already elapsed.
    pub fn remaining_hold(
        &self,
        step_wait: chrono::Duration,
        now: chrono::DateTime<chrono::Utc>,
    ) -> chrono::Duration {
        match self.step_started_at {
            Some(started) => {
                let elapsed = now - started;
                if elapsed >= step_wait {
                    chrono::Duration::zero()
                } else {
                    step_wait - elapsed
                }
            }
            None => step_wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> CanaryState {
        CanaryState::new(
            vec![10, 25, 50, 100],
            "app-stable".to_string(),
            "app-candidate".to_string(),
        )
    }

    #[test]
    fn test_step_progression() {
        let mut s = state();
        assert_eq!(s.target_weight(), 10);

        s.begin_step(chrono::Utc::now());
        assert_eq!(s.current_weight, 10);
        assert!(s.advance());
        assert_eq!(s.target_weight(), 25);

        assert!(s.advance());
        assert!(s.advance());
        assert_eq!(s.target_weight(), 100);
        assert!(!s.advance());
    }

    #[test]
    fn test_full_weight_detection() {
        let mut s = state();
        assert!(!s.at_full_weight());
        while s.advance() {}
        s.begin_step(chrono::Utc::now());
        assert!(s.at_full_weight());
    }

    #[test]
    fn test_resume_after_crash_mid_rollout() {
        let mut s = state();
        s.begin_step(chrono::Utc::now());
        s.advance();
        s.begin_step(chrono::Utc::now());

        // Simulated crash: serialize, drop, restore.
        let blob = serde_json::to_string(&s).unwrap();
        let restored: CanaryState = serde_json::from_str(&blob).unwrap();

        assert_eq!(restored, s);
        assert_eq!(restored.current_step, 1);
        assert_eq!(restored.current_weight, 25);
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let blob = r#"{
            "steps": [50, 100],
            "current_step": 1,
            "current_weight": 100,
            "step_started_at": null,
            "stable_container": "a",
            "candidate_container": "b",
            "introduced_later": {"nested": true}
        }"#;
        let s: CanaryState = serde_json::from_str(blob).unwrap();
        assert_eq!(s.current_step, 1);
        assert!(s.at_full_weight());
    }

    #[test]
    fn test_remaining_hold() {
        let mut s = state();
        let wait = chrono::Duration::minutes(5);
        let now = chrono::Utc::now();

        // Step never started: full wait remains.
        assert_eq!(s.remaining_hold(wait, now), wait);

        s.step_started_at = Some(now - chrono::Duration::minutes(2));
        assert_eq!(s.remaining_hold(wait, now), chrono::Duration::minutes(3));

        s.step_started_at = Some(now - chrono::Duration::minutes(10));
        assert_eq!(s.remaining_hold(wait, now), chrono::Duration::zero());
    }
}
