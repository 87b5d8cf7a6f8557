//! Rollback-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use berth_core::domain::rollback::RollbackEvent;
use berth_core::dto::rollback::{RollbackOutcome, TriggerRollback};
use uuid::Uuid;

impl OrchestratorClient {
    /// Trigger a rollback for an application.
    ///
    /// The orchestrator records the event and, when a known-good image
    /// exists, enqueues the compensating deployment in one step.
    pub async fn trigger_rollback(
        &self,
        application_id: Uuid,
        req: TriggerRollback,
    ) -> Result<RollbackOutcome> {
        let url = format!("{}/application/{}/rollback", self.base_url, application_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Rollback event history for an application, newest first.
    pub async fn rollback_history(&self, application_id: Uuid) -> Result<Vec<RollbackEvent>> {
        let url = format!("{}/application/{}/rollbacks", self.base_url, application_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
