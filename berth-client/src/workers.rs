//! Worker registration endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use berth_core::dto::worker::{Heartbeat, RegisterWorker};

impl OrchestratorClient {
    /// Register this worker with the orchestrator. Idempotent.
    pub async fn register_worker(&self, worker_id: &str, capacity: i32) -> Result<()> {
        let url = format!("{}/worker/register", self.base_url);
        let req = RegisterWorker {
            worker_id: worker_id.to_string(),
            capacity,
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_empty_response(response).await
    }

    /// Send a liveness heartbeat.
    pub async fn worker_heartbeat(&self, worker_id: &str) -> Result<()> {
        let url = format!("{}/worker/heartbeat", self.base_url);
        let req = Heartbeat {
            worker_id: worker_id.to_string(),
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_empty_response(response).await
    }
}
