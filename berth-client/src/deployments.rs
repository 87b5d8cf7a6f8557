//! Deployment-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use berth_core::domain::canary::CanaryState;
use berth_core::domain::deployment::Deployment;
use berth_core::domain::log::{DeploymentLogEntry, NewLogEntry};
use berth_core::dto::deployment::{
    CanaryStateUpdate, ClaimDeployment, ClaimedDeployment, CompleteDeployment, DecisionRequest,
    EnqueueDeployment,
};
use berth_core::dto::log::{AppendLogs, AppendLogsResponse};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Queue
    // =============================================================================

    /// Enqueue a deployment. The orchestrator decides whether it lands queued
    /// or pending approval.
    pub async fn enqueue_deployment(&self, req: EnqueueDeployment) -> Result<Deployment> {
        let url = format!("{}/deployment", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Claim the oldest queued deployment for this worker.
    ///
    /// Returns `None` when the queue is empty.
    pub async fn claim_deployment(&self, worker_id: &str) -> Result<Option<ClaimedDeployment>> {
        let url = format!("{}/deployment/claim", self.base_url);
        let req = ClaimDeployment {
            worker_id: worker_id.to_string(),
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a deployment by ID.
    pub async fn get_deployment(&self, deployment_id: Uuid) -> Result<Deployment> {
        let url = format!("{}/deployment/{}", self.base_url, deployment_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all deployments for an application, newest first.
    pub async fn list_deployments(&self, application_id: Uuid) -> Result<Vec<Deployment>> {
        let url = format!(
            "{}/application/{}/deployments",
            self.base_url, application_id
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Latest deployment for an application, if any.
    pub async fn latest_deployment(&self, application_id: Uuid) -> Result<Option<Deployment>> {
        let url = format!(
            "{}/application/{}/deployments/latest",
            self.base_url, application_id
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Report the terminal outcome of a claimed deployment.
    pub async fn complete_deployment(
        &self,
        deployment_id: Uuid,
        req: CompleteDeployment,
    ) -> Result<Deployment> {
        let url = format!("{}/deployment/{}/complete", self.base_url, deployment_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a deployment. Queued entries cancel immediately; running ones
    /// get a cooperative cancellation flag.
    pub async fn cancel_deployment(&self, deployment_id: Uuid) -> Result<Deployment> {
        let url = format!("{}/deployment/{}/cancel", self.base_url, deployment_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Approval Gate
    // =============================================================================

    /// Approve a deployment waiting at the gate.
    pub async fn approve_deployment(
        &self,
        deployment_id: Uuid,
        req: DecisionRequest,
    ) -> Result<Deployment> {
        let url = format!("{}/deployment/{}/approve", self.base_url, deployment_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Reject a deployment waiting at the gate. Terminal.
    pub async fn reject_deployment(
        &self,
        deployment_id: Uuid,
        req: DecisionRequest,
    ) -> Result<Deployment> {
        let url = format!("{}/deployment/{}/reject", self.base_url, deployment_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Canary
    // =============================================================================

    /// Persist a canary checkpoint so the rollout survives worker restarts.
    pub async fn update_canary_state(
        &self,
        deployment_id: Uuid,
        state: &CanaryState,
    ) -> Result<()> {
        let url = format!("{}/deployment/{}/canary", self.base_url, deployment_id);
        let req = CanaryStateUpdate {
            state: state.clone(),
        };
        let response = self.client.put(&url).json(&req).send().await?;

        self.handle_empty_response(response).await
    }

    /// Request promotion of a canary holding at full weight.
    pub async fn promote_canary(&self, deployment_id: Uuid) -> Result<()> {
        let url = format!(
            "{}/deployment/{}/canary/promote",
            self.base_url, deployment_id
        );
        let response = self.client.post(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Logs
    // =============================================================================

    /// Append a batch of log entries. Returns the highest order assigned,
    /// usable as the cursor for a follow-up read.
    pub async fn append_logs(
        &self,
        deployment_id: Uuid,
        entries: Vec<NewLogEntry>,
    ) -> Result<i64> {
        let url = format!("{}/deployment/{}/logs", self.base_url, deployment_id);
        let req = AppendLogs { entries };
        let response = self.client.post(&url).json(&req).send().await?;

        let body: AppendLogsResponse = self.handle_response(response).await?;
        Ok(body.last_order)
    }

    /// Read log entries with order greater than `after_order`.
    pub async fn get_logs(
        &self,
        deployment_id: Uuid,
        after_order: i64,
        limit: i64,
    ) -> Result<Vec<DeploymentLogEntry>> {
        let url = format!(
            "{}/deployment/{}/logs?after_order={}&limit={}",
            self.base_url, deployment_id, after_order, limit
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
