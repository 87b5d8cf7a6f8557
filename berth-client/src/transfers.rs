//! Resource-transfer API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use berth_core::domain::transfer::ResourceTransfer;
use berth_core::dto::deployment::DecisionRequest;
use berth_core::dto::migration::{ClaimMigration, CompleteMigration};
use berth_core::dto::transfer::{CreateTransfer, TransferProgress};
use uuid::Uuid;

impl OrchestratorClient {
    /// Create a resource transfer.
    pub async fn create_transfer(&self, req: CreateTransfer) -> Result<ResourceTransfer> {
        let url = format!("{}/transfer", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a transfer by ID.
    pub async fn get_transfer(&self, transfer_id: Uuid) -> Result<ResourceTransfer> {
        let url = format!("{}/transfer/{}", self.base_url, transfer_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Approve a pending transfer.
    pub async fn approve_transfer(
        &self,
        transfer_id: Uuid,
        req: DecisionRequest,
    ) -> Result<ResourceTransfer> {
        let url = format!("{}/transfer/{}/approve", self.base_url, transfer_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Reject a pending transfer. Terminal.
    pub async fn reject_transfer(
        &self,
        transfer_id: Uuid,
        req: DecisionRequest,
    ) -> Result<ResourceTransfer> {
        let url = format!("{}/transfer/{}/reject", self.base_url, transfer_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a transfer before execution begins.
    pub async fn cancel_transfer(&self, transfer_id: Uuid) -> Result<ResourceTransfer> {
        let url = format!("{}/transfer/{}/cancel", self.base_url, transfer_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Claim the next approved transfer for this worker.
    pub async fn claim_transfer(&self, worker_id: &str) -> Result<Option<ResourceTransfer>> {
        let url = format!("{}/transfer/claim", self.base_url);
        let req = ClaimMigration {
            worker_id: worker_id.to_string(),
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Report byte-level progress for a running transfer.
    pub async fn transfer_progress(
        &self,
        transfer_id: Uuid,
        req: TransferProgress,
    ) -> Result<()> {
        let url = format!("{}/transfer/{}/progress", self.base_url, transfer_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_empty_response(response).await
    }

    /// Report the terminal outcome of a transfer run.
    pub async fn complete_transfer(
        &self,
        transfer_id: Uuid,
        req: CompleteMigration,
    ) -> Result<ResourceTransfer> {
        let url = format!("{}/transfer/{}/complete", self.base_url, transfer_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }
}
