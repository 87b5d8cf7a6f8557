//! Environment-migration API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use berth_core::domain::migration::{EnvironmentMigration, MigrationHistory};
use berth_core::domain::resource::ResourceRef;
use berth_core::dto::deployment::DecisionRequest;
use berth_core::dto::migration::{
    ClaimMigration, CompleteMigration, CreateMigration, MigrationProgress,
    MigrationRollbackResponse,
};
use uuid::Uuid;

impl OrchestratorClient {
    /// Create an environment migration.
    pub async fn create_migration(&self, req: CreateMigration) -> Result<EnvironmentMigration> {
        let url = format!("{}/migration", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a migration by ID.
    pub async fn get_migration(&self, migration_id: Uuid) -> Result<EnvironmentMigration> {
        let url = format!("{}/migration/{}", self.base_url, migration_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List all migrations, newest first.
    pub async fn list_migrations(&self) -> Result<Vec<EnvironmentMigration>> {
        let url = format!("{}/migrations", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Approve a pending migration.
    pub async fn approve_migration(
        &self,
        migration_id: Uuid,
        req: DecisionRequest,
    ) -> Result<EnvironmentMigration> {
        let url = format!("{}/migration/{}/approve", self.base_url, migration_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Reject a pending migration. Terminal.
    pub async fn reject_migration(
        &self,
        migration_id: Uuid,
        req: DecisionRequest,
    ) -> Result<EnvironmentMigration> {
        let url = format!("{}/migration/{}/reject", self.base_url, migration_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a migration before execution begins.
    pub async fn cancel_migration(&self, migration_id: Uuid) -> Result<EnvironmentMigration> {
        let url = format!("{}/migration/{}/cancel", self.base_url, migration_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Claim the next approved migration for this worker.
    pub async fn claim_migration(&self, worker_id: &str) -> Result<Option<EnvironmentMigration>> {
        let url = format!("{}/migration/claim", self.base_url);
        let req = ClaimMigration {
            worker_id: worker_id.to_string(),
        };
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Report a progress checkpoint for a running migration.
    pub async fn migration_progress(
        &self,
        migration_id: Uuid,
        req: MigrationProgress,
    ) -> Result<()> {
        let url = format!("{}/migration/{}/progress", self.base_url, migration_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_empty_response(response).await
    }

    /// Report the terminal outcome of a migration run.
    pub async fn complete_migration(
        &self,
        migration_id: Uuid,
        req: CompleteMigration,
    ) -> Result<EnvironmentMigration> {
        let url = format!("{}/migration/{}/complete", self.base_url, migration_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Roll a migration back from its stored snapshot.
    pub async fn rollback_migration(
        &self,
        migration_id: Uuid,
    ) -> Result<MigrationRollbackResponse> {
        let url = format!("{}/migration/{}/rollback", self.base_url, migration_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Version history for a resource's migrated configurations.
    pub async fn migration_history(&self, resource: ResourceRef) -> Result<Vec<MigrationHistory>> {
        let url = format!(
            "{}/migration/history/{}/{}",
            self.base_url, resource.kind, resource.id
        );
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
