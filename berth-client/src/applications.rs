//! Application-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use berth_core::domain::application::Application;
use berth_core::domain::settings::ApplicationSettings;
use berth_core::dto::application::CreateApplication;
use uuid::Uuid;

impl OrchestratorClient {
    /// Register a new application with the lifecycle.
    pub async fn create_application(&self, req: CreateApplication) -> Result<Application> {
        let url = format!("{}/application", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get an application by ID.
    pub async fn get_application(&self, application_id: Uuid) -> Result<Application> {
        let url = format!("{}/application/{}", self.base_url, application_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the effective lifecycle settings for an application.
    pub async fn get_settings(&self, application_id: Uuid) -> Result<ApplicationSettings> {
        let url = format!("{}/application/{}/settings", self.base_url, application_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Replace the lifecycle settings for an application.
    pub async fn put_settings(
        &self,
        application_id: Uuid,
        settings: &ApplicationSettings,
    ) -> Result<()> {
        let url = format!("{}/application/{}/settings", self.base_url, application_id);
        let response = self.client.put(&url).json(settings).send().await?;

        self.handle_empty_response(response).await
    }
}
