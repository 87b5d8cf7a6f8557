//! Application Repository
//!
//! Handles database operations for application records and their
//! rollback/canary settings. Settings are stored as one JSONB blob per
//! application because they are read-only input to this core.

use berth_core::domain::application::Application;
use berth_core::domain::settings::ApplicationSettings;
use sqlx::PgPool;
use uuid::Uuid;

/// Register a new application record.
pub async fn create(pool: &PgPool, app: &Application) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO applications
            (id, name, git_repository, git_branch, server_ref, image_name,
             exposed_port, smoke_test_path, last_successful_deployment_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(app.id)
    .bind(&app.name)
    .bind(&app.git_repository)
    .bind(&app.git_branch)
    .bind(&app.server_ref)
    .bind(&app.image_name)
    .bind(app.exposed_port)
    .bind(&app.smoke_test_path)
    .bind(app.last_successful_deployment_id)
    .bind(app.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find an application by ID.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Application>, sqlx::Error> {
    let row = sqlx::query_as::<_, ApplicationRow>(
        r#"
        SELECT id, name, git_repository, git_branch, server_ref, image_name,
               exposed_port, smoke_test_path, last_successful_deployment_id, created_at
        FROM applications
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Record the last deployment that reached `finished` for the application.
pub async fn set_last_successful_deployment(
    pool: &PgPool,
    application_id: Uuid,
    deployment_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE applications
        SET last_successful_deployment_id = $1
        WHERE id = $2
        "#,
    )
    .bind(deployment_id)
    .bind(application_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load settings for an application, falling back to defaults when the
/// configuration layer has written none.
pub async fn find_settings(
    pool: &PgPool,
    application_id: Uuid,
) -> Result<ApplicationSettings, sqlx::Error> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT settings FROM application_settings WHERE application_id = $1")
            .bind(application_id)
            .fetch_optional(pool)
            .await?;

    Ok(row
        .and_then(|(value,)| serde_json::from_value(value).ok())
        .unwrap_or_else(|| ApplicationSettings::defaults_for(application_id)))
}

/// Upsert settings for an application.
pub async fn upsert_settings(
    pool: &PgPool,
    settings: &ApplicationSettings,
) -> Result<(), sqlx::Error> {
    let value = serde_json::to_value(settings).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO application_settings (application_id, settings)
        VALUES ($1, $2)
        ON CONFLICT (application_id) DO UPDATE SET settings = $2
        "#,
    )
    .bind(settings.application_id)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    id: Uuid,
    name: String,
    git_repository: String,
    git_branch: String,
    server_ref: String,
    image_name: String,
    exposed_port: Option<i32>,
    smoke_test_path: Option<String>,
    last_successful_deployment_id: Option<Uuid>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        Application {
            id: row.id,
            name: row.name,
            git_repository: row.git_repository,
            git_branch: row.git_branch,
            server_ref: row.server_ref,
            image_name: row.image_name,
            exposed_port: row.exposed_port,
            smoke_test_path: row.smoke_test_path,
            last_successful_deployment_id: row.last_successful_deployment_id,
            created_at: row.created_at,
        }
    }
}
