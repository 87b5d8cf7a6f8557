use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Applications: read-mostly configuration input; the lifecycle only
    // writes last_successful_deployment_id back.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS applications (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            git_repository TEXT NOT NULL,
            git_branch VARCHAR(255) NOT NULL DEFAULT 'main',
            server_ref VARCHAR(255) NOT NULL,
            image_name VARCHAR(255) NOT NULL,
            exposed_port INTEGER,
            smoke_test_path TEXT,
            last_successful_deployment_id UUID,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS application_settings (
            application_id UUID PRIMARY KEY REFERENCES applications(id) ON DELETE CASCADE,
            settings JSONB NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Deployment queue: append-only history, never deleted.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id UUID PRIMARY KEY,
            application_id UUID NOT NULL REFERENCES applications(id),
            status VARCHAR(50) NOT NULL,
            trigger VARCHAR(50) NOT NULL,
            triggered_by UUID,
            requires_approval BOOLEAN NOT NULL DEFAULT FALSE,
            approval_decision VARCHAR(50),
            approval_decided_by UUID,
            approval_note TEXT,
            approval_decided_at TIMESTAMPTZ,
            rollback BOOLEAN NOT NULL DEFAULT FALSE,
            rollback_of UUID,
            is_promotion BOOLEAN NOT NULL DEFAULT FALSE,
            promoted_from_image TEXT,
            image TEXT,
            canary_state JSONB,
            canary_promotion_requested BOOLEAN NOT NULL DEFAULT FALSE,
            pull_request_id BIGINT,
            commit_sha VARCHAR(64),
            commit_message TEXT,
            worker_id VARCHAR(255),
            cancel_requested BOOLEAN NOT NULL DEFAULT FALSE,
            failed_stage VARCHAR(50),
            error_message TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            finished_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Log sink: one row per appended line, ordered per deployment. Appends
    // never rewrite existing rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployment_logs (
            deployment_id UUID NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
            entry_order BIGINT NOT NULL,
            command TEXT,
            output TEXT NOT NULL,
            stream VARCHAR(10) NOT NULL,
            stage VARCHAR(50) NOT NULL,
            hidden BOOLEAN NOT NULL DEFAULT FALSE,
            batch INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (deployment_id, entry_order)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rollback_events (
            id UUID PRIMARY KEY,
            application_id UUID NOT NULL REFERENCES applications(id),
            failed_deployment_id UUID NOT NULL REFERENCES deployments(id),
            rollback_deployment_id UUID REFERENCES deployments(id),
            triggered_by UUID,
            reason VARCHAR(50) NOT NULL,
            metrics JSONB NOT NULL DEFAULT '{}',
            status VARCHAR(50) NOT NULL,
            from_commit VARCHAR(64),
            to_commit VARCHAR(64),
            error_message TEXT,
            triggered_at TIMESTAMPTZ NOT NULL,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS environment_migrations (
            id UUID PRIMARY KEY,
            source_kind VARCHAR(50) NOT NULL,
            source_id UUID NOT NULL,
            source_environment_id UUID NOT NULL,
            target_environment_id UUID NOT NULL,
            target_server_ref VARCHAR(255) NOT NULL,
            options JSONB NOT NULL DEFAULT '{}',
            status VARCHAR(50) NOT NULL,
            requires_approval BOOLEAN NOT NULL DEFAULT FALSE,
            requested_by UUID,
            approved_by UUID,
            decided_at TIMESTAMPTZ,
            rejection_reason TEXT,
            rollback_snapshot JSONB,
            linked_resources JSONB NOT NULL DEFAULT '[]',
            progress INTEGER NOT NULL DEFAULT 0,
            current_step TEXT,
            error_message TEXT,
            worker_id VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One active migration per resource, enforced at the storage layer so
    // the guard holds across distributed orchestrator instances.
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_migrations_one_active
        ON environment_migrations (source_kind, source_id)
        WHERE status IN ('pending', 'approved', 'in_progress')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS migration_history (
            id UUID PRIMARY KEY,
            resource_kind VARCHAR(50) NOT NULL,
            resource_id UUID NOT NULL,
            version VARCHAR(64) NOT NULL,
            config JSONB NOT NULL,
            migration_id UUID NOT NULL REFERENCES environment_migrations(id),
            created_at TIMESTAMPTZ NOT NULL,
            UNIQUE (resource_kind, resource_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_transfers (
            id UUID PRIMARY KEY,
            source_kind VARCHAR(50) NOT NULL,
            source_id UUID NOT NULL,
            target_server_ref VARCHAR(255) NOT NULL,
            mode VARCHAR(50) NOT NULL,
            tables JSONB NOT NULL DEFAULT '[]',
            status VARCHAR(50) NOT NULL,
            requires_approval BOOLEAN NOT NULL DEFAULT FALSE,
            requested_by UUID,
            approved_by UUID,
            decided_at TIMESTAMPTZ,
            rejection_reason TEXT,
            rollback_snapshot JSONB,
            bytes_total BIGINT NOT NULL DEFAULT 0,
            bytes_copied BIGINT NOT NULL DEFAULT 0,
            progress INTEGER NOT NULL DEFAULT 0,
            current_step TEXT,
            error_message TEXT,
            worker_id VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_transfers_one_active
        ON resource_transfers (source_kind, source_id)
        WHERE status IN ('pending', 'approved', 'in_progress')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            id VARCHAR(255) PRIMARY KEY,
            capacity INTEGER NOT NULL DEFAULT 1,
            registered_at TIMESTAMPTZ NOT NULL,
            last_heartbeat_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes for the hot queue and history queries.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deployments_status ON deployments(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_application ON deployments(application_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_rollback_events_application ON rollback_events(application_id, triggered_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_migrations_status ON environment_migrations(status)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
