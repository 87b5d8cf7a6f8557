//! Deployment Log Repository
//!
//! Append-only log sink. Each append inserts rows with server-assigned,
//! strictly increasing `entry_order` values; nothing ever rewrites an
//! existing row, so reads after order N are cheap and stable.

use berth_core::domain::log::{DeploymentLogEntry, LogStream, NewLogEntry};
use sqlx::PgPool;
use uuid::Uuid;

/// Append a batch of entries for a deployment.
///
/// Order assignment and the inserts share one transaction so concurrent
/// readers never observe gaps. Only the claiming worker writes a given
/// deployment's log, so there is no contention on the MAX lookup.
pub async fn append_entries(
    pool: &PgPool,
    deployment_id: Uuid,
    entries: &[NewLogEntry],
) -> Result<i64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let now = chrono::Utc::now();

    let (last_order,): (i64,) = sqlx::query_as(
        "SELECT COALESCE(MAX(entry_order), 0) FROM deployment_logs WHERE deployment_id = $1",
    )
    .bind(deployment_id)
    .fetch_one(&mut *tx)
    .await?;

    let mut order = last_order;
    for entry in entries {
        order += 1;
        sqlx::query(
            r#"
            INSERT INTO deployment_logs
                (deployment_id, entry_order, command, output, stream, stage, hidden, batch, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(deployment_id)
        .bind(order)
        .bind(&entry.command)
        .bind(&entry.output)
        .bind(stream_to_string(entry.stream))
        .bind(&entry.stage)
        .bind(entry.hidden)
        .bind(entry.batch)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(order)
}

/// Read entries with order greater than `after_order`, ascending.
pub async fn find_after(
    pool: &PgPool,
    deployment_id: Uuid,
    after_order: i64,
    limit: i64,
    include_hidden: bool,
) -> Result<Vec<DeploymentLogEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT deployment_id, entry_order, command, output, stream, stage, hidden, batch, created_at
        FROM deployment_logs
        WHERE deployment_id = $1
          AND entry_order > $2
          AND (hidden = FALSE OR $3)
        ORDER BY entry_order ASC
        LIMIT $4
        "#,
    )
    .bind(deployment_id)
    .bind(after_order)
    .bind(include_hidden)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Entry count for a deployment.
pub async fn count_for_deployment(pool: &PgPool, deployment_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM deployment_logs WHERE deployment_id = $1")
            .bind(deployment_id)
            .fetch_one(pool)
            .await?;

    Ok(row.0)
}

// =============================================================================
// Helper Functions
// =============================================================================

fn stream_to_string(stream: LogStream) -> &'static str {
    match stream {
        LogStream::Stdout => "stdout",
        LogStream::Stderr => "stderr",
    }
}

fn string_to_stream(s: &str) -> LogStream {
    match s {
        "stderr" => LogStream::Stderr,
        _ => LogStream::Stdout,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    deployment_id: Uuid,
    entry_order: i64,
    command: Option<String>,
    output: String,
    stream: String,
    stage: String,
    hidden: bool,
    batch: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<LogRow> for DeploymentLogEntry {
    fn from(row: LogRow) -> Self {
        DeploymentLogEntry {
            deployment_id: row.deployment_id,
            order: row.entry_order,
            command: row.command,
            output: row.output,
            stream: string_to_stream(&row.stream),
            stage: row.stage,
            hidden: row.hidden,
            batch: row.batch,
            created_at: row.created_at,
        }
    }
}
