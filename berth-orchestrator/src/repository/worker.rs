//! Worker Repository
//!
//! Registration and heartbeat bookkeeping for execution workers.

use sqlx::PgPool;

/// Upsert a worker registration.
pub async fn register(pool: &PgPool, worker_id: &str, capacity: i32) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO workers (id, capacity, registered_at, last_heartbeat_at)
        VALUES ($1, $2, $3, $3)
        ON CONFLICT (id) DO UPDATE SET capacity = $2, last_heartbeat_at = $3
        "#,
    )
    .bind(worker_id)
    .bind(capacity)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a heartbeat. Returns false for unknown workers.
pub async fn heartbeat(pool: &PgPool, worker_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE workers SET last_heartbeat_at = $1 WHERE id = $2")
        .bind(chrono::Utc::now())
        .bind(worker_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
