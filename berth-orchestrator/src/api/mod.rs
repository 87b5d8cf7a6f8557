//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod application;
pub mod deployment;
pub mod error;
pub mod health;
pub mod migration;
pub mod rollback;
pub mod transfer;
pub mod worker;

use axum::{
    Router,
    routing::{get, post, put},
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

/// Create the main API router with all endpoints
pub fn create_router(pool: PgPool) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Application endpoints
        .route("/application", post(application::create_application))
        .route("/application/{id}", get(application::get_application))
        .route("/application/{id}/settings", get(application::get_settings))
        .route("/application/{id}/settings", put(application::put_settings))
        .route(
            "/application/{id}/deployments",
            get(deployment::list_for_application),
        )
        .route(
            "/application/{id}/deployments/latest",
            get(deployment::latest_for_application),
        )
        // Deployment lifecycle
        .route("/deployment", post(deployment::enqueue))
        .route("/deployment/claim", post(deployment::claim))
        .route("/deployment/{id}", get(deployment::get_deployment))
        .route("/deployment/{id}/complete", post(deployment::complete))
        .route("/deployment/{id}/cancel", post(deployment::cancel))
        .route("/deployment/{id}/approve", post(deployment::approve))
        .route("/deployment/{id}/reject", post(deployment::reject))
        .route("/deployment/{id}/canary", put(deployment::update_canary))
        .route(
            "/deployment/{id}/canary/promote",
            post(deployment::promote_canary),
        )
        .route("/deployment/{id}/logs", get(deployment::get_logs))
        .route("/deployment/{id}/logs", post(deployment::append_logs))
        // Rollback safety net
        .route("/application/{id}/rollback", post(rollback::trigger))
        .route("/application/{id}/rollbacks", get(rollback::history))
        // Environment migrations
        .route("/migration", post(migration::create_migration))
        .route("/migrations", get(migration::list_migrations))
        .route("/migration/claim", post(migration::claim_migration))
        .route("/migration/{id}", get(migration::get_migration))
        .route("/migration/{id}/approve", post(migration::approve_migration))
        .route("/migration/{id}/reject", post(migration::reject_migration))
        .route("/migration/{id}/cancel", post(migration::cancel_migration))
        .route("/migration/{id}/progress", post(migration::migration_progress))
        .route("/migration/{id}/complete", post(migration::complete_migration))
        .route("/migration/{id}/rollback", post(migration::rollback_migration))
        .route(
            "/migration/history/{kind}/{id}",
            get(migration::migration_history),
        )
        // Resource transfers
        .route("/transfer", post(transfer::create_transfer))
        .route("/transfer/claim", post(transfer::claim_transfer))
        .route("/transfer/{id}", get(transfer::get_transfer))
        .route("/transfer/{id}/approve", post(transfer::approve_transfer))
        .route("/transfer/{id}/reject", post(transfer::reject_transfer))
        .route("/transfer/{id}/cancel", post(transfer::cancel_transfer))
        .route("/transfer/{id}/progress", post(transfer::transfer_progress))
        .route("/transfer/{id}/complete", post(transfer::complete_transfer))
        // Worker registry
        .route("/worker/register", post(worker::register))
        .route("/worker/heartbeat", post(worker::heartbeat))
        // Add state and middleware
        .with_state(pool)
        .layer(TraceLayer::new_for_http())
}
