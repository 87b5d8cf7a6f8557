//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for a specific domain entity.

pub mod application;
pub mod deployment;
pub mod log;
pub mod migration;
pub mod rollback;
pub mod transfer;
pub mod worker;

// Re-export for convenience
pub use application as application_repository;
pub use deployment as deployment_repository;
pub use log as log_repository;
pub use migration as migration_repository;
pub use rollback as rollback_repository;
pub use transfer as transfer_repository;
pub use worker as worker_repository;
