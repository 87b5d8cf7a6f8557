//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod deployment;
pub mod log;
pub mod migration;
pub mod rollback;
pub mod transfer;
pub mod worker;

// Re-export for convenience
pub use deployment as deployment_service;
pub use log as log_service;
pub use migration as migration_service;
pub use rollback as rollback_service;
pub use transfer as transfer_service;
pub use worker as worker_service;
