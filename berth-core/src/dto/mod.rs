//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used for communication between Berth services
//! (orchestrator, worker, CLI). DTOs are lightweight representations of
//! domain entities optimized for network transfer.

pub mod application;
pub mod deployment;
pub mod log;
pub mod migration;
pub mod rollback;
pub mod transfer;
pub mod worker;
