//! Berth Core
//!
//! Core types and abstractions for the Berth deployment control plane.
//!
//! This crate contains:
//! - Domain types: Core business entities (Deployment, RollbackEvent, EnvironmentMigration, etc.)
//! - DTOs: Data transfer objects for inter-service communication
//! - The shared error taxonomy used by orchestrator, worker, and client

pub mod domain;
pub mod dto;
pub mod error;
