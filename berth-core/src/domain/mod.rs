//! Core domain types
//!
//! This module contains the core domain structures used across Berth services.
//! These types represent the fundamental business entities and are shared between
//! orchestrator (for persistence) and worker (for execution).

pub mod application;
pub mod canary;
pub mod deployment;
pub mod log;
pub mod migration;
pub mod resource;
pub mod rollback;
pub mod settings;
pub mod transfer;
