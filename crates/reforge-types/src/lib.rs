//! Shared domain types for Reforge.
//!
//! This crate contains the domain types used across the migration engine:
//! the plan and its steps, task graph nodes and their results, the human
//! decision vocabulary, run records, engine events and configuration.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod decision;
pub mod error;
pub mod event;
pub mod plan;
pub mod record;
pub mod task;
