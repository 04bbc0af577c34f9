//! Migration engine logic and port trait definitions for Reforge.
//!
//! This crate defines the "ports" (plan store, capability providers, snapshot
//! manager, run record store) that the infrastructure layer implements, and
//! the engine that drives them. It depends only on `reforge-types` -- never on
//! `reforge-infra` or any filesystem/network crate.

pub mod capability;
pub mod engine;
pub mod event;
pub mod graph;
pub mod repository;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod testing;
