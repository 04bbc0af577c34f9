//! Infrastructure implementations for Reforge.
//!
//! Provides the filesystem-backed plan store, snapshot manager and run record
//! store, the configuration and pipeline loaders, and the generic capability
//! providers (external commands and OpenAI-compatible reasoning).

pub mod config;
pub mod fs;
pub mod pipeline;
pub mod plan;
pub mod reasoning;
pub mod record;
pub mod snapshot;
pub mod tool;

#[cfg(test)]
mod scenarios;
