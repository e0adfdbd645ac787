//! Wave-based DAG orchestration core.
//!
//! Consumers should import from [`api`] rather than reaching into modules.

pub mod api;
pub mod config;
pub mod conflict;
pub mod error;
pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod permissions;
pub mod progress;
pub mod scheduler;
pub mod state;
