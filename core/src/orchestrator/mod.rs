//! # Orchestrator
//!
//! ```text
//! Dag ──► topological_sort ──► waves
//!                                │  for each wave (strictly sequential):
//!                                ▼
//!   update_ready_nodes ─► DispatchTable::resolve ─► PermissionEnforcer::check
//!                                │                         │ denied → skipped(permission-denied)
//!                                ▼
//!   Executor::execute_parallel (or simulation) ─► StateManager transitions
//!                                │
//!                                ▼
//!   FailurePolicy::is_critical ─► abort │ next wave
//!                                ▼
//!   ExecutionResult { snapshot, outputs, usage, errors }
//! ```
//!
//! Callers observe a run through [`Observer`] callbacks or by subscribing to
//! state events with [`Orchestrator::subscribe`].

mod context;
mod dispatch;
mod engine;
mod failure;
mod observer;
mod result;

pub use context::ExecutionContext;
pub use dispatch::{
    build_prompt, estimate_complexity, select_model, Complexity, DispatchDefaults,
    DispatchDescriptor, DispatchError, DispatchTable, DEFAULT_AGENT,
};
pub use engine::{Orchestrator, OrchestratorBuilder, OrchestratorOptions};
pub use failure::FailurePolicy;
pub use observer::{NoopObserver, Observer, ObserverSet};
pub use result::{DeniedDispatch, ExecutionPlan, ExecutionResult, WavePlan};
