//! Executor abstraction: the seam between the orchestrator and its backends
//!
//! The orchestrator hands one batch of requests per wave to
//! [`Executor::execute_parallel`] and waits for the whole batch before
//! moving on. Backends decide how the work actually runs.
//!
//! # Architecture
//!
//! ```text
//! Vec<ExecutionRequest> + BatchContext { on_progress, max_parallel, cancel }
//!   ↓
//! Executor::execute_parallel()        (default: run_parallel)
//!   ↓  Semaphore(min(hint, capabilities.max_parallelism))
//!   ↓  per request: timeout(timeout_ms) raced against cancel
//! HashMap<NodeId, ExecutionResponse>
//! ```

mod noop;
pub(crate) mod parallel;
pub mod traits;
pub mod types;

pub use noop::NoopExecutor;
pub use parallel::{effective_parallelism, run_parallel};
pub use traits::Executor;
pub use types::{
    BatchContext, ExecutionProgress, ExecutionRequest, ExecutionResponse, ExecutorCapabilities,
    ExecutorError, ExecutorKind, ProgressCallback, ProgressStatus, ResponseMetadata,
};
