pub mod cli;
pub mod graph;
pub mod orchestrator;
pub mod task;

pub use cli::CliError;
pub use graph::GraphError;
pub use orchestrator::OrchestratorError;
pub use task::{TaskError, TaskErrorCode};
