mod capabilities;
mod error;
mod request;
mod response;

pub use capabilities::{ExecutorCapabilities, ExecutorKind};
pub use error::ExecutorError;
pub use request::{
    BatchContext, ExecutionProgress, ExecutionRequest, ProgressCallback, ProgressStatus,
};
pub use response::{ExecutionResponse, ResponseMetadata};
