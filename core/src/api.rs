//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `dagwave_core::api` instead of reaching into internal modules.

pub use crate::config::{
    apply_env_overrides, get_data_dir, load as load_config, load_from_file, AppConfig,
    LoggingConfig, OutputConfig, OutputFormat, PermissionsConfig,
};
pub use crate::conflict::{
    analyze_wave, detect_singleton, find_all_conflicts, ConflictAnalysis, ConflictKind, HintMap,
    NodeConflict, SingletonKind, SubtaskHints,
};
pub use crate::error::{CliError, GraphError, OrchestratorError, TaskError, TaskErrorCode};
pub use crate::executor::{
    BatchContext, ExecutionProgress, ExecutionRequest, ExecutionResponse, Executor,
    ExecutorCapabilities, ExecutorError, ExecutorKind, NoopExecutor, ProgressStatus,
};
pub use crate::graph::{
    Dag, DagBuilder, DagDefinition, DagOutput, ModelTier, Node, NodeConfig, NodeId, NodeKind,
};
pub use crate::orchestrator::{
    DispatchDescriptor, DispatchTable, ExecutionPlan, ExecutionResult, FailurePolicy,
    NoopObserver, Observer, ObserverSet, Orchestrator, OrchestratorBuilder, OrchestratorOptions,
    WavePlan,
};
pub use crate::permissions::{
    list_presets, validate_inheritance, EnforcementResult, IsolationLevel, PermissionEnforcer,
    PermissionError, PermissionMatrix, PermissionRequest, PresetInfo, PresetName, RequestType,
};
pub use crate::progress::ProgressObserver;
pub use crate::scheduler::{
    compute_stats, find_critical_path, topological_sort, validate_dag, CriticalPath, DagStats,
    IssueKind, SortResult, ValidationIssue, Wave,
};
pub use crate::state::{
    ExecutionSnapshot, ExecutionStatus, NodeState, NodeStatus, SkipReason, StateEvent,
    StateManager, StateManagerConfig, TaskResult, TokenUsage,
};
pub use tokio_util::sync::CancellationToken;
