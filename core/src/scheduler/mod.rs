//! # Topological scheduler
//!
//! ```text
//! Dag ──► topological_sort() ──► SortResult::Sorted { waves }
//!                           └──► SortResult::Cycle  { cycle }
//! ```
//!
//! Waves are the unit of parallelism: every node's dependencies sit in
//! strictly earlier waves, so nodes within one wave have no path between them.
//! Resource safety inside a wave is a separate check (see [`crate::conflict`]).

mod analysis;
mod topology;

pub use analysis::{
    compute_stats, extract_subgraph, find_critical_path, transitive_dependencies,
    transitive_dependents, validate_dag, CriticalPath, DagStats, IssueKind, ValidationIssue,
};
pub use topology::{find_cycle, is_acyclic, topological_sort, SortResult, Wave};
