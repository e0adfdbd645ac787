//! # Graph model
//!
//! Pure data: nodes, dependency edges and declared outputs. Nothing here
//! executes; lifecycle state lives in [`crate::state`].
//!
//! ```text
//!   DagBuilder / DagDefinition
//!            │
//!            ▼
//!   Dag { nodes (insertion order), dependents (reverse edges), outputs }
//!            │
//!            ▼
//!   scheduler::topological_sort() → waves
//! ```

mod builder;
mod dag;
mod definition;
mod node;

pub use builder::DagBuilder;
pub use dag::{Dag, DagOutput};
pub use definition::DagDefinition;
pub use node::{ModelTier, Node, NodeConfig, NodeId, NodeKind};
