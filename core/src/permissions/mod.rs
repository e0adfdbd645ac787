//! # Permissions
//!
//! ```text
//! PresetName ──► PermissionMatrix ──(with_overrides)──► PermissionMatrix
//!                                                           │
//!                          PermissionRequest ──► PermissionEnforcer::check()
//!                                                           │
//!                                            EnforcementResult { allowed, violations }
//! ```
//!
//! The matrix is fixed when the enforcer is built. Deny lists always win over
//! allow lists, and anything the matrix does not name (unknown tools, unknown
//! model tiers) is denied.

mod enforcer;
mod inheritance;
mod matrix;
mod presets;

use thiserror::Error;

pub use enforcer::{
    AuditEntry, EnforcementResult, EnforcerOptions, PermissionEnforcer, PermissionRequest,
    RequestType, Violation, ViolationKind, DEFAULT_MAX_AUDIT_ENTRIES,
};
pub use inheritance::{validate_inheritance, InheritanceIssue, InheritanceReport};
pub use matrix::{
    BashPermissions, CoreTool, CoreToolPermissions, FileSystemPermissions, IsolationLevel,
    McpToolPermissions, ModelPermissions, NetworkPermissions, PermissionMatrix,
};
pub use presets::{list_presets, PresetInfo, PresetName};

#[derive(Error, Debug, Clone)]
pub enum PermissionError {
    #[error("permission denied: {reason}")]
    Denied {
        reason: String,
        violations: Vec<Violation>,
    },

    #[error("unknown permission preset: {0}")]
    UnknownPreset(String),

    #[error("invalid permission overrides: {0}")]
    InvalidOverrides(String),
}
