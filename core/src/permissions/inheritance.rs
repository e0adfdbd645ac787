//! Parent/child matrix checks: a spawned agent may only narrow what its
//! parent is allowed to do.

use std::collections::BTreeSet;

use serde::Serialize;

use super::matrix::{CoreTool, PermissionMatrix};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InheritanceIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InheritanceReport {
    /// Escalations: the child grants something the parent does not.
    pub errors: Vec<InheritanceIssue>,
    /// Weakenings that are allowed but worth a look.
    pub warnings: Vec<InheritanceIssue>,
}

impl InheritanceReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &str, message: String) {
        self.errors.push(InheritanceIssue {
            field: field.to_string(),
            message,
        });
    }

    fn warning(&mut self, field: &str, message: String) {
        self.warnings.push(InheritanceIssue {
            field: field.to_string(),
            message,
        });
    }
}

pub fn validate_inheritance(parent: &PermissionMatrix, child: &PermissionMatrix) -> InheritanceReport {
    let mut report = InheritanceReport::default();

    for tool in CoreTool::ALL {
        if child.core_tools.allows(tool) && !parent.core_tools.allows(tool) {
            report.error(
                tool.field(),
                format!("Child cannot have {} permission when parent doesn't", tool.name()),
            );
        }
    }

    if child.bash.enabled && !parent.bash.enabled {
        report.error(
            "bash.enabled",
            "Child cannot enable bash when parent has it disabled".to_string(),
        );
    }
    if parent.bash.sandboxed && !child.bash.sandboxed {
        report.error(
            "bash.sandboxed",
            "Child cannot disable sandbox when parent requires it".to_string(),
        );
    }
    missing_denials(
        &mut report,
        "bash.denied_patterns",
        &parent.bash.denied_patterns,
        &child.bash.denied_patterns,
    );
    missing_denials(
        &mut report,
        "file_system.deny_patterns",
        &parent.file_system.deny_patterns,
        &child.file_system.deny_patterns,
    );
    missing_denials(
        &mut report,
        "mcp_tools.denied",
        &parent.mcp_tools.denied,
        &child.mcp_tools.denied,
    );

    if child.network.enabled && !parent.network.enabled {
        report.error(
            "network.enabled",
            "Child cannot enable network when parent has it disabled".to_string(),
        );
    }

    for tier in &child.models.allowed {
        if !parent.models.allows(*tier) {
            report.error(
                "models.allowed",
                format!("Child cannot use model {tier} when parent doesn't allow it"),
            );
        }
    }
    if child.models.allow_escalation && !parent.models.allow_escalation {
        report.error(
            "models.allow_escalation",
            "Child cannot allow model escalation when parent forbids it".to_string(),
        );
    }

    report
}

fn missing_denials(report: &mut InheritanceReport, field: &str, parent: &[String], child: &[String]) {
    let child: BTreeSet<&str> = child.iter().map(String::as_str).collect();
    for pattern in parent {
        if !child.contains(pattern.as_str()) {
            report.warning(
                field,
                format!("Parent denies \"{pattern}\" but child doesn't"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PresetName;

    #[test]
    fn test_narrowing_is_valid() {
        let report = validate_inheritance(
            &PresetName::Standard.matrix(),
            &PresetName::ReadOnly.matrix(),
        );
        assert!(report.is_valid(), "{:?}", report.errors);
    }

    #[test]
    fn test_escalation_is_reported() {
        let report = validate_inheritance(
            &PresetName::Minimal.matrix(),
            &PresetName::Standard.matrix(),
        );
        assert!(!report.is_valid());
        let fields: Vec<&str> = report.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"core_tools.write"));
        assert!(fields.contains(&"bash.enabled"));
        assert!(fields.contains(&"models.allowed"));
    }

    #[test]
    fn test_dropped_denials_warn() {
        let parent = PresetName::Standard.matrix();
        let mut child = parent.clone();
        child.bash.denied_patterns.clear();
        let report = validate_inheritance(&parent, &child);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), parent.bash.denied_patterns.len());
    }
}
