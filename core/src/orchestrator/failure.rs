use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::graph::{Dag, NodeId};
use crate::scheduler::transitive_dependencies;

/// What a failed or undispatched node does to the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Any node without a result aborts the remaining waves.
    #[default]
    AbortOnAnyFailure,
    /// Abort only when a declared DAG output depends on the failed node.
    /// Otherwise its dependents are skipped and the run continues.
    AbortOnOutputFailure,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AbortOnAnyFailure => "abort-on-any-failure",
            Self::AbortOnOutputFailure => "abort-on-output-failure",
        }
    }

    /// Whether losing `node_id`'s result must abort the run.
    pub fn is_critical(self, dag: &Dag, node_id: &NodeId) -> bool {
        match self {
            Self::AbortOnAnyFailure => true,
            Self::AbortOnOutputFailure => {
                if dag.outputs().is_empty() {
                    return true;
                }
                dag.outputs().iter().any(|output| {
                    output.source_node_id == *node_id
                        || transitive_dependencies(dag, output.source_node_id.as_str())
                            .contains(node_id)
                })
            }
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "abort-on-any-failure" | "any" => Ok(Self::AbortOnAnyFailure),
            "abort-on-output-failure" | "output" => Ok(Self::AbortOnOutputFailure),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DagBuilder;

    fn dag() -> Dag {
        // a -> b -> out ; a -> side
        DagBuilder::new("d", "d")
            .task("a", &[])
            .task("b", &["a"])
            .task("out", &["b"])
            .task("side", &["a"])
            .output("result", "out")
            .build()
            .unwrap()
    }

    #[test]
    fn test_any_failure_is_always_critical() {
        let dag = dag();
        assert!(FailurePolicy::AbortOnAnyFailure.is_critical(&dag, &NodeId::from("side")));
    }

    #[test]
    fn test_output_failure_follows_output_ancestry() {
        let dag = dag();
        let policy = FailurePolicy::AbortOnOutputFailure;
        assert!(policy.is_critical(&dag, &NodeId::from("a")));
        assert!(policy.is_critical(&dag, &NodeId::from("out")));
        assert!(!policy.is_critical(&dag, &NodeId::from("side")));
    }

    #[test]
    fn test_output_policy_without_outputs_behaves_like_default() {
        let dag = DagBuilder::new("d", "d").task("a", &[]).build().unwrap();
        assert!(FailurePolicy::AbortOnOutputFailure.is_critical(&dag, &NodeId::from("a")));
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "abort_on_output_failure".parse::<FailurePolicy>(),
            Ok(FailurePolicy::AbortOnOutputFailure)
        );
        assert!("sometimes".parse::<FailurePolicy>().is_err());
    }
}
