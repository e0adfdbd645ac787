use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::graph::{Dag, Node, NodeId};
use crate::state::{TaskResult, TokenUsage};

/// Per-run bookkeeping owned by the orchestrator loop.
///
/// Mutated only between batches, never while a wave is in flight.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub dag_id: String,
    /// Run inputs, exposed to every node as variable bindings.
    pub variables: serde_json::Map<String, Value>,
    pub node_results: BTreeMap<NodeId, TaskResult>,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl ExecutionContext {
    pub fn new(dag: &Dag, inputs: Option<&serde_json::Map<String, Value>>) -> Self {
        Self {
            execution_id: format!("exec-{}", uuid::Uuid::new_v4()),
            dag_id: dag.id().to_string(),
            variables: inputs.cloned().unwrap_or_default(),
            node_results: BTreeMap::new(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Outputs of the node's completed dependencies.
    pub fn dependency_outputs(&self, node: &Node) -> BTreeMap<NodeId, Value> {
        node.dependencies
            .iter()
            .filter_map(|dep| {
                self.node_results
                    .get(dep)
                    .map(|r| (dep.clone(), r.output.clone()))
            })
            .collect()
    }

    pub fn total_token_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for result in self.node_results.values() {
            total.add(&result.token_usage);
        }
        total
    }

    /// Collect each declared DAG output from its source node's result.
    ///
    /// A source that produced a result but lacks the requested path still
    /// yields its output name, bound to `null`.
    pub fn collect_outputs(&self, dag: &Dag) -> BTreeMap<String, Value> {
        dag.outputs()
            .iter()
            .filter_map(|output| {
                let result = self.node_results.get(&output.source_node_id)?;
                let value = output.extract(&result.output).unwrap_or_else(|| {
                    tracing::warn!(
                        output = %output.name,
                        source = %output.source_node_id,
                        path = ?output.output_path,
                        "output path did not resolve"
                    );
                    Value::Null
                });
                Some((output.name.clone(), value))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DagBuilder, DagOutput};
    use serde_json::json;

    #[test]
    fn test_collect_outputs_and_usage() {
        let dag = DagBuilder::new("d", "d")
            .task("a", &[])
            .task("b", &["a"])
            .output("whole", "b")
            .output_at(DagOutput::new("summary", "b").with_path("summary"))
            .output("missing", "a")
            .build()
            .unwrap();

        let mut ctx = ExecutionContext::new(&dag, None);
        ctx.node_results.insert(
            NodeId::from("b"),
            TaskResult::new(json!({"summary": "ok"})).with_token_usage(TokenUsage::new(10, 5)),
        );

        let outputs = ctx.collect_outputs(&dag);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["summary"], json!("ok"));
        assert_eq!(ctx.total_token_usage().total(), 15);

        let b = dag.node("b").unwrap();
        assert!(ctx.dependency_outputs(b).is_empty());
    }

    #[test]
    fn test_unresolved_path_binds_null() {
        let dag = DagBuilder::new("d", "d")
            .task("a", &[])
            .output_at(DagOutput::new("deep", "a").with_path("no.such.field"))
            .output_at(DagOutput::new("item", "a").with_path("list.5"))
            .build()
            .unwrap();

        let mut ctx = ExecutionContext::new(&dag, None);
        ctx.node_results
            .insert(NodeId::from("a"), TaskResult::new(json!({"list": [1, 2]})));

        let outputs = ctx.collect_outputs(&dag);
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs["deep"], Value::Null);
        assert_eq!(outputs["item"], Value::Null);
    }
}
