use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::dag::{Dag, DagOutput};
use super::node::Node;
use crate::error::GraphError;

/// Serializable description of a DAG (JSON or TOML).
///
/// This is an input format only; execution state is never written back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagDefinition {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub outputs: Vec<DagOutput>,
}

impl DagDefinition {
    pub fn from_json_str(s: &str) -> Result<Self, GraphError> {
        serde_json::from_str(s).map_err(|e| GraphError::Definition(e.to_string()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self, GraphError> {
        toml::from_str(s).map_err(|e| GraphError::Definition(e.to_string()))
    }

    /// Load a definition file; `.toml` files are parsed as TOML, anything else as JSON.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read DAG file {}", path.display()))?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let def = if is_toml {
            Self::from_toml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        };
        def.with_context(|| format!("failed to parse DAG file {}", path.display()))
    }

    pub fn into_dag(self) -> Result<Dag, GraphError> {
        let name = if self.name.trim().is_empty() {
            self.id.clone()
        } else {
            self.name
        };

        let mut dag = Dag::new(self.id, name);
        for mut node in self.nodes {
            if node.name.trim().is_empty() {
                node.name = node.id.to_string();
            }
            dag.add_node(node)?;
        }
        for output in self.outputs {
            dag.add_output(output);
        }
        dag.validate()?;
        Ok(dag)
    }
}

impl TryFrom<DagDefinition> for Dag {
    type Error = GraphError;

    fn try_from(def: DagDefinition) -> Result<Self, Self::Error> {
        def.into_dag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use std::io::Write;

    #[test]
    fn test_json_definition() {
        let def = DagDefinition::from_json_str(
            r#"{
                "id": "research",
                "nodes": [
                    {"id": "search", "kind": "tool-call", "capability": "brave-search:search"},
                    {"id": "summarize", "kind": "agent-task", "dependencies": ["search"]}
                ],
                "outputs": [{"name": "summary", "source": "summarize"}]
            }"#,
        )
        .unwrap();

        let dag = def.into_dag().unwrap();
        assert_eq!(dag.name(), "research");
        assert_eq!(dag.node("search").unwrap().kind, NodeKind::ToolCall);
        assert_eq!(dag.node("summarize").unwrap().name, "summarize");
        assert_eq!(dag.outputs()[0].source_node_id.as_str(), "summarize");
    }

    #[test]
    fn test_toml_definition_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
id = "build"
name = "Build pipeline"

[[nodes]]
id = "compile"
description = "npm run build"
[nodes.config]
singleton = "build"

[[nodes]]
id = "docs"
dependencies = ["compile"]
"#
        )
        .unwrap();

        let dag = DagDefinition::load(file.path()).unwrap().into_dag().unwrap();
        assert_eq!(dag.name(), "Build pipeline");
        assert_eq!(dag.len(), 2);
        assert!(dag.node("compile").unwrap().config.singleton.is_some());
    }

    #[test]
    fn test_invalid_json_is_definition_error() {
        let err = DagDefinition::from_json_str("{").unwrap_err();
        assert!(matches!(err, GraphError::Definition(_)));
    }
}
