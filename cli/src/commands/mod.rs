pub mod cli;
pub mod plan;
pub mod presets;
pub mod run;
pub mod validate;

use std::path::Path;

use dagwave_core::api::{CliError, Dag, DagDefinition};

/// Read a DAG definition file and build the graph.
///
/// Unreadable files are io errors; anything that parses but does not form a
/// valid graph is an invalid DAG.
pub fn load_dag(path: &Path) -> Result<Dag, CliError> {
    if !path.exists() {
        return Err(CliError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("DAG file not found: {}", path.display()),
        )));
    }
    let def = DagDefinition::load(path).map_err(|e| CliError::InvalidDag(format!("{e:#}")))?;
    let dag = def.into_dag()?;
    tracing::debug!(dag_id = dag.id(), nodes = dag.len(), "loaded DAG");
    Ok(dag)
}
