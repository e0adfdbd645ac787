use std::io::Write;

use dagwave_core::api::{
    compute_stats, find_critical_path, validate_dag, CliError, Dag, ValidationIssue,
};

use super::cli::ValidateArgs;
use super::load_dag;

pub fn validate_cmd(args: &ValidateArgs) -> Result<i32, CliError> {
    let dag = load_dag(&args.dag)?;
    let issues = validate_dag(&dag);

    let mut out = std::io::stdout().lock();
    render(&dag, &issues, &mut out)?;

    let errors = issues.iter().filter(|i| i.is_error()).count();
    if errors > 0 {
        return Err(CliError::InvalidDag(format!(
            "{} has {errors} error(s)",
            args.dag.display()
        )));
    }
    Ok(0)
}

pub fn render(dag: &Dag, issues: &[ValidationIssue], out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "{} ({})", dag.name(), dag.id())?;

    if issues.is_empty() {
        writeln!(out, "no issues")?;
    }
    for issue in issues {
        let level = if issue.is_error() { "error" } else { "warning" };
        writeln!(out, "{level}: {}", issue.message)?;
    }

    // Stats are meaningless for a cyclic graph.
    if issues.iter().any(|i| i.is_error()) {
        return Ok(());
    }

    let stats = compute_stats(dag);
    writeln!(
        out,
        "nodes={} edges={} roots={} leaves={} waves={} max_parallelism={} avg_parallelism={:.2}",
        stats.total_nodes,
        stats.total_edges,
        stats.root_nodes,
        stats.leaf_nodes,
        stats.wave_count,
        stats.max_parallelism,
        stats.avg_parallelism
    )?;

    let critical = find_critical_path(dag, None);
    let path: Vec<&str> = critical.path.iter().map(|id| id.as_str()).collect();
    writeln!(out, "critical path ({}): {}", critical.length, path.join(" -> "))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagwave_core::api::DagBuilder;

    fn rendered(dag: &Dag) -> String {
        let mut buf = Vec::new();
        render(dag, &validate_dag(dag), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_render_clean_dag() {
        let dag = DagBuilder::new("d", "Demo")
            .task("a", &[])
            .task("b", &["a"])
            .build()
            .unwrap();
        let text = rendered(&dag);
        assert!(text.contains("no issues"));
        assert!(text.contains("nodes=2 edges=1"));
        assert!(text.contains("critical path (2): a -> b"));
    }

    #[test]
    fn test_render_cycle_skips_stats() {
        let dag = DagBuilder::new("d", "Demo")
            .task("a", &["b"])
            .task("b", &["a"])
            .build()
            .unwrap();
        let text = rendered(&dag);
        assert!(text.contains("error: Cycle detected"));
        assert!(!text.contains("nodes="));
    }
}
