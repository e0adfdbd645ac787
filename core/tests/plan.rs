mod common;

use std::collections::HashMap;

use common::{diamond, id};
use dagwave_core::api::{ConflictKind, DagBuilder, Orchestrator, SingletonKind, SubtaskHints};
use pretty_assertions::assert_eq;

#[test]
fn test_plan_for_diamond() {
    let orchestrator = Orchestrator::builder().build();
    let plan = orchestrator.generate_execution_plan(&diamond(), None, None);

    assert!(plan.is_valid());
    assert_eq!(plan.total_nodes, 4);
    assert_eq!(plan.total_waves, 3);
    assert_eq!(plan.waves[1].node_ids, vec![id("B"), id("C")]);
    assert!(plan.waves[1].parallelizable);
    assert!(!plan.waves[0].parallelizable);
    assert_eq!(plan.conflict_count(), 0);

    let d = &plan.waves[2].dispatches[&id("D")];
    assert_eq!(d.agent_type, "general-purpose");
    assert_eq!(d.description, "Execute node D");
}

#[test]
fn test_plan_surfaces_conflicts_from_hints() {
    let orchestrator = Orchestrator::builder().build();
    let hints = HashMap::from([
        (
            id("B"),
            SubtaskHints {
                predicted_files: vec!["src/lib.rs".to_string()],
                singleton: None,
            },
        ),
        (
            id("C"),
            SubtaskHints {
                predicted_files: vec!["SRC\\lib.rs".to_string()],
                singleton: None,
            },
        ),
    ]);

    let plan = orchestrator.generate_execution_plan(&diamond(), None, Some(&hints));

    let wave = &plan.waves[1];
    assert!(!wave.parallelizable);
    assert_eq!(wave.conflicts.len(), 1);
    assert_eq!(wave.conflicts[0].kind, ConflictKind::File);
    assert!(wave.conflicts[0].involves(&id("B")));
    assert!(wave.conflicts[0].involves(&id("C")));
    assert!(wave.conflict_reason.is_some());
}

#[test]
fn test_plan_detects_singleton_from_prompt() {
    let dag = DagBuilder::new("ci", "CI")
        .node(
            dagwave_core::api::Node::new("compile", dagwave_core::api::NodeKind::GenericTask)
                .with_description("produce release artifacts")
                .with_prompt("run cargo build --release"),
        )
        .node(
            dagwave_core::api::Node::new("docs", dagwave_core::api::NodeKind::GenericTask)
                .with_description("write the changelog"),
        )
        .node(
            dagwave_core::api::Node::new("notes", dagwave_core::api::NodeKind::GenericTask)
                .with_description("summarize the cargo build output"),
        )
        .build()
        .unwrap();

    let plan = Orchestrator::builder()
        .build()
        .generate_execution_plan(&dag, None, None);

    let conflicts = &plan.waves[0].conflicts;
    assert_eq!(conflicts.len(), 1);
    let conflict = &conflicts[0];
    assert_eq!(conflict.kind, ConflictKind::Singleton);
    assert!(conflict.involves(&id("compile")));
    assert!(conflict.description.contains("must run alone"));
    assert_eq!(
        dagwave_core::api::detect_singleton("run cargo build --release"),
        Some(SingletonKind::Build)
    );
}

#[test]
fn test_plan_reports_cycle() {
    let dag = DagBuilder::new("loop", "Loop")
        .task("a", &["b"])
        .task("b", &["a"])
        .build()
        .unwrap();

    let plan = Orchestrator::builder()
        .build()
        .generate_execution_plan(&dag, None, None);

    assert!(!plan.is_valid());
    assert_eq!(plan.total_waves, 0);
    assert!(plan.error.unwrap().starts_with("Cycle detected"));
}
