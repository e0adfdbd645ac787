//! # Conflict detection
//!
//! Graph-level safety (no path between two nodes of a wave) says nothing
//! about shared resources. This module inspects a wave for nodes that would
//! contend on the same file, singleton operation or mutating tool, and
//! reports the conflicts together with a remediation hint. It only advises;
//! the orchestrator never reorders work on its own.

mod singleton;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::graph::{Dag, Node, NodeId, NodeKind};

pub use singleton::{detect_singleton, SingletonKind};

/// Optional per-node hints produced by a task decomposer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskHints {
    #[serde(default)]
    pub predicted_files: Vec<String>,
    #[serde(default)]
    pub singleton: Option<SingletonKind>,
}

pub type HintMap = HashMap<NodeId, SubtaskHints>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    File,
    Singleton,
    Tool,
}

/// Two or more nodes of one wave contending on the same resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConflict {
    pub kind: ConflictKind,
    pub node_ids: Vec<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub singleton: Option<SingletonKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub description: String,
}

impl NodeConflict {
    fn new(kind: ConflictKind, node_ids: Vec<NodeId>, description: String) -> Self {
        Self {
            kind,
            node_ids,
            file_path: None,
            singleton: None,
            tool: None,
            description,
        }
    }

    pub fn involves(&self, id: &NodeId) -> bool {
        self.node_ids.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    pub can_parallelize: bool,
    pub conflicts: Vec<NodeConflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Tool names with these prefixes are treated as side-effecting.
const MUTATING_TOOL_PREFIXES: [&str; 4] = ["write", "create", "delete", "update"];

/// Analyze one wave.
///
/// A wave of zero or one node is reported as not parallel (there is nothing
/// to run alongside) with no conflicts.
pub fn analyze_wave(dag: &Dag, node_ids: &[NodeId], hints: Option<&HintMap>) -> ConflictAnalysis {
    if node_ids.len() <= 1 {
        return ConflictAnalysis {
            can_parallelize: false,
            conflicts: Vec::new(),
            remediation: None,
        };
    }

    let nodes: Vec<&Node> = node_ids.iter().filter_map(|id| dag.node(id.as_str())).collect();

    let mut conflicts = detect_singleton_conflicts(&nodes, hints);
    conflicts.extend(detect_file_conflicts(&nodes, hints));
    conflicts.extend(detect_tool_conflicts(&nodes));

    let can_parallelize = conflicts.is_empty();
    let remediation = (!can_parallelize).then(|| suggest_remediation(&conflicts));

    ConflictAnalysis {
        can_parallelize,
        conflicts,
        remediation,
    }
}

/// Pairwise scan over every node of the DAG, regardless of waves.
///
/// Each conflict is listed under every node it involves.
pub fn find_all_conflicts(dag: &Dag, hints: Option<&HintMap>) -> BTreeMap<NodeId, Vec<NodeConflict>> {
    let mut by_node: BTreeMap<NodeId, Vec<NodeConflict>> = BTreeMap::new();
    let ids = dag.node_ids();

    for (i, first) in ids.iter().enumerate() {
        for second in &ids[i + 1..] {
            let pair = [first.clone(), second.clone()];
            for conflict in analyze_wave(dag, &pair, hints).conflicts {
                for id in &conflict.node_ids {
                    by_node.entry(id.clone()).or_default().push(conflict.clone());
                }
            }
        }
    }

    by_node
}

/// Backslashes become slashes, then lowercase and trim.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").to_lowercase().trim().to_string()
}

/// Whether two write scopes overlap. `*` wildcards are honoured on either side.
pub fn paths_conflict(a: &str, b: &str) -> bool {
    let a = normalize_path(a);
    let b = normalize_path(b);
    if a == b {
        return true;
    }
    if !a.contains('*') && !b.contains('*') {
        return false;
    }
    let matches = |pattern: &str, candidate: &str| {
        glob::Pattern::new(pattern)
            .map(|p| p.matches(candidate))
            .unwrap_or(false)
    };
    matches(&a, &b) || matches(&b, &a)
}

fn singleton_of(node: &Node, hints: Option<&HintMap>) -> Option<SingletonKind> {
    node.config
        .singleton
        .or_else(|| hints.and_then(|h| h.get(&node.id)).and_then(|h| h.singleton))
        .or_else(|| node.prompt.as_deref().and_then(detect_singleton))
        .or_else(|| detect_singleton(node.id.as_str()))
}

fn detect_singleton_conflicts(nodes: &[&Node], hints: Option<&HintMap>) -> Vec<NodeConflict> {
    let mut conflicts = Vec::new();

    let singletons: Vec<(&NodeId, SingletonKind)> = nodes
        .iter()
        .filter_map(|n| singleton_of(n, hints).map(|kind| (&n.id, kind)))
        .collect();

    let mut groups: BTreeMap<SingletonKind, Vec<NodeId>> = BTreeMap::new();
    for (id, kind) in &singletons {
        groups.entry(*kind).or_default().push((*id).clone());
    }
    for (kind, ids) in groups {
        if ids.len() > 1 {
            let mut conflict = NodeConflict::new(
                ConflictKind::Singleton,
                ids.clone(),
                format!(
                    "Multiple {kind} tasks cannot run in parallel: {}",
                    join_ids(&ids)
                ),
            );
            conflict.singleton = Some(kind);
            conflicts.push(conflict);
        }
    }

    if !singletons.is_empty() && nodes.len() > singletons.len() {
        let singleton_ids: Vec<NodeId> = singletons.iter().map(|(id, _)| (*id).clone()).collect();
        let regular_ids: Vec<NodeId> = nodes
            .iter()
            .map(|n| n.id.clone())
            .filter(|id| !singleton_ids.contains(id))
            .collect();

        let description = format!(
            "Singleton tasks ({}) must run alone, not with {}",
            join_ids(&singleton_ids),
            join_ids(&regular_ids)
        );
        let mut all = singleton_ids;
        all.extend(regular_ids);
        conflicts.push(NodeConflict::new(ConflictKind::Singleton, all, description));
    }

    conflicts
}

fn write_scopes(node: &Node, hints: Option<&HintMap>) -> BTreeSet<String> {
    let predicted = hints
        .and_then(|h| h.get(&node.id))
        .map(|h| h.predicted_files.as_slice())
        .unwrap_or_default();

    node.config
        .writes
        .iter()
        .chain(predicted)
        .map(|p| normalize_path(p))
        .filter(|p| !p.is_empty())
        .collect()
}

fn detect_file_conflicts(nodes: &[&Node], hints: Option<&HintMap>) -> Vec<NodeConflict> {
    let scopes: Vec<(&NodeId, BTreeSet<String>)> = nodes
        .iter()
        .map(|n| (&n.id, write_scopes(n, hints)))
        .collect();

    // Exact paths: path -> writers, in wave order.
    let mut writers: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
    for (id, paths) in &scopes {
        for path in paths {
            writers.entry(path.as_str()).or_default().push((*id).clone());
        }
    }

    let mut conflicts = Vec::new();
    let mut covered: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();

    for (path, ids) in writers {
        if ids.len() < 2 {
            continue;
        }
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                covered.insert(ordered_pair(a, b));
            }
        }
        let mut conflict = NodeConflict::new(
            ConflictKind::File,
            ids.clone(),
            format!("File {path} modified by multiple tasks: {}", join_ids(&ids)),
        );
        conflict.file_path = Some(path.to_string());
        conflicts.push(conflict);
    }

    // Wildcard scopes: one conflict per node pair.
    for (i, (a, a_paths)) in scopes.iter().enumerate() {
        for (b, b_paths) in &scopes[i + 1..] {
            let pair = ordered_pair(a, b);
            if covered.contains(&pair) {
                continue;
            }
            let overlap = a_paths
                .iter()
                .flat_map(|pa| b_paths.iter().map(move |pb| (pa, pb)))
                .find(|(pa, pb)| (pa.contains('*') || pb.contains('*')) && paths_conflict(pa, pb));

            if let Some((pa, pb)) = overlap {
                covered.insert(pair);
                let ids = vec![(*a).clone(), (*b).clone()];
                let mut conflict = NodeConflict::new(
                    ConflictKind::File,
                    ids.clone(),
                    format!("Write scopes {pa} and {pb} overlap: {}", join_ids(&ids)),
                );
                conflict.file_path = Some(if pa.contains('*') { pa.clone() } else { pb.clone() });
                conflicts.push(conflict);
            }
        }
    }

    conflicts
}

fn mutating_tool(node: &Node) -> Option<&str> {
    if node.kind != NodeKind::ToolCall {
        return None;
    }
    let capability = node.capability.as_deref()?;
    let (_, tool) = capability.split_once(':')?;
    let tool = tool.to_lowercase();
    MUTATING_TOOL_PREFIXES
        .iter()
        .any(|prefix| tool.starts_with(prefix))
        .then_some(capability)
}

fn detect_tool_conflicts(nodes: &[&Node]) -> Vec<NodeConflict> {
    let mut groups: BTreeMap<&str, Vec<NodeId>> = BTreeMap::new();
    for node in nodes {
        if let Some(tool) = mutating_tool(node) {
            groups.entry(tool).or_default().push(node.id.clone());
        }
    }

    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(tool, ids)| {
            let mut conflict = NodeConflict::new(
                ConflictKind::Tool,
                ids.clone(),
                format!("Mutating tool {tool} invoked by multiple tasks: {}", join_ids(&ids)),
            );
            conflict.tool = Some(tool.to_string());
            conflict
        })
        .collect()
}

fn suggest_remediation(conflicts: &[NodeConflict]) -> String {
    let count = |kind: ConflictKind| conflicts.iter().filter(|c| c.kind == kind).count();
    let mut suggestions = Vec::new();

    let files = count(ConflictKind::File);
    if files > 0 {
        suggestions.push(format!(
            "File conflicts detected: {files} file(s) modified by multiple tasks."
        ));
        suggestions.push(
            "Solution: Add dependencies to make these tasks sequential, or decompose differently to avoid file overlap."
                .to_string(),
        );
    }

    let singletons = count(ConflictKind::Singleton);
    if singletons > 0 {
        suggestions.push(format!(
            "Singleton task conflicts detected: {singletons} singleton operation(s) in wave."
        ));
        suggestions.push(
            "Solution: Singleton tasks (build, lint, test) must run alone. Move to separate wave."
                .to_string(),
        );
    }

    let tools = count(ConflictKind::Tool);
    if tools > 0 {
        suggestions.push(format!(
            "Tool conflicts detected: {tools} mutating tool(s) shared by multiple tasks."
        ));
        suggestions.push(
            "Solution: Serialize calls to the same mutating tool with an explicit dependency."
                .to_string(),
        );
    }

    suggestions.join(" ")
}

fn ordered_pair(a: &NodeId, b: &NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}
