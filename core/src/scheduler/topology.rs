use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::graph::{Dag, NodeId};

/// A batch of nodes that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub wave_number: usize,
    pub node_ids: Vec<NodeId>,
}

/// Outcome of [`topological_sort`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SortResult {
    Sorted {
        waves: Vec<Wave>,
        /// Flattened execution order (waves concatenated).
        order: Vec<NodeId>,
    },
    Cycle {
        /// Closed loop: each node depends on the next, last equals first.
        cycle: Vec<NodeId>,
    },
}

impl SortResult {
    pub fn success(&self) -> bool {
        matches!(self, Self::Sorted { .. })
    }

    pub fn waves(&self) -> &[Wave] {
        match self {
            Self::Sorted { waves, .. } => waves,
            Self::Cycle { .. } => &[],
        }
    }

    pub fn order(&self) -> &[NodeId] {
        match self {
            Self::Sorted { order, .. } => order,
            Self::Cycle { .. } => &[],
        }
    }

    pub fn cycle(&self) -> Option<&[NodeId]> {
        match self {
            Self::Sorted { .. } => None,
            Self::Cycle { cycle } => Some(cycle),
        }
    }
}

/// Topological sort using Kahn's algorithm, grouped into waves.
///
/// # Algorithm
///
/// 1. Calculate the unresolved-dependency count for every node
/// 2. Collect all nodes with count 0 into the next wave
/// 3. Decrement the counts of their dependents
/// 4. Repeat until all nodes are placed, or no node is collectable (cycle)
///
/// Nodes inside a wave keep DAG insertion order, so the output is fully
/// deterministic for a given DAG.
///
/// A dependency on a node that is not in the DAG can never resolve; it is
/// reported as the two-element cycle `[dependency, node]`.
///
/// # Time Complexity
///
/// O(V log V + E) where V = number of nodes, E = number of dependencies.
/// The log factor comes from restoring insertion order within each wave.
pub fn topological_sort(dag: &Dag) -> SortResult {
    for node in dag.nodes() {
        if let Some(missing) = node.dependencies.iter().find(|d| !dag.contains(d.as_str())) {
            return SortResult::Cycle {
                cycle: vec![missing.clone(), node.id.clone()],
            };
        }
    }

    let position: HashMap<&NodeId, usize> = dag
        .node_ids()
        .iter()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();

    // edges[A] = {B, C} means A depends on B and C, so A's in-degree = 2
    let mut in_degree: HashMap<&NodeId, usize> = dag
        .nodes()
        .map(|n| (&n.id, n.dependencies.len()))
        .collect();

    let mut current: Vec<NodeId> = dag
        .nodes()
        .filter(|n| n.dependencies.is_empty())
        .map(|n| n.id.clone())
        .collect();

    let mut waves = Vec::new();
    let mut order = Vec::with_capacity(dag.len());

    while !current.is_empty() {
        let mut next = Vec::new();

        for node_id in &current {
            for dependent in dag.dependents(node_id.as_str()) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        next.push(dependent.clone());
                    }
                }
            }
        }

        // Preserve insertion order
        next.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));

        order.extend(current.iter().cloned());
        waves.push(Wave {
            wave_number: waves.len(),
            node_ids: std::mem::take(&mut current),
        });
        current = next;
    }

    if order.len() != dag.len() {
        let placed: HashSet<&NodeId> = order.iter().collect();
        let remaining: Vec<&NodeId> = dag
            .node_ids()
            .iter()
            .filter(|id| !placed.contains(id))
            .collect();
        return SortResult::Cycle {
            cycle: walk_back_cycle(dag, &remaining),
        };
    }

    SortResult::Sorted { waves, order }
}

pub fn is_acyclic(dag: &Dag) -> bool {
    topological_sort(dag).success()
}

/// Return a cycle if one exists.
pub fn find_cycle(dag: &Dag) -> Option<Vec<NodeId>> {
    match topological_sort(dag) {
        SortResult::Cycle { cycle } => Some(cycle),
        SortResult::Sorted { .. } => None,
    }
}

/// Walk dependency chains among unresolved nodes until a node repeats.
///
/// Every unresolved node has at least one unresolved dependency, so the walk
/// always closes a loop.
fn walk_back_cycle(dag: &Dag, remaining: &[&NodeId]) -> Vec<NodeId> {
    let unresolved: HashSet<&NodeId> = remaining.iter().copied().collect();
    let Some(start) = remaining.first() else {
        return Vec::new();
    };

    let mut path: Vec<NodeId> = Vec::new();
    let mut seen: HashMap<NodeId, usize> = HashMap::new();
    let mut current: NodeId = (*start).clone();

    loop {
        if let Some(&idx) = seen.get(&current) {
            let mut cycle = path[idx..].to_vec();
            cycle.push(current);
            return cycle;
        }

        seen.insert(current.clone(), path.len());
        path.push(current.clone());

        let next = dag.node(current.as_str()).and_then(|node| {
            node.dependencies
                .iter()
                .find(|dep| unresolved.contains(dep))
                .cloned()
        });

        match next {
            Some(dep) => current = dep,
            None => return path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DagBuilder, Node, NodeKind};
    use pretty_assertions::assert_eq;

    fn ids(wave: &Wave) -> Vec<&str> {
        wave.node_ids.iter().map(|id| id.as_str()).collect()
    }

    fn diamond() -> Dag {
        DagBuilder::new("diamond", "Diamond")
            .task("A", &[])
            .task("B", &["A"])
            .task("C", &["A"])
            .task("D", &["B", "C"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_diamond_waves() {
        let result = topological_sort(&diamond());
        assert!(result.success());

        let waves = result.waves();
        assert_eq!(waves.len(), 3);
        assert_eq!(ids(&waves[0]), vec!["A"]);
        assert_eq!(ids(&waves[1]), vec!["B", "C"]);
        assert_eq!(ids(&waves[2]), vec!["D"]);
        assert_eq!(waves[2].wave_number, 2);
        assert_eq!(result.order().len(), 4);
    }

    #[test]
    fn test_empty_dag() {
        let dag = Dag::new("empty", "empty");
        let result = topological_sort(&dag);
        assert!(result.success());
        assert!(result.waves().is_empty());
    }

    #[test]
    fn test_independent_nodes_share_wave_zero() {
        let dag = DagBuilder::new("flat", "flat")
            .task("x", &[])
            .task("y", &[])
            .task("z", &[])
            .build()
            .unwrap();
        let result = topological_sort(&dag);
        assert_eq!(result.waves().len(), 1);
        assert_eq!(ids(&result.waves()[0]), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_wave_index_exceeds_all_dependencies() {
        let dag = DagBuilder::new("chain", "chain")
            .task("a", &[])
            .task("b", &["a"])
            .task("c", &["a", "b"])
            .task("d", &[])
            .task("e", &["d", "c"])
            .build()
            .unwrap();
        let result = topological_sort(&dag);

        let mut wave_of = HashMap::new();
        for wave in result.waves() {
            for id in &wave.node_ids {
                assert!(wave_of.insert(id.clone(), wave.wave_number).is_none());
            }
        }
        assert_eq!(wave_of.len(), dag.len());

        for node in dag.nodes() {
            for dep in &node.dependencies {
                assert!(wave_of[&node.id] > wave_of[dep]);
            }
        }
    }

    #[test]
    fn test_sort_is_idempotent() {
        let dag = diamond();
        assert_eq!(topological_sort(&dag), topological_sort(&dag));
    }

    #[test]
    fn test_cycle_reported_as_closed_loop() {
        let dag = DagBuilder::new("cyc", "cyc")
            .task("root", &[])
            .task("a", &["root", "c"])
            .task("b", &["a"])
            .task("c", &["b"])
            .build()
            .unwrap();

        let result = topological_sort(&dag);
        assert!(!result.success());
        let cycle = result.cycle().unwrap();

        assert!(cycle.len() >= 2);
        assert_eq!(cycle.first(), cycle.last());
        for pair in cycle.windows(2) {
            let node = dag.node(pair[0].as_str()).unwrap();
            assert!(node.dependencies.contains(&pair[1]));
        }
    }

    #[test]
    fn test_missing_dependency_reported_as_pair() {
        let mut dag = Dag::new("m", "m");
        dag.add_node(Node::new("b", NodeKind::GenericTask).depends_on(["ghost"]))
            .unwrap();
        let result = topological_sort(&dag);
        assert_eq!(
            result.cycle().unwrap(),
            &[NodeId::from("ghost"), NodeId::from("b")]
        );
    }

    #[test]
    fn test_find_cycle_and_is_acyclic() {
        assert!(is_acyclic(&diamond()));
        assert!(find_cycle(&diamond()).is_none());

        let cyclic = DagBuilder::new("c", "c")
            .task("a", &["b"])
            .task("b", &["a"])
            .build()
            .unwrap();
        assert!(!is_acyclic(&cyclic));
        assert_eq!(find_cycle(&cyclic).unwrap().len(), 3);
    }

    #[test]
    fn test_wide_fan_out_keeps_insertion_order() {
        // Leaves alternate between two roots, so discovery order differs
        // from insertion order.
        let width = 20_000;
        let mut builder = DagBuilder::new("fan", "fan").task("a", &[]).task("b", &[]);
        for i in 0..width {
            let root = if i % 2 == 0 { "b" } else { "a" };
            builder = builder.task(&format!("leaf-{i:05}"), &[root]);
        }
        let dag = builder.build().unwrap();

        let started = std::time::Instant::now();
        let result = topological_sort(&dag);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));

        let waves = result.waves();
        assert_eq!(waves.len(), 2);
        assert_eq!(ids(&waves[0]), vec!["a", "b"]);
        assert_eq!(waves[1].node_ids.len(), width);
        let expected: Vec<String> = (0..width).map(|i| format!("leaf-{i:05}")).collect();
        let actual: Vec<String> = waves[1].node_ids.iter().map(|id| id.to_string()).collect();
        assert_eq!(actual, expected);
    }
}
