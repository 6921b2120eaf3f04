//! Predecessor graph construction and topological ordering (spec.md §4.6).
//!
//! Summary tasks carry no duration of their own and are excluded from the
//! CPM node set; predecessor links that point at an outline absent from the
//! schedulable set (including unresolved ones the validator would have
//! already flagged) are silently skipped here rather than re-diagnosed.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;
use utf8proj_core::{parse_outline, LinkType, Task};
use utf8proj_parser::{duration, lag};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("predecessor graph contains a cycle touching: {0:?}")]
    Cycle(Vec<String>),
}

/// One resolved precedence edge: link type plus lag already converted to
/// canonical days.
#[derive(Clone, Copy, Debug)]
pub struct Edge {
    pub link_type: LinkType,
    pub lag_days: f64,
}

/// The schedulable subgraph of a project: non-summary tasks ordered by
/// outline number, with predecessor/successor adjacency resolved by outline
/// lookup and a topological order ready for the forward/backward CPM passes.
pub struct SchedulingGraph {
    pub tasks: Vec<Task>,
    pub index: HashMap<String, usize>,
    pub duration_days: Vec<f64>,
    /// Incoming edges per node: `(predecessor index, edge)`.
    pub predecessors: Vec<Vec<(usize, Edge)>>,
    /// Outgoing edges per node: `(successor index, edge)`.
    pub successors: Vec<Vec<(usize, Edge)>>,
    pub topo_order: Vec<usize>,
}

impl SchedulingGraph {
    pub fn build(tasks: &[Task]) -> Result<Self, GraphError> {
        let mut nodes: Vec<Task> = tasks.iter().filter(|t| !t.summary).cloned().collect();
        nodes.sort_by(|a, b| compare_outline(&a.outline_number, &b.outline_number));

        let index: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, t)| (t.outline_number.clone(), i))
            .collect();

        let duration_days: Vec<f64> = nodes
            .iter()
            .map(|t| {
                let hours = duration::parse_hours(&t.duration).unwrap_or(0.0);
                duration::hours_to_days(hours)
            })
            .collect();

        let mut predecessors: Vec<Vec<(usize, Edge)>> = vec![Vec::new(); nodes.len()];
        let mut successors: Vec<Vec<(usize, Edge)>> = vec![Vec::new(); nodes.len()];

        for (i, task) in nodes.iter().enumerate() {
            for link in &task.predecessors {
                let Some(&p) = index.get(link.predecessor_outline.as_str()) else {
                    continue;
                };
                let edge = Edge {
                    link_type: link.link_type,
                    lag_days: lag::to_days(link.lag, link.lag_format),
                };
                predecessors[i].push((p, edge));
                successors[p].push((i, edge));
            }
        }

        let topo_order = topological_sort(&nodes, &predecessors)?;

        Ok(Self {
            tasks: nodes,
            index,
            duration_days,
            predecessors,
            successors,
            topo_order,
        })
    }
}

/// Lexicographic comparison by integer outline segments (spec.md §3
/// invariant 2), falling back to raw string order for malformed input that
/// slipped past validation.
pub fn compare_outline(a: &str, b: &str) -> std::cmp::Ordering {
    match (parse_outline(a), parse_outline(b)) {
        (Some(sa), Some(sb)) => sa.cmp(&sb),
        _ => a.cmp(b),
    }
}

fn topological_sort(
    nodes: &[Task],
    predecessors: &[Vec<(usize, Edge)>],
) -> Result<Vec<usize>, GraphError> {
    let n = nodes.len();
    let mut in_degree = vec![0usize; n];
    let mut successors_idx: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, preds) in predecessors.iter().enumerate() {
        in_degree[i] = preds.len();
        for (p, _) in preds {
            successors_idx[*p].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &s in &successors_idx[i] {
            in_degree[s] -= 1;
            if in_degree[s] == 0 {
                queue.push_back(s);
            }
        }
    }

    if order.len() != n {
        let resolved: std::collections::HashSet<usize> = order.iter().copied().collect();
        let remaining = (0..n)
            .filter(|i| !resolved.contains(i))
            .map(|i| nodes[i].outline_number.clone())
            .collect();
        return Err(GraphError::Cycle(remaining));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use utf8proj_core::PredecessorLink;

    fn task(outline: &str, duration: &str) -> Task {
        Task::new("p1", outline, outline).duration(duration)
    }

    #[test]
    fn excludes_summary_tasks_from_node_set() {
        let tasks = vec![
            Task::new("p1", "1", "Phase").summary(),
            task("1.1", "PT8H0M0S"),
        ];
        let graph = SchedulingGraph::build(&tasks).unwrap();
        assert_eq!(graph.tasks.len(), 1);
        assert_eq!(graph.tasks[0].outline_number, "1.1");
    }

    #[test]
    fn resolves_predecessor_by_outline_lookup() {
        let t2 = task("2", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "1", LinkType::FinishToStart, 0, 7));
        let tasks = vec![task("1", "PT8H0M0S"), t2];
        let graph = SchedulingGraph::build(&tasks).unwrap();
        let i2 = graph.index["2"];
        assert_eq!(graph.predecessors[i2].len(), 1);
        let (p, _) = graph.predecessors[i2][0];
        assert_eq!(graph.tasks[p].outline_number, "1");
    }

    #[test]
    fn unresolvable_predecessor_is_skipped_not_errored() {
        let t1 = task("1", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "9.9", LinkType::FinishToStart, 0, 7));
        let graph = SchedulingGraph::build(&[t1]).unwrap();
        assert!(graph.predecessors[0].is_empty());
    }

    #[test]
    fn detects_cycle() {
        let t1 = task("1", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "2", LinkType::FinishToStart, 0, 7));
        let t2 = task("2", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "1", LinkType::FinishToStart, 0, 7));
        let err = SchedulingGraph::build(&[t1, t2]).unwrap_err();
        assert!(matches!(err, GraphError::Cycle(outlines) if outlines.len() == 2));
    }

    #[test]
    fn topo_order_respects_precedence() {
        let t2 = task("2", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "1", LinkType::FinishToStart, 0, 7));
        let graph = SchedulingGraph::build(&[task("1", "PT8H0M0S"), t2]).unwrap();
        let pos1 = graph
            .topo_order
            .iter()
            .position(|&i| graph.tasks[i].outline_number == "1")
            .unwrap();
        let pos2 = graph
            .topo_order
            .iter()
            .position(|&i| graph.tasks[i].outline_number == "2")
            .unwrap();
        assert!(pos1 < pos2);
    }
}
