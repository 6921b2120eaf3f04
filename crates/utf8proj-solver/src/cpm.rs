//! Critical Path Method engine (spec.md §4.6).
//!
//! Forward pass computes early start/finish in topological order; backward
//! pass computes late start/finish in reverse topological order. Both passes
//! apply the link-type-specific formulas below exactly as tabulated, per
//! edge, with no special-casing beyond the sink/source seeds.

use thiserror::Error;

use crate::dag::{Edge, GraphError, SchedulingGraph};
use utf8proj_core::{LinkType, Task};

#[derive(Debug, Error)]
pub enum CpmError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("project has no schedulable tasks")]
    Empty,
}

/// Early/late start and finish, in canonical days from the project's
/// implicit day zero, for one schedulable task.
#[derive(Clone, Debug, PartialEq)]
pub struct TaskSchedule {
    pub outline_number: String,
    pub es: f64,
    pub ef: f64,
    pub ls: f64,
    pub lf: f64,
    pub total_float: f64,
    pub critical: bool,
}

#[derive(Clone, Debug)]
pub struct CpmSchedule {
    pub tasks: Vec<TaskSchedule>,
    pub project_duration_days: f64,
    pub critical_outlines: Vec<String>,
}

/// Below this magnitude, total float is treated as zero (spec.md §4.6).
const CRITICAL_TOLERANCE_DAYS: f64 = 0.01;

pub fn compute(tasks: &[Task]) -> Result<CpmSchedule, CpmError> {
    let graph = SchedulingGraph::build(tasks)?;
    if graph.tasks.is_empty() {
        return Err(CpmError::Empty);
    }

    let n = graph.tasks.len();
    let mut es = vec![0.0_f64; n];
    let mut ef = vec![0.0_f64; n];

    for &i in &graph.topo_order {
        let d = graph.duration_days[i];
        es[i] = if graph.predecessors[i].is_empty() {
            0.0
        } else {
            graph.predecessors[i]
                .iter()
                .map(|(p, edge)| start_from(edge, es[*p], ef[*p], d))
                .fold(f64::MIN, f64::max)
        };
        ef[i] = es[i] + d;
    }

    let project_duration_days = ef.iter().copied().fold(0.0_f64, f64::max);

    let mut ls = vec![0.0_f64; n];
    let mut lf = vec![0.0_f64; n];

    for &i in graph.topo_order.iter().rev() {
        let d = graph.duration_days[i];
        lf[i] = if graph.successors[i].is_empty() {
            project_duration_days
        } else {
            graph.successors[i]
                .iter()
                .map(|(s, edge)| end_before(edge, ls[*s], lf[*s], d))
                .fold(project_duration_days, f64::min)
        };
        ls[i] = lf[i] - d;
    }

    let mut results = Vec::with_capacity(n);
    let mut critical_outlines = Vec::new();
    for i in 0..n {
        let total_float = ls[i] - es[i];
        let critical = total_float.abs() < CRITICAL_TOLERANCE_DAYS;
        if critical {
            critical_outlines.push(graph.tasks[i].outline_number.clone());
        }
        results.push(TaskSchedule {
            outline_number: graph.tasks[i].outline_number.clone(),
            es: es[i],
            ef: ef[i],
            ls: ls[i],
            lf: lf[i],
            total_float,
            critical,
        });
    }

    Ok(CpmSchedule {
        tasks: results,
        project_duration_days,
        critical_outlines,
    })
}

/// Forward-pass constraint a predecessor `P` places on successor `S`'s
/// earliest feasible start, given `S`'s own duration.
fn start_from(edge: &Edge, pred_es: f64, pred_ef: f64, succ_duration: f64) -> f64 {
    match edge.link_type {
        LinkType::FinishToStart => pred_ef + edge.lag_days,
        LinkType::StartToStart => pred_es + edge.lag_days,
        LinkType::FinishToFinish => pred_ef + edge.lag_days - succ_duration,
        LinkType::StartToFinish => pred_es + edge.lag_days - succ_duration,
    }
}

/// Backward-pass constraint a successor `S` places on predecessor `T`'s
/// latest feasible finish, given `T`'s own duration.
fn end_before(edge: &Edge, succ_ls: f64, succ_lf: f64, pred_duration: f64) -> f64 {
    match edge.link_type {
        LinkType::FinishToStart => succ_ls - edge.lag_days,
        LinkType::FinishToFinish => succ_lf - edge.lag_days,
        LinkType::StartToStart => succ_ls - edge.lag_days + pred_duration,
        LinkType::StartToFinish => succ_lf - edge.lag_days + pred_duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utf8proj_core::PredecessorLink;

    fn task(outline: &str, duration: &str) -> Task {
        Task::new("p1", outline, outline).duration(duration)
    }

    #[test]
    fn single_task_has_zero_float_and_is_critical() {
        let schedule = compute(&[task("1", "PT80H0M0S")]).unwrap();
        assert_eq!(schedule.project_duration_days, 10.0);
        assert_eq!(schedule.tasks[0].es, 0.0);
        assert_eq!(schedule.tasks[0].ef, 10.0);
        assert!(schedule.tasks[0].critical);
    }

    #[test]
    fn finish_to_start_chain_is_fully_critical() {
        let t2 = task("2", "PT40H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "1", LinkType::FinishToStart, 0, 7));
        let schedule = compute(&[task("1", "PT80H0M0S"), t2]).unwrap();
        assert_eq!(schedule.project_duration_days, 15.0);
        assert!(schedule.tasks.iter().all(|t| t.critical));
    }

    #[test]
    fn finish_to_start_with_lag_delays_successor_start() {
        let t2 = task("2", "PT40H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "1", LinkType::FinishToStart, 2, 7));
        let schedule = compute(&[task("1", "PT80H0M0S"), t2]).unwrap();
        let t2_sched = schedule.tasks.iter().find(|t| t.outline_number == "2").unwrap();
        assert_eq!(t2_sched.es, 12.0);
        assert_eq!(t2_sched.ef, 17.0);
        assert_eq!(schedule.project_duration_days, 17.0);
    }

    #[test]
    fn start_to_start_successor_begins_with_predecessor() {
        let t2 = task("2", "PT40H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "1", LinkType::StartToStart, 3, 7));
        let schedule = compute(&[task("1", "PT80H0M0S"), t2]).unwrap();
        let t1_sched = schedule.tasks.iter().find(|t| t.outline_number == "1").unwrap();
        let t2_sched = schedule.tasks.iter().find(|t| t.outline_number == "2").unwrap();
        assert_eq!(t2_sched.es, 3.0);
        assert_eq!(t2_sched.ef, 8.0);
        assert_eq!(schedule.project_duration_days, 10.0);
        assert_eq!(t2_sched.total_float, 2.0);
        assert!(!t2_sched.critical);
        // T1's EF determines the project duration; its only successor's
        // SS+lag link must not give it borrowed float from T2's slack
        // (spec.md §8 scenario 4 — LF is capped at project_duration_days).
        assert_eq!(t1_sched.lf, 10.0);
        assert_eq!(t1_sched.total_float, 0.0);
        assert!(t1_sched.critical);
    }

    #[test]
    fn unresolvable_predecessor_leaves_task_unconstrained() {
        let t1 = task("1", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "9.9", LinkType::FinishToStart, 0, 7));
        let schedule = compute(&[t1]).unwrap();
        assert_eq!(schedule.tasks[0].es, 0.0);
    }

    #[test]
    fn empty_project_is_an_error() {
        assert!(matches!(compute(&[]), Err(CpmError::Empty)));
    }

    #[test]
    fn cycle_propagates_as_graph_error() {
        let t1 = task("1", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "2", LinkType::FinishToStart, 0, 7));
        let t2 = task("2", "PT8H0M0S")
            .with_predecessor(PredecessorLink::new("p1", "1", LinkType::FinishToStart, 0, 7));
        assert!(matches!(compute(&[t1, t2]), Err(CpmError::Graph(_))));
    }
}
