//! Lag-reduction and task-compression optimizer (spec.md §4.7).
//!
//! `propose` runs CPM once to find the critical path, builds one candidate
//! strategy per technique, then re-runs CPM against each candidate's staged
//! tasks to measure its actual effect on project duration rather than
//! estimating savings analytically.

use std::collections::HashSet;

use thiserror::Error;

use crate::cpm::{self, CpmError};
use utf8proj_core::{LinkType, Task};
use utf8proj_parser::{duration, lag};

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error(transparent)]
    Cpm(#[from] CpmError),
    #[error("unknown task outline: {0}")]
    UnknownTask(String),
    #[error("unknown predecessor link: {task} <- {predecessor}")]
    UnknownLink { task: String, predecessor: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Risk {
    Low,
    Medium,
}

impl Risk {
    fn rank(self) -> u8 {
        match self {
            Risk::Low => 0,
            Risk::Medium => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    LagReduction,
    TaskCompression,
}

/// A single proposed edit, expressed against a task by outline number so it
/// can be replayed by the caller without re-deriving the strategy.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Duration {
        task_outline: String,
        new_duration: String,
    },
    Lag {
        task_outline: String,
        predecessor_outline: String,
        link_type: LinkType,
        new_lag: i64,
    },
}

#[derive(Clone, Debug)]
pub struct Strategy {
    pub id: String,
    pub kind: StrategyKind,
    pub changes: Vec<Change>,
    pub total_savings_days: f64,
    pub cost: f64,
    pub risk: Risk,
    pub recommended: bool,
}

#[derive(Debug)]
pub struct OptimizeProposal {
    pub current_days: f64,
    pub target_days: f64,
    pub achievable: bool,
    pub strategies: Vec<Strategy>,
}

/// Estimated cost per day of schedule compression (spec.md §4.7).
const COST_PER_DAY: f64 = 500.0;
const LAG_REDUCTION_FACTOR: f64 = 0.6; // keep 60%, i.e. cut 40%
const COMPRESSION_FACTOR: f64 = 0.8; // keep 80%, i.e. cut 20%
const MIN_TASK_DURATION_HOURS: f64 = 1.0;

pub fn propose(tasks: &[Task], target_days: f64) -> Result<OptimizeProposal, OptimizeError> {
    let baseline = cpm::compute(tasks)?;
    let current_days = baseline.project_duration_days;
    let critical: HashSet<&str> = baseline
        .critical_outlines
        .iter()
        .map(String::as_str)
        .collect();

    let mut strategies = Vec::new();
    if let Some(s) = build_lag_reduction(tasks, &critical, current_days)? {
        strategies.push(s);
    }
    if let Some(s) = build_task_compression(tasks, &critical, current_days)? {
        strategies.push(s);
    }

    let achieving: Vec<usize> = strategies
        .iter()
        .enumerate()
        .filter(|(_, s)| current_days - s.total_savings_days <= target_days + 1e-9)
        .map(|(i, _)| i)
        .collect();

    let achievable = !achieving.is_empty();

    let recommended_idx = if achievable {
        achieving.into_iter().min_by(|&a, &b| {
            let sa = &strategies[a];
            let sb = &strategies[b];
            sa.cost
                .partial_cmp(&sb.cost)
                .unwrap()
                .then(sa.risk.rank().cmp(&sb.risk.rank()))
        })
    } else {
        (0..strategies.len()).max_by(|&a, &b| {
            strategies[a]
                .total_savings_days
                .partial_cmp(&strategies[b].total_savings_days)
                .unwrap()
        })
    };

    if let Some(i) = recommended_idx {
        strategies[i].recommended = true;
    }

    Ok(OptimizeProposal {
        current_days,
        target_days,
        achievable,
        strategies,
    })
}

/// Reduce by 40% (rounded toward zero) every positive lag on a link whose
/// successor is on the critical path, re-encoded in its own native unit.
fn build_lag_reduction(
    tasks: &[Task],
    critical: &HashSet<&str>,
    current_days: f64,
) -> Result<Option<Strategy>, OptimizeError> {
    let mut staged: Vec<Task> = tasks.to_vec();
    let mut changes = Vec::new();

    for task in staged.iter_mut() {
        if !critical.contains(task.outline_number.as_str()) {
            continue;
        }
        for link in task.predecessors.iter_mut() {
            let lag_days = lag::to_days(link.lag, link.lag_format);
            if lag_days <= 0.0 {
                continue;
            }
            let new_lag = (link.lag as f64 * LAG_REDUCTION_FACTOR).trunc() as i64;
            if new_lag == link.lag {
                continue;
            }
            changes.push(Change::Lag {
                task_outline: task.outline_number.clone(),
                predecessor_outline: link.predecessor_outline.clone(),
                link_type: link.link_type,
                new_lag,
            });
            link.lag = new_lag;
        }
    }

    if changes.is_empty() {
        return Ok(None);
    }

    let new_days = cpm::compute(&staged)?.project_duration_days;
    let total_savings_days = (current_days - new_days).max(0.0);

    Ok(Some(Strategy {
        id: "lag-reduction".to_string(),
        kind: StrategyKind::LagReduction,
        changes,
        total_savings_days,
        cost: 0.0,
        risk: Risk::Low,
        recommended: false,
    }))
}

/// Compress by 20% (floored at one hour) every non-summary, non-milestone
/// task on the critical path.
fn build_task_compression(
    tasks: &[Task],
    critical: &HashSet<&str>,
    current_days: f64,
) -> Result<Option<Strategy>, OptimizeError> {
    let mut staged: Vec<Task> = tasks.to_vec();
    let mut changes = Vec::new();

    for task in staged.iter_mut() {
        if task.summary || task.milestone {
            continue;
        }
        if !critical.contains(task.outline_number.as_str()) {
            continue;
        }
        let hours = duration::parse_hours(&task.duration).unwrap_or(0.0);
        if hours <= 0.0 {
            continue;
        }
        let reduced_hours = (hours * COMPRESSION_FACTOR).max(MIN_TASK_DURATION_HOURS);
        if (reduced_hours - hours).abs() < 1e-9 {
            continue;
        }
        let new_duration = duration::render_hours(reduced_hours);
        changes.push(Change::Duration {
            task_outline: task.outline_number.clone(),
            new_duration: new_duration.clone(),
        });
        task.duration = new_duration;
    }

    if changes.is_empty() {
        return Ok(None);
    }

    let new_days = cpm::compute(&staged)?.project_duration_days;
    let savings_days = (current_days - new_days).max(0.0);
    let cost = savings_days.ceil() * COST_PER_DAY;

    Ok(Some(Strategy {
        id: "task-compression".to_string(),
        kind: StrategyKind::TaskCompression,
        changes,
        total_savings_days: savings_days,
        cost,
        risk: Risk::Medium,
        recommended: false,
    }))
}

/// Apply an explicit list of changes in place, by outline-number lookup.
/// Callers revalidate the resulting task list before committing it.
pub fn apply(tasks: &mut [Task], changes: &[Change]) -> Result<(), OptimizeError> {
    for change in changes {
        match change {
            Change::Duration {
                task_outline,
                new_duration,
            } => {
                let task = tasks
                    .iter_mut()
                    .find(|t| &t.outline_number == task_outline)
                    .ok_or_else(|| OptimizeError::UnknownTask(task_outline.clone()))?;
                task.duration = new_duration.clone();
            }
            Change::Lag {
                task_outline,
                predecessor_outline,
                link_type,
                new_lag,
            } => {
                let task = tasks
                    .iter_mut()
                    .find(|t| &t.outline_number == task_outline)
                    .ok_or_else(|| OptimizeError::UnknownTask(task_outline.clone()))?;
                let link = task
                    .predecessors
                    .iter_mut()
                    .find(|l| &l.predecessor_outline == predecessor_outline && &l.link_type == link_type)
                    .ok_or_else(|| OptimizeError::UnknownLink {
                        task: task_outline.clone(),
                        predecessor: predecessor_outline.clone(),
                    })?;
                link.lag = *new_lag;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use utf8proj_core::PredecessorLink;

    fn task(outline: &str, duration: &str) -> Task {
        Task::new("p1", outline, outline).duration(duration)
    }

    fn chain() -> Vec<Task> {
        let t2 = task("2", "PT80H0M0S").with_predecessor(PredecessorLink::new(
            "p1",
            "1",
            LinkType::FinishToStart,
            4,
            7,
        ));
        vec![task("1", "PT80H0M0S"), t2]
    }

    #[test]
    fn lag_reduction_shortens_critical_chain() {
        let tasks = chain();
        let proposal = propose(&tasks, 15.0).unwrap();
        let lag_strategy = proposal
            .strategies
            .iter()
            .find(|s| s.kind == StrategyKind::LagReduction)
            .unwrap();
        assert!(lag_strategy.total_savings_days > 0.0);
        assert_eq!(lag_strategy.cost, 0.0);
    }

    #[test]
    fn task_compression_has_nonzero_cost() {
        let tasks = chain();
        let proposal = propose(&tasks, 10.0).unwrap();
        let compression = proposal
            .strategies
            .iter()
            .find(|s| s.kind == StrategyKind::TaskCompression)
            .unwrap();
        assert!(compression.cost > 0.0);
    }

    #[test]
    fn unreachable_target_recommends_largest_savings() {
        let tasks = chain();
        let proposal = propose(&tasks, 0.1).unwrap();
        assert!(!proposal.achievable);
        let recommended = proposal.strategies.iter().find(|s| s.recommended).unwrap();
        let best = proposal
            .strategies
            .iter()
            .map(|s| s.total_savings_days)
            .fold(f64::MIN, f64::max);
        assert_eq!(recommended.total_savings_days, best);
    }

    #[test]
    fn apply_lag_change_mutates_matching_link() {
        let mut tasks = chain();
        let change = Change::Lag {
            task_outline: "2".to_string(),
            predecessor_outline: "1".to_string(),
            link_type: LinkType::FinishToStart,
            new_lag: 1,
        };
        apply(&mut tasks, std::slice::from_ref(&change)).unwrap();
        let t2 = tasks.iter().find(|t| t.outline_number == "2").unwrap();
        assert_eq!(t2.predecessors[0].lag, 1);
    }

    #[test]
    fn apply_unknown_task_is_an_error() {
        let mut tasks = chain();
        let change = Change::Duration {
            task_outline: "9.9".to_string(),
            new_duration: "PT1H0M0S".to_string(),
        };
        assert!(matches!(
            apply(&mut tasks, std::slice::from_ref(&change)),
            Err(OptimizeError::UnknownTask(_))
        ));
    }

    #[test]
    fn compression_never_drops_below_one_hour_floor() {
        let tasks = vec![task("1", "PT1H0M0S")];
        let proposal = propose(&tasks, 0.0).unwrap();
        if let Some(strategy) = proposal
            .strategies
            .iter()
            .find(|s| s.kind == StrategyKind::TaskCompression)
        {
            for change in &strategy.changes {
                if let Change::Duration { new_duration, .. } = change {
                    let hours = duration::parse_hours(new_duration).unwrap();
                    assert!(hours >= MIN_TASK_DURATION_HOURS);
                }
            }
        }
    }
}
