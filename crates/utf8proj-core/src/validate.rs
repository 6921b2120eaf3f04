//! Structural and graph validation (spec.md §4.5).
//!
//! The validator collects every issue it finds rather than failing fast on
//! the first one, so a caller can surface the full list in one round trip.

use crate::{outline_level_of, parse_outline, LinkType, Project, Task, ValidationIssue, ValidationKind};
use std::collections::{HashMap, HashSet};

/// Run every structural and graph check against a project and its tasks,
/// returning the full set of issues found (empty if the project is valid).
pub fn validate_project(project: &Project, tasks: &[Task]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    check_outline_numbers(tasks, &mut issues);
    check_outline_levels(tasks, &mut issues);
    check_names(tasks, &mut issues);
    check_percent_complete(tasks, &mut issues);
    check_milestone_duration(tasks, &mut issues);
    check_summary_milestone_exclusive(tasks, &mut issues);
    check_predecessors_resolve(tasks, &mut issues);
    check_no_self_predecessor(tasks, &mut issues);
    check_cycles(tasks, &mut issues);

    let _ = project;
    issues
}

fn check_outline_numbers(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();
    for task in tasks {
        if parse_outline(&task.outline_number).is_none() {
            issues.push(ValidationIssue {
                outline_number: Some(task.outline_number.clone()),
                field: Some("outline_number".to_string()),
                message: format!("malformed outline number '{}'", task.outline_number),
                kind: ValidationKind::InvalidFormat,
            });
            continue;
        }
        if !seen.insert(task.outline_number.clone()) {
            issues.push(ValidationIssue {
                outline_number: Some(task.outline_number.clone()),
                field: Some("outline_number".to_string()),
                message: format!("duplicate outline number '{}'", task.outline_number),
                kind: ValidationKind::DuplicateOutline,
            });
        }
    }
}

fn check_outline_levels(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    for task in tasks {
        let expected = outline_level_of(&task.outline_number);
        if expected != 0 && task.outline_level != expected {
            issues.push(ValidationIssue {
                outline_number: Some(task.outline_number.clone()),
                field: Some("outline_level".to_string()),
                message: format!(
                    "outline_level {} does not match outline number depth {}",
                    task.outline_level, expected
                ),
                kind: ValidationKind::InvariantViolation,
            });
        }
    }
}

fn check_names(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    for task in tasks {
        if task.name.trim().is_empty() {
            issues.push(ValidationIssue {
                outline_number: Some(task.outline_number.clone()),
                field: Some("name".to_string()),
                message: "task name must not be empty".to_string(),
                kind: ValidationKind::MissingField,
            });
        }
    }
}

fn check_percent_complete(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    for task in tasks {
        if task.percent_complete > 100 {
            issues.push(ValidationIssue {
                outline_number: Some(task.outline_number.clone()),
                field: Some("percent_complete".to_string()),
                message: format!("percent_complete {} exceeds 100", task.percent_complete),
                kind: ValidationKind::InvariantViolation,
            });
        }
    }
}

fn check_milestone_duration(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    for task in tasks {
        if task.milestone && task.duration != "PT0H0M0S" {
            issues.push(ValidationIssue {
                outline_number: Some(task.outline_number.clone()),
                field: Some("duration".to_string()),
                message: "milestone tasks must have zero duration".to_string(),
                kind: ValidationKind::InvariantViolation,
            });
        }
    }
}

fn check_summary_milestone_exclusive(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    for task in tasks {
        if task.summary && task.milestone {
            issues.push(ValidationIssue {
                outline_number: Some(task.outline_number.clone()),
                field: Some("summary".to_string()),
                message: "summary and milestone are mutually exclusive".to_string(),
                kind: ValidationKind::InvariantViolation,
            });
        }
    }
}

fn check_predecessors_resolve(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    let known: HashSet<&str> = tasks.iter().map(|t| t.outline_number.as_str()).collect();
    for task in tasks {
        for link in &task.predecessors {
            if !known.contains(link.predecessor_outline.as_str()) {
                issues.push(ValidationIssue {
                    outline_number: Some(task.outline_number.clone()),
                    field: Some("predecessors".to_string()),
                    message: format!(
                        "predecessor '{}' does not resolve to any task",
                        link.predecessor_outline
                    ),
                    kind: ValidationKind::UnresolvedPredecessor,
                });
            }
        }
    }
}

fn check_no_self_predecessor(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    for task in tasks {
        for link in &task.predecessors {
            if link.predecessor_outline == task.outline_number {
                issues.push(ValidationIssue {
                    outline_number: Some(task.outline_number.clone()),
                    field: Some("predecessors".to_string()),
                    message: "task cannot depend on itself".to_string(),
                    kind: ValidationKind::Cycle,
                });
            }
        }
    }
}

/// Kahn's-algorithm cycle check over the predecessor -> successor edges.
fn check_cycles(tasks: &[Task], issues: &mut Vec<ValidationIssue>) {
    let index: HashMap<&str, usize> = tasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.outline_number.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; tasks.len()];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); tasks.len()];

    for (i, task) in tasks.iter().enumerate() {
        for link in &task.predecessors {
            if let Some(&p) = index.get(link.predecessor_outline.as_str()) {
                successors[p].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut queue: Vec<usize> = (0..tasks.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut visited = 0usize;
    while let Some(node) = queue.pop() {
        visited += 1;
        for &succ in &successors[node] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                queue.push(succ);
            }
        }
    }

    if visited != tasks.len() {
        // Nodes Kahn's algorithm fully resolved have in_degree drained to
        // zero; everything left with residual in-degree lies on a cycle.
        let mut on_cycle: Vec<&str> = tasks
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] != 0)
            .map(|(_, t)| t.outline_number.as_str())
            .collect();
        on_cycle.sort_unstable();
        issues.push(ValidationIssue {
            outline_number: None,
            field: Some("predecessors".to_string()),
            message: format!("predecessor graph contains a cycle: {}", on_cycle.join(" -> ")),
            kind: ValidationKind::Cycle,
        });
    }
}

/// A minimal but schema-valid MSPDI document, used as the export template
/// for projects created via the empty-project operation (spec.md §4.3).
pub fn empty_template() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Project xmlns="http://schemas.microsoft.com/project">
  <Tasks>
  </Tasks>
</Project>
"#
    .to_string()
}
