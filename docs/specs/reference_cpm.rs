//! Reference CPM Implementation
//! 
//! A minimal, correct implementation of the Critical Path Method
//! that can serve as a foundation for utf8proj's solver rewrite.
//!
//! This code is designed for clarity over performance.
//! 
//! Run with: cargo test --lib

use std::collections::{HashMap, HashSet, VecDeque};

// ============================================================================
// TYPES
// ============================================================================

pub type TaskId = String;
pub type Days = i32;

/// A single schedulable activity (leaf task)
#[derive(Debug, Clone)]
pub struct Activity {
    pub id: TaskId,
    pub name: String,
    pub duration: Days,
    pub predecessors: Vec<TaskId>,
}

/// Result of CPM scheduling for one activity
#[derive(Debug, Clone)]
pub struct ScheduleResult {
    pub id: TaskId,
    pub es: Days,           // Early Start
    pub ef: Days,           // Early Finish  
    pub ls: Days,           // Late Start
    pub lf: Days,           // Late Finish
    pub total_slack: Days,  // Total Float
    pub is_critical: bool,
}

/// Complete schedule output
#[derive(Debug)]
pub struct Schedule {
    pub results: HashMap<TaskId, ScheduleResult>,
    pub critical_path: Vec<TaskId>,
    pub project_duration: Days,
}

/// Errors that can occur during scheduling
#[derive(Debug, PartialEq)]
pub enum CpmError {
    CycleDetected { involved: Vec<TaskId> },
    MissingPredecessor { task: TaskId, missing: TaskId },
    NegativeSlack { task: TaskId, slack: Days },
}

// ============================================================================
// GRAPH OPERATIONS
// ============================================================================

/// Build adjacency lists from activities
fn build_graph(activities: &[Activity]) -> (
    HashMap<TaskId, Vec<TaskId>>,  // successors
    HashMap<TaskId, Vec<TaskId>>,  // predecessors
) {
    let mut successors: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    let mut predecessors: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    
    // Initialize empty lists for all tasks
    for act in activities {
        successors.entry(act.id.clone()).or_default();
        predecessors.entry(act.id.clone()).or_default();
    }
    
    // Build edges
    for act in activities {
        for pred_id in &act.predecessors {
            successors.get_mut(pred_id).unwrap().push(act.id.clone());
            predecessors.get_mut(&act.id).unwrap().push(pred_id.clone());
        }
    }
    
    (successors, predecessors)
}

/// Kahn's algorithm for topological sort
/// Returns tasks in order where all predecessors come before successors
fn topological_sort(
    activities: &[Activity],
    successors: &HashMap<TaskId, Vec<TaskId>>,
    predecessors: &HashMap<TaskId, Vec<TaskId>>,
) -> Result<Vec<TaskId>, CpmError> {
    let mut in_degree: HashMap<TaskId, usize> = HashMap::new();
    
    // Calculate in-degrees
    for act in activities {
        in_degree.insert(act.id.clone(), predecessors[&act.id].len());
    }
    
    // Start with tasks that have no predecessors
    let mut queue: VecDeque<TaskId> = in_degree.iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    
    let mut result: Vec<TaskId> = Vec::new();
    
    while let Some(task_id) = queue.pop_front() {
        result.push(task_id.clone());
        
        for succ in &successors[&task_id] {
            let deg = in_degree.get_mut(succ).unwrap();
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(succ.clone());
            }
        }
    }
    
    // If we didn't process all tasks, there's a cycle
    if result.len() != activities.len() {
        let involved: Vec<TaskId> = activities.iter()
            .filter(|a| !result.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();
        return Err(CpmError::CycleDetected { involved });
    }
    
    Ok(result)
}

// ============================================================================
// CPM ALGORITHM
// ============================================================================

/// Schedule activities using the Critical Path Method
/// 
/// This implements the textbook CPM algorithm:
/// 1. Topological sort
/// 2. Forward pass (compute ES, EF)
/// 3. Backward pass (compute LS, LF)
/// 4. Slack calculation
/// 5. Critical path identification
pub fn schedule(activities: &[Activity]) -> Result<Schedule, CpmError> {
    // Validate predecessors exist
    let task_ids: HashSet<_> = activities.iter().map(|a| &a.id).collect();
    for act in activities {
        for pred in &act.predecessors {
            if !task_ids.contains(pred) {
                return Err(CpmError::MissingPredecessor {
                    task: act.id.clone(),
                    missing: pred.clone(),
                });
            }
        }
    }
    
    let (successors, predecessors) = build_graph(activities);
    let topo_order = topological_sort(activities, &successors, &predecessors)?;
    
    // Create lookup for durations
    let duration: HashMap<TaskId, Days> = activities.iter()
        .map(|a| (a.id.clone(), a.duration))
        .collect();
    
    // ========================================================================
    // FORWARD PASS
    // ========================================================================
    // For each task in topological order:
    //   ES = max(EF of all predecessors), or 0 if no predecessors
    //   EF = ES + duration
    
    let mut es: HashMap<TaskId, Days> = HashMap::new();
    let mut ef: HashMap<TaskId, Days> = HashMap::new();
    
    for task_id in &topo_order {
        let preds = &predecessors[task_id];
        
        let early_start = if preds.is_empty() {
            0  // Project start
        } else {
            preds.iter()
                .map(|p| ef[p])
                .max()
                .unwrap()
        };
        
        let early_finish = early_start + duration[task_id];
        
        es.insert(task_id.clone(), early_start);
        ef.insert(task_id.clone(), early_finish);
    }
    
    // Project end is the maximum EF
    let project_duration = ef.values().cloned().max().unwrap_or(0);
    
    // ========================================================================
    // BACKWARD PASS
    // ========================================================================
    // For each task in REVERSE topological order:
    //   LF = min(LS of all successors), or project_end if no successors
    //   LS = LF - duration
    
    let mut ls: HashMap<TaskId, Days> = HashMap::new();
    let mut lf: HashMap<TaskId, Days> = HashMap::new();
    
    for task_id in topo_order.iter().rev() {
        let succs = &successors[task_id];
        
        let late_finish = if succs.is_empty() {
            project_duration  // Project end
        } else {
            succs.iter()
                .map(|s| ls[s])
                .min()
                .unwrap()
        };
        
        let late_start = late_finish - duration[task_id];
        
        lf.insert(task_id.clone(), late_finish);
        ls.insert(task_id.clone(), late_start);
    }
    
    // ========================================================================
    // SLACK & CRITICAL PATH
    // ========================================================================
    // Total Slack = LS - ES (must be >= 0)
    // Critical if Slack == 0
    
    let mut results: HashMap<TaskId, ScheduleResult> = HashMap::new();
    let mut critical_path: Vec<TaskId> = Vec::new();
    
    for task_id in &topo_order {
        let total_slack = ls[task_id] - es[task_id];
        
        // INVARIANT: Slack must never be negative
        if total_slack < 0 {
            return Err(CpmError::NegativeSlack {
                task: task_id.clone(),
                slack: total_slack,
            });
        }
        
        let is_critical = total_slack == 0;
        if is_critical {
            critical_path.push(task_id.clone());
        }
        
        results.insert(task_id.clone(), ScheduleResult {
            id: task_id.clone(),
            es: es[task_id],
            ef: ef[task_id],
            ls: ls[task_id],
            lf: lf[task_id],
            total_slack,
            is_critical,
        });
    }
    
    Ok(Schedule {
        results,
        critical_path,
        project_duration,
    })
}

// ============================================================================
// TESTS - CPM CORRECTNESS SUITE
// ============================================================================


// ============================================================================
// MAIN (for demonstration)
// ============================================================================

fn main() {
    println!("CPM Reference Implementation");
    println!("=============================\n");
    
    // Example: Simple project
    let activities = vec![
        Activity { id: "A".into(), name: "Design".into(), duration: 5, predecessors: vec![] },
        Activity { id: "B".into(), name: "Develop".into(), duration: 10, predecessors: vec!["A".into()] },
        Activity { id: "C".into(), name: "Test".into(), duration: 3, predecessors: vec!["B".into()] },
        Activity { id: "D".into(), name: "Docs".into(), duration: 4, predecessors: vec!["A".into()] },
        Activity { id: "E".into(), name: "Release".into(), duration: 1, predecessors: vec!["C".into(), "D".into()] },
    ];
    
    match schedule(&activities) {
        Ok(s) => {
            println!("Project Duration: {} days\n", s.project_duration);
            
            println!("{:<10} {:>4} {:>4} {:>4} {:>4} {:>6} {:>10}",
                     "Task", "ES", "EF", "LS", "LF", "Slack", "Critical");
            println!("{}", "-".repeat(55));
            
            // Print in topological order
            for id in ["A", "B", "C", "D", "E"] {
                let r = &s.results[id];
                println!("{:<10} {:>4} {:>4} {:>4} {:>4} {:>6} {:>10}",
                         id, r.es, r.ef, r.ls, r.lf, r.total_slack,
                         if r.is_critical { "***" } else { "" });
            }
            
            println!("\nCritical Path: {:?}", s.critical_path);
        }
        Err(e) => println!("Error: {:?}", e),
    }
}
