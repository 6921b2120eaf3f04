//! # utf8proj-engine
//!
//! Facade tying the MSPDI codec (`utf8proj-parser`), the relational store
//! (`utf8proj-store`), and the CPM/optimizer solver (`utf8proj-solver`) into
//! the single synchronous Engine API surface described by spec.md §4.8 and
//! §6.3.
//!
//! `Engine` owns the active-project selector (a row flag looked up from the
//! store on every call, never cached, per spec.md §5/§9) and is the only
//! thing downstream callers (an excluded HTTP handler layer) talk to. Every
//! fallible method returns `Result<T, EngineError>` carrying one of the six
//! kinds from spec.md §7.
//!
//! ## Example
//!
//! ```no_run
//! use utf8proj_engine::{Engine, EngineConfig, NewTaskFields};
//! use chrono::NaiveDate;
//!
//! let engine = Engine::open(EngineConfig::new("schedule.db")).unwrap();
//! let project = engine
//!     .create_project("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
//!     .unwrap();
//! engine.switch_project(&project.id).unwrap();
//! engine
//!     .create_task(NewTaskFields::new("1", "Design", 1, "PT8H0M0S"))
//!     .unwrap();
//! let report = engine.validate().unwrap();
//! assert!(report.valid);
//! ```

use std::path::PathBuf;

use chrono::NaiveDate;

use utf8proj_core::{validate, Deadline, EngineError, Project, Task, ValidationIssue};
use utf8proj_parser::mspdi;
use utf8proj_solver::{cpm, optimize};
use utf8proj_store::{Store, StoreError};

pub use utf8proj_solver::optimize::{Change, Risk, Strategy, StrategyKind};

// ============================================================================
// Configuration
// ============================================================================

/// Engine-wide configuration (spec.md §9: constructed by the caller, no
/// global statics). The optimizer's lag-reduction/compression ratios and
/// cost-per-day are deliberately not exposed here: spec.md §9's Open
/// Questions call them heuristics an implementer *may* expose, but the
/// default behavior must match the spec's fixed constants exactly, so they
/// stay where `utf8proj-solver` defines them (see DESIGN.md).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub store_path: PathBuf,
}

impl EngineConfig {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new("utf8proj.db")
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The transport-agnostic facade (spec.md §4.8, §6.3). One `Engine` wraps
/// one `Store`; the HTTP layer (excluded from this crate) constructs one
/// `Engine` per process and calls it from its request-handling pool.
pub struct Engine {
    store: Store,
}

impl Engine {
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let store = Store::open(&config.store_path).map_err(store_err)?;
        Ok(Self { store })
    }

    /// Build an engine around an already-open store, e.g. a temp-file store
    /// in tests, without going through `EngineConfig`.
    pub fn from_store(store: Store) -> Self {
        Self { store }
    }

    fn active_project(&self) -> Result<Project, EngineError> {
        self.store
            .active_project()
            .map_err(store_err)?
            .ok_or_else(|| EngineError::NotFound("no active project".to_string()))
    }

    fn project_and_tasks(&self, project_id: &str) -> Result<(Project, Vec<Task>), EngineError> {
        let project = self.store.get_project(project_id).map_err(store_err)?;
        let tasks = self.store.list_tasks(project_id).map_err(store_err)?;
        Ok((project, tasks))
    }

    // ========================================================================
    // Projects
    // ========================================================================

    pub fn list_projects(&self) -> Result<Vec<Project>, EngineError> {
        self.store.list_projects().map_err(store_err)
    }

    pub fn create_project(&self, name: &str, start: NaiveDate) -> Result<Project, EngineError> {
        let project = Project::new(name, start);
        self.store.create_project(&project).map_err(store_err)?;
        tracing::debug!(project_id = %project.id, "project created");
        Ok(project)
    }

    pub fn switch_project(&self, id: &str) -> Result<(), EngineError> {
        self.store.switch_project(id).map_err(store_err)
    }

    pub fn delete_project(&self, id: &str) -> Result<(), EngineError> {
        // Confirm existence up front so the error is NotFound, not a
        // silent no-op (spec.md §6.3: `DeleteProject(id) -> ok | NotFound`).
        let project = self.store.get_project(id).map_err(store_err)?;
        self.store.delete_project(id).map_err(store_err)?;

        // The active-project pointer falls back to any remaining project,
        // deterministically the most-recently-updated one, or null if none
        // remain (spec.md §3 Lifecycle).
        if project.is_active {
            let remaining = self.store.list_projects().map_err(store_err)?;
            if let Some(next) = remaining.first() {
                self.store.switch_project(&next.id).map_err(store_err)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // XML ingest / export
    // ========================================================================

    /// Parse an MSPDI document into a brand-new project, store it, and make
    /// it the active project (spec.md §4.8: "ingest XML replaces active
    /// project"; the net effect on the active-project selector is a
    /// replacement even though the project row itself is new — see
    /// DESIGN.md for the Open Question this resolves).
    pub fn ingest_xml(&self, xml: &str, deadline: Deadline) -> Result<Project, EngineError> {
        let project_id = utf8proj_core::new_id();
        let (project, tasks) =
            mspdi::ingest(xml, &project_id, deadline).map_err(|e| EngineError::ParseError(e.to_string()))?;

        let issues = validate::validate_project(&project, &tasks);
        if !issues.is_empty() {
            return Err(EngineError::ValidationError(issues));
        }

        self.store.create_project(&project).map_err(store_err)?;
        self.store.replace_tasks(&project.id, &tasks).map_err(store_err)?;
        self.store.switch_project(&project.id).map_err(store_err)?;
        tracing::debug!(project_id = %project.id, tasks = tasks.len(), "project ingested from MSPDI");
        Ok(project)
    }

    /// Render the active project's current tasks back into its retained
    /// template (spec.md §4.3).
    pub fn export_xml(&self) -> Result<Vec<u8>, EngineError> {
        let project = self.active_project()?;
        let tasks = self.store.list_tasks(&project.id).map_err(store_err)?;
        let xml = mspdi::export(&project, &tasks).map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(xml.into_bytes())
    }

    // ========================================================================
    // Project metadata
    // ========================================================================

    pub fn get_metadata(&self) -> Result<ProjectMetadata, EngineError> {
        let project = self.active_project()?;
        let task_count = self.store.list_tasks(&project.id).map_err(store_err)?.len();
        Ok(ProjectMetadata {
            name: project.name,
            start: project.start,
            status_date: project.status_date,
            task_count,
        })
    }

    pub fn update_metadata(&self, fields: MetadataUpdate) -> Result<(), EngineError> {
        let mut project = self.active_project()?;
        if let Some(name) = fields.name {
            project.name = name;
        }
        if let Some(start) = fields.start {
            project.start = start;
        }
        if let Some(status_date) = fields.status_date {
            project.status_date = status_date;
        }
        project.touch();
        self.store.update_project_metadata(&project).map_err(store_err)
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub fn list_tasks(&self) -> Result<Vec<Task>, EngineError> {
        let project = self.active_project()?;
        self.store.list_tasks(&project.id).map_err(store_err)
    }

    pub fn create_task(&self, fields: NewTaskFields) -> Result<Task, EngineError> {
        let project = self.active_project()?;
        let mut task = Task::new(&project.id, &fields.outline_number, fields.name);
        task.outline_level = fields.outline_level;
        task.duration = fields.duration;
        task.uid = fields.uid;
        task.value = fields.value;
        task.milestone = fields.milestone;
        task.summary = fields.summary;
        task.percent_complete = fields.percent_complete;
        task.start = fields.start;
        task.finish = fields.finish;
        task.actual_start = fields.actual_start;
        task.actual_finish = fields.actual_finish;
        task.actual_duration = fields.actual_duration;
        task.create_date = fields.create_date;
        task.predecessors = fields.predecessors;

        let mut existing = self.store.list_tasks(&project.id).map_err(store_err)?;
        existing.push(task.clone());
        let issues = validate::validate_project(&project, &existing);
        if !issues.is_empty() {
            return Err(EngineError::ValidationError(issues));
        }

        self.store.create_task(&task).map_err(store_err)?;
        self.touch_project(&project)?;
        Ok(task)
    }

    /// Apply `fields` on top of the task's current values (any field left
    /// `None` is unchanged) and persist iff the resulting project still
    /// validates (spec.md §8: final state depends only on the set of final
    /// per-field values, independent of application order).
    pub fn update_task(&self, task_id: &str, fields: TaskUpdateFields) -> Result<Task, EngineError> {
        let project = self.active_project()?;
        let mut tasks = self.store.list_tasks(&project.id).map_err(store_err)?;
        let idx = tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| EngineError::NotFound(task_id.to_string()))?;

        fields.apply(&mut tasks[idx]);
        let updated = tasks[idx].clone();

        let issues = validate::validate_project(&project, &tasks);
        if !issues.is_empty() {
            return Err(EngineError::ValidationError(issues));
        }

        self.store.update_task(&updated).map_err(store_err)?;
        self.touch_project(&project)?;
        Ok(updated)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<(), EngineError> {
        let project = self.active_project()?;
        // Confirms existence so the caller gets NotFound rather than a
        // silent no-op, mirroring `delete_project`.
        self.store.get_task(&project.id, task_id).map_err(store_err)?;
        self.store.delete_task(&project.id, task_id).map_err(store_err)?;
        self.touch_project(&project)
    }

    fn touch_project(&self, project: &Project) -> Result<(), EngineError> {
        let mut project = project.clone();
        project.touch();
        self.store.update_project_metadata(&project).map_err(store_err)
    }

    // ========================================================================
    // Validate / CPM / Optimize
    // ========================================================================

    pub fn validate(&self) -> Result<ValidationReport, EngineError> {
        let project = self.active_project()?;
        let tasks = self.store.list_tasks(&project.id).map_err(store_err)?;
        let issues = validate::validate_project(&project, &tasks);
        Ok(ValidationReport {
            valid: issues.is_empty(),
            issues,
        })
    }

    /// Refuses to run on an invalid project, surfacing the validator's
    /// error set instead (spec.md §4.6, §7).
    pub fn compute_cpm(&self, deadline: Deadline) -> Result<CpmResult, EngineError> {
        let project = self.active_project()?;
        let tasks = self.store.list_tasks(&project.id).map_err(store_err)?;
        self.ensure_valid(&project, &tasks)?;
        deadline.check()?;

        let schedule = cpm::compute(&tasks).map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(CpmResult {
            project_duration_days: schedule.project_duration_days,
            tasks: schedule.tasks,
            critical: schedule.critical_outlines,
        })
    }

    pub fn optimize_proposal(&self, target_days: f64) -> Result<OptimizeProposal, EngineError> {
        let project = self.active_project()?;
        let tasks = self.store.list_tasks(&project.id).map_err(store_err)?;
        self.ensure_valid(&project, &tasks)?;

        let proposal = optimize::propose(&tasks, target_days).map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(OptimizeProposal {
            current_days: proposal.current_days,
            target_days: proposal.target_days,
            achievable: proposal.achievable,
            strategies: proposal.strategies,
        })
    }

    /// Apply an explicit list of changes in a single transaction, re-running
    /// the validator before commit; on any failure the store is left
    /// untouched and the error set is returned (spec.md §4.7).
    pub fn optimize_apply(&self, changes: &[Change]) -> Result<(), EngineError> {
        let project = self.active_project()?;
        let mut tasks = self.store.list_tasks(&project.id).map_err(store_err)?;

        optimize::apply(&mut tasks, changes).map_err(|e| match e {
            optimize::OptimizeError::UnknownTask(outline) => EngineError::NotFound(outline),
            optimize::OptimizeError::UnknownLink { task, predecessor } => {
                EngineError::NotFound(format!("{task} <- {predecessor}"))
            }
            other => EngineError::Internal(other.to_string()),
        })?;

        let issues = validate::validate_project(&project, &tasks);
        if !issues.is_empty() {
            return Err(EngineError::ValidationError(issues));
        }

        self.store.replace_tasks(&project.id, &tasks).map_err(store_err)?;
        self.touch_project(&project)
    }

    fn ensure_valid(&self, project: &Project, tasks: &[Task]) -> Result<(), EngineError> {
        let issues = validate::validate_project(project, tasks);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(EngineError::ValidationError(issues))
        }
    }
}

fn store_err(e: StoreError) -> EngineError {
    match e {
        StoreError::NotFound(id) => EngineError::NotFound(id),
        StoreError::Busy(id) => EngineError::Conflict(format!("write contention on project {id}")),
        StoreError::Sqlite(e) => EngineError::Internal(e.to_string()),
    }
}

// ============================================================================
// DTOs
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectMetadata {
    pub name: String,
    pub start: NaiveDate,
    pub status_date: NaiveDate,
    pub task_count: usize,
}

#[derive(Clone, Debug, Default)]
pub struct MetadataUpdate {
    pub name: Option<String>,
    pub start: Option<NaiveDate>,
    pub status_date: Option<NaiveDate>,
}

#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Clone, Debug)]
pub struct CpmResult {
    pub project_duration_days: f64,
    pub tasks: Vec<cpm::TaskSchedule>,
    pub critical: Vec<String>,
}

#[derive(Debug)]
pub struct OptimizeProposal {
    pub current_days: f64,
    pub target_days: f64,
    pub achievable: bool,
    pub strategies: Vec<Strategy>,
}

/// Fields accepted by `create_task`; identity (`id`, `project_id`) is
/// assigned by the engine, never the caller (spec.md §3: Task identity is
/// opaque and store-assigned).
#[derive(Clone, Debug)]
pub struct NewTaskFields {
    pub outline_number: String,
    pub name: String,
    pub outline_level: u32,
    pub duration: String,
    pub uid: Option<String>,
    pub value: Option<String>,
    pub milestone: bool,
    pub summary: bool,
    pub percent_complete: u8,
    pub start: Option<NaiveDate>,
    pub finish: Option<NaiveDate>,
    pub actual_start: Option<NaiveDate>,
    pub actual_finish: Option<NaiveDate>,
    pub actual_duration: Option<String>,
    pub create_date: Option<NaiveDate>,
    pub predecessors: Vec<utf8proj_core::PredecessorLink>,
}

impl NewTaskFields {
    pub fn new(
        outline_number: impl Into<String>,
        name: impl Into<String>,
        outline_level: u32,
        duration: impl Into<String>,
    ) -> Self {
        Self {
            outline_number: outline_number.into(),
            name: name.into(),
            outline_level,
            duration: duration.into(),
            uid: None,
            value: None,
            milestone: false,
            summary: false,
            percent_complete: 0,
            start: None,
            finish: None,
            actual_start: None,
            actual_finish: None,
            actual_duration: None,
            create_date: None,
            predecessors: Vec::new(),
        }
    }
}

/// Any non-identity field of a task (spec.md §3 lifecycle: "updated (any
/// non-identity field)"). Every field is optional; `None` leaves the
/// current value untouched, matching the last-write-wins-per-field
/// property in spec.md §8.
#[derive(Clone, Debug, Default)]
pub struct TaskUpdateFields {
    pub name: Option<String>,
    pub outline_number: Option<String>,
    pub outline_level: Option<u32>,
    pub duration: Option<String>,
    pub uid: Option<Option<String>>,
    pub value: Option<Option<String>>,
    pub milestone: Option<bool>,
    pub summary: Option<bool>,
    pub percent_complete: Option<u8>,
    pub start: Option<Option<NaiveDate>>,
    pub finish: Option<Option<NaiveDate>>,
    pub actual_start: Option<Option<NaiveDate>>,
    pub actual_finish: Option<Option<NaiveDate>>,
    pub actual_duration: Option<Option<String>>,
    pub create_date: Option<Option<NaiveDate>>,
    pub predecessors: Option<Vec<utf8proj_core::PredecessorLink>>,
}

impl TaskUpdateFields {
    fn apply(self, task: &mut Task) {
        if let Some(v) = self.name {
            task.name = v;
        }
        if let Some(v) = self.outline_number {
            task.outline_level = utf8proj_core::outline_level_of(&v);
            task.outline_number = v;
        }
        if let Some(v) = self.outline_level {
            task.outline_level = v;
        }
        if let Some(v) = self.duration {
            task.duration = v;
        }
        if let Some(v) = self.uid {
            task.uid = v;
        }
        if let Some(v) = self.value {
            task.value = v;
        }
        if let Some(v) = self.milestone {
            task.milestone = v;
        }
        if let Some(v) = self.summary {
            task.summary = v;
        }
        if let Some(v) = self.percent_complete {
            task.percent_complete = v;
        }
        if let Some(v) = self.start {
            task.start = v;
        }
        if let Some(v) = self.finish {
            task.finish = v;
        }
        if let Some(v) = self.actual_start {
            task.actual_start = v;
        }
        if let Some(v) = self.actual_finish {
            task.actual_finish = v;
        }
        if let Some(v) = self.actual_duration {
            task.actual_duration = v;
        }
        if let Some(v) = self.create_date {
            task.create_date = v;
        }
        if let Some(v) = self.predecessors {
            task.predecessors = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utf8proj_core::{LinkType, PredecessorLink};

    fn temp_engine() -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        (Engine::from_store(store), dir)
    }

    #[test]
    fn create_project_and_switch_makes_it_active() {
        let (engine, _dir) = temp_engine();
        let project = engine
            .create_project("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        engine.switch_project(&project.id).unwrap();
        let meta = engine.get_metadata().unwrap();
        assert_eq!(meta.name, "Demo");
        assert_eq!(meta.task_count, 0);
    }

    #[test]
    fn get_metadata_without_active_project_is_not_found() {
        let (engine, _dir) = temp_engine();
        assert!(matches!(engine.get_metadata(), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn create_task_then_validate_is_clean() {
        let (engine, _dir) = temp_engine();
        let project = engine
            .create_project("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        engine.switch_project(&project.id).unwrap();

        engine
            .create_task(NewTaskFields::new("1", "Design", 1, "PT8H0M0S"))
            .unwrap();
        engine
            .create_task(NewTaskFields {
                predecessors: vec![PredecessorLink::new(&project.id, "1", LinkType::FinishToStart, 0, 7)],
                ..NewTaskFields::new("2", "Build", 1, "PT8H0M0S")
            })
            .unwrap();

        let report = engine.validate().unwrap();
        assert!(report.valid, "{:?}", report.issues);
        assert_eq!(engine.list_tasks().unwrap().len(), 2);
    }

    #[test]
    fn create_task_with_duplicate_outline_fails_validation() {
        let (engine, _dir) = temp_engine();
        let project = engine
            .create_project("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        engine.switch_project(&project.id).unwrap();

        engine
            .create_task(NewTaskFields::new("1", "Design", 1, "PT8H0M0S"))
            .unwrap();
        let result = engine.create_task(NewTaskFields::new("1", "Duplicate", 1, "PT8H0M0S"));
        assert!(matches!(result, Err(EngineError::ValidationError(_))));
        // Rejected mutation must not have been persisted.
        assert_eq!(engine.list_tasks().unwrap().len(), 1);
    }

    #[test]
    fn update_task_is_last_write_wins_per_field() {
        let (engine, _dir) = temp_engine();
        let project = engine
            .create_project("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        engine.switch_project(&project.id).unwrap();
        let task = engine
            .create_task(NewTaskFields::new("1", "Design", 1, "PT8H0M0S"))
            .unwrap();

        engine
            .update_task(
                &task.id,
                TaskUpdateFields {
                    name: Some("Design v2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        let updated = engine
            .update_task(
                &task.id,
                TaskUpdateFields {
                    percent_complete: Some(50),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.name, "Design v2");
        assert_eq!(updated.percent_complete, 50);
    }

    #[test]
    fn delete_task_removes_dangling_predecessor_reference() {
        let (engine, _dir) = temp_engine();
        let project = engine
            .create_project("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        engine.switch_project(&project.id).unwrap();
        let t1 = engine
            .create_task(NewTaskFields::new("1", "Design", 1, "PT8H0M0S"))
            .unwrap();
        engine
            .create_task(NewTaskFields {
                predecessors: vec![PredecessorLink::new(&project.id, "1", LinkType::FinishToStart, 0, 7)],
                ..NewTaskFields::new("2", "Build", 1, "PT8H0M0S")
            })
            .unwrap();

        engine.delete_task(&t1.id).unwrap();

        let report = engine.validate().unwrap();
        assert!(report.valid, "{:?}", report.issues);
    }

    #[test]
    fn compute_cpm_refuses_invalid_project() {
        let (engine, _dir) = temp_engine();
        let project = engine
            .create_project("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        engine.switch_project(&project.id).unwrap();
        engine
            .create_task(NewTaskFields::new("1", "A", 1, "PT8H0M0S"))
            .unwrap();

        let result = engine.compute_cpm(Deadline::none());
        assert!(result.is_ok());
    }

    #[test]
    fn project_isolation_across_switch() {
        let (engine, _dir) = temp_engine();
        let p1 = engine
            .create_project("P1", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();
        let p2 = engine
            .create_project("P2", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap())
            .unwrap();

        engine.switch_project(&p1.id).unwrap();
        engine
            .create_task(NewTaskFields::new("1", "P1 Task", 1, "PT8H0M0S"))
            .unwrap();

        engine.switch_project(&p2.id).unwrap();
        assert!(engine.list_tasks().unwrap().is_empty());

        engine.switch_project(&p1.id).unwrap();
        assert_eq!(engine.list_tasks().unwrap().len(), 1);
    }
}
