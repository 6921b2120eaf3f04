//! # utf8proj-store
//!
//! Embedded relational store for the utf8proj scheduling engine (spec.md
//! §4.4, §5, §6.2). Backed by `rusqlite` with bundled SQLite, three tables
//! (`projects`, `tasks`, `predecessors`), write-ahead logging, and a
//! per-project in-process write lock so reads never block on a writer's
//! whole transaction.
//!
//! ## Example
//!
//! ```no_run
//! use utf8proj_store::Store;
//! use utf8proj_core::Project;
//! use chrono::NaiveDate;
//!
//! let store = Store::open("schedule.db").unwrap();
//! let project = Project::new("Demo", NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
//! store.create_project(&project).unwrap();
//! assert_eq!(store.list_projects().unwrap().len(), 1);
//! ```

pub mod schema;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;

use utf8proj_core::{LinkType, PredecessorLink, Project, Task};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("write contention exceeded retry budget for project {0}")]
    Busy(String),
}

const BUSY_RETRY_LIMIT: u32 = 5;
const BUSY_RETRY_DELAY: Duration = Duration::from_millis(20);

/// The embedded multi-project store.
///
/// Writes go through `self.writer`, a single long-lived connection guarded
/// by a mutex and, additionally, by a per-project lock so unrelated
/// projects never contend. Reads open a short-lived connection of their
/// own; WAL mode lets them see a consistent snapshot without waiting on an
/// in-flight writer.
pub struct Store {
    path: PathBuf,
    writer: Mutex<Connection>,
    project_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    store_lock: RwLock<()>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        tracing::debug!(?path, "store opened");
        Ok(Self {
            path,
            writer: Mutex::new(conn),
            project_locks: Mutex::new(HashMap::new()),
            store_lock: RwLock::new(()),
        })
    }

    fn read_conn(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.project_locks.lock().unwrap();
        locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` inside a transaction on the writer connection, holding the
    /// named project's write lock, with bounded retry on `SQLITE_BUSY`.
    fn with_project_write<T>(
        &self,
        project_id: &str,
        f: impl Fn(&rusqlite::Transaction) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let _store_guard = self.store_lock.read().unwrap();
        let lock = self.project_lock(project_id);
        let _project_guard = lock.lock().unwrap();

        let mut attempts = 0;
        loop {
            let mut conn = self.writer.lock().unwrap();
            let tx = conn.transaction()?;
            match f(&tx) {
                Ok(value) => {
                    tx.commit()?;
                    tracing::debug!(project_id, "transaction committed");
                    return Ok(value);
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::DatabaseBusy && attempts < BUSY_RETRY_LIMIT =>
                {
                    tracing::debug!(project_id, attempts, "transaction rolled back on busy, retrying");
                    drop(tx);
                    drop(conn);
                    attempts += 1;
                    std::thread::sleep(BUSY_RETRY_DELAY);
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ========================================================================
    // Projects
    // ========================================================================

    pub fn list_projects(&self) -> Result<Vec<Project>, StoreError> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, start_date, status_date, created_at, updated_at, is_active, xml_template
             FROM projects ORDER BY updated_at DESC",
        )?;
        let rows = stmt
            .query_map([], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_project(&self, id: &str) -> Result<Project, StoreError> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT id, name, start_date, status_date, created_at, updated_at, is_active, xml_template
             FROM projects WHERE id = ?1",
            [id],
            row_to_project,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn active_project(&self) -> Result<Option<Project>, StoreError> {
        let conn = self.read_conn()?;
        conn.query_row(
            "SELECT id, name, start_date, status_date, created_at, updated_at, is_active, xml_template
             FROM projects WHERE is_active = 1",
            [],
            row_to_project,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn create_project(&self, project: &Project) -> Result<(), StoreError> {
        self.with_project_write(&project.id, |tx| {
            tx.execute(
                "INSERT INTO projects (id, name, start_date, status_date, created_at, updated_at, is_active, xml_template)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    project.id,
                    project.name,
                    date_to_sql(project.start),
                    date_to_sql(project.status_date),
                    datetime_to_sql(project.created_at),
                    datetime_to_sql(project.updated_at),
                    project.is_active as i64,
                    project.xml_template,
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_project_metadata(&self, project: &Project) -> Result<(), StoreError> {
        self.with_project_write(&project.id, |tx| {
            tx.execute(
                "UPDATE projects SET name = ?2, start_date = ?3, status_date = ?4, updated_at = ?5, xml_template = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    project.id,
                    project.name,
                    date_to_sql(project.start),
                    date_to_sql(project.status_date),
                    datetime_to_sql(project.updated_at),
                    project.xml_template,
                ],
            )?;
            Ok(())
        })
    }

    /// Atomically switch the active project: clear the old flag, set the
    /// new one, commit (spec.md §4.4, §5). Takes the store-wide write lock
    /// since it touches two rows across the whole store.
    pub fn switch_project(&self, id: &str) -> Result<(), StoreError> {
        let _guard = self.store_lock.write().unwrap();
        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;
        let exists: bool = tx
            .query_row("SELECT 1 FROM projects WHERE id = ?1", [id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::NotFound(id.to_string()));
        }
        tx.execute("UPDATE projects SET is_active = 0 WHERE is_active = 1", [])?;
        tx.execute("UPDATE projects SET is_active = 1 WHERE id = ?1", [id])?;
        tx.commit()?;
        tracing::debug!(project_id = id, "active project switched");
        Ok(())
    }

    /// Delete a project and, via `ON DELETE CASCADE`, all of its tasks and
    /// predecessor links (spec.md §3 invariant 9).
    pub fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        self.with_project_write(id, |tx| {
            tx.execute("DELETE FROM projects WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, StoreError> {
        let conn = self.read_conn()?;
        let mut tasks = self.list_tasks_with(&conn, project_id)?;
        for task in &mut tasks {
            task.predecessors = self.list_predecessors_with(&conn, project_id, &task.id)?;
        }
        Ok(tasks)
    }

    fn list_tasks_with(&self, conn: &Connection, project_id: &str) -> Result<Vec<Task>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT id, project_id, uid, name, outline_number, outline_level, duration, value,
                    milestone, summary, percent_complete, start_date, finish_date, actual_start,
                    actual_finish, actual_duration, create_date
             FROM tasks WHERE project_id = ?1 ORDER BY outline_number",
        )?;
        let rows = stmt
            .query_map([project_id], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn list_predecessors_with(
        &self,
        conn: &Connection,
        project_id: &str,
        task_id: &str,
    ) -> Result<Vec<PredecessorLink>, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT project_id, outline_number, type, lag, lag_format
             FROM predecessors WHERE project_id = ?1 AND task_id = ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![project_id, task_id], row_to_predecessor)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_task(&self, project_id: &str, task_id: &str) -> Result<Task, StoreError> {
        let conn = self.read_conn()?;
        let mut task = conn
            .query_row(
                "SELECT id, project_id, uid, name, outline_number, outline_level, duration, value,
                        milestone, summary, percent_complete, start_date, finish_date, actual_start,
                        actual_finish, actual_duration, create_date
                 FROM tasks WHERE project_id = ?1 AND id = ?2",
                rusqlite::params![project_id, task_id],
                row_to_task,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        task.predecessors = self.list_predecessors_with(&conn, project_id, &task.id)?;
        Ok(task)
    }

    pub fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        self.with_project_write(&task.project_id, |tx| {
            insert_task(tx, task)?;
            insert_predecessors(tx, task)?;
            Ok(())
        })
    }

    pub fn update_task(&self, task: &Task) -> Result<(), StoreError> {
        self.with_project_write(&task.project_id, |tx| {
            tx.execute(
                "UPDATE tasks SET uid = ?3, name = ?4, outline_number = ?5, outline_level = ?6,
                    duration = ?7, value = ?8, milestone = ?9, summary = ?10, percent_complete = ?11,
                    start_date = ?12, finish_date = ?13, actual_start = ?14, actual_finish = ?15,
                    actual_duration = ?16, create_date = ?17
                 WHERE project_id = ?1 AND id = ?2",
                rusqlite::params![
                    task.project_id,
                    task.id,
                    task.uid,
                    task.name,
                    task.outline_number,
                    task.outline_level,
                    task.duration,
                    task.value,
                    task.milestone as i64,
                    task.summary as i64,
                    task.percent_complete as i64,
                    task.start.map(date_to_sql),
                    task.finish.map(date_to_sql),
                    task.actual_start.map(date_to_sql),
                    task.actual_finish.map(date_to_sql),
                    task.actual_duration,
                    task.create_date.map(date_to_sql),
                ],
            )?;
            tx.execute("DELETE FROM predecessors WHERE task_id = ?1", [&task.id])?;
            insert_predecessors(tx, task)?;
            Ok(())
        })
    }

    /// Delete a task and, per spec.md §3 invariant 10, every predecessor
    /// link that refers to it by outline number — both its own incoming
    /// links (cascaded via FK) and the back-references other tasks hold on
    /// its outline number.
    pub fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), StoreError> {
        let project_id_owned = project_id.to_string();
        self.with_project_write(&project_id_owned, |tx| {
            let outline_number: Option<String> = tx
                .query_row(
                    "SELECT outline_number FROM tasks WHERE project_id = ?1 AND id = ?2",
                    rusqlite::params![project_id, task_id],
                    |r| r.get(0),
                )
                .optional()?;

            tx.execute(
                "DELETE FROM tasks WHERE project_id = ?1 AND id = ?2",
                rusqlite::params![project_id, task_id],
            )?;

            if let Some(outline_number) = outline_number {
                tx.execute(
                    "DELETE FROM predecessors WHERE project_id = ?1 AND outline_number = ?2",
                    rusqlite::params![project_id, outline_number],
                )?;
            }
            Ok(())
        })
    }

    /// Replace a project's entire task and predecessor set in one
    /// transaction (used by XML ingest to overwrite the active project's
    /// contents, spec.md §4.3).
    pub fn replace_tasks(&self, project_id: &str, tasks: &[Task]) -> Result<(), StoreError> {
        let project_id_owned = project_id.to_string();
        self.with_project_write(&project_id_owned, |tx| {
            tx.execute("DELETE FROM predecessors WHERE project_id = ?1", [project_id])?;
            tx.execute("DELETE FROM tasks WHERE project_id = ?1", [project_id])?;
            for task in tasks {
                insert_task(tx, task)?;
                insert_predecessors(tx, task)?;
            }
            Ok(())
        })
    }
}

fn insert_task(tx: &rusqlite::Transaction, task: &Task) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO tasks (id, project_id, uid, name, outline_number, outline_level, duration, value,
                             milestone, summary, percent_complete, start_date, finish_date, actual_start,
                             actual_finish, actual_duration, create_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        rusqlite::params![
            task.id,
            task.project_id,
            task.uid,
            task.name,
            task.outline_number,
            task.outline_level,
            task.duration,
            task.value,
            task.milestone as i64,
            task.summary as i64,
            task.percent_complete as i64,
            task.start.map(date_to_sql),
            task.finish.map(date_to_sql),
            task.actual_start.map(date_to_sql),
            task.actual_finish.map(date_to_sql),
            task.actual_duration,
            task.create_date.map(date_to_sql),
        ],
    )?;
    Ok(())
}

fn insert_predecessors(tx: &rusqlite::Transaction, task: &Task) -> rusqlite::Result<()> {
    for link in &task.predecessors {
        tx.execute(
            "INSERT INTO predecessors (task_id, project_id, outline_number, type, lag, lag_format)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                task.id,
                link.project_id,
                link.predecessor_outline,
                link.link_type.to_wire(),
                link.lag,
                link.lag_format,
            ],
        )?;
    }
    Ok(())
}

fn row_to_project(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        start: date_from_sql(&row.get::<_, String>(2)?),
        status_date: date_from_sql(&row.get::<_, String>(3)?),
        created_at: datetime_from_sql(&row.get::<_, String>(4)?),
        updated_at: datetime_from_sql(&row.get::<_, String>(5)?),
        is_active: row.get::<_, i64>(6)? != 0,
        xml_template: row.get(7)?,
    })
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        project_id: row.get(1)?,
        uid: row.get(2)?,
        name: row.get(3)?,
        outline_number: row.get(4)?,
        outline_level: row.get::<_, i64>(5)? as u32,
        duration: row.get(6)?,
        value: row.get(7)?,
        milestone: row.get::<_, i64>(8)? != 0,
        summary: row.get::<_, i64>(9)? != 0,
        percent_complete: row.get::<_, i64>(10)? as u8,
        start: row.get::<_, Option<String>>(11)?.map(|s| date_from_sql(&s)),
        finish: row.get::<_, Option<String>>(12)?.map(|s| date_from_sql(&s)),
        actual_start: row.get::<_, Option<String>>(13)?.map(|s| date_from_sql(&s)),
        actual_finish: row.get::<_, Option<String>>(14)?.map(|s| date_from_sql(&s)),
        actual_duration: row.get(15)?,
        create_date: row.get::<_, Option<String>>(16)?.map(|s| date_from_sql(&s)),
        predecessors: Vec::new(),
    })
}

fn row_to_predecessor(row: &rusqlite::Row) -> rusqlite::Result<PredecessorLink> {
    let link_type_code: i64 = row.get(2)?;
    Ok(PredecessorLink {
        project_id: row.get(0)?,
        predecessor_outline: row.get(1)?,
        link_type: LinkType::from_wire(link_type_code).unwrap_or(LinkType::FinishToStart),
        lag: row.get(3)?,
        lag_format: row.get(4)?,
    })
}

fn date_to_sql(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn date_from_sql(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_else(|_| NaiveDate::from_ymd_opt(1970, 1, 1).unwrap())
}

fn datetime_to_sql(d: DateTime<Utc>) -> String {
    d.to_rfc3339()
}

fn datetime_from_sql(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
