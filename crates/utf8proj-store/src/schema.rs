//! Schema migration (spec.md §4.4, §6.2). Additive columns with defaults
//! only; no in-place data rewrites.

use rusqlite::Connection;

pub const CURRENT_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_date TEXT NOT NULL,
            status_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            xml_template TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            uid TEXT,
            name TEXT NOT NULL,
            outline_number TEXT NOT NULL,
            outline_level INTEGER NOT NULL,
            duration TEXT NOT NULL,
            value TEXT,
            milestone INTEGER NOT NULL DEFAULT 0,
            summary INTEGER NOT NULL DEFAULT 0,
            percent_complete INTEGER NOT NULL DEFAULT 0,
            start_date TEXT,
            finish_date TEXT,
            actual_start TEXT,
            actual_finish TEXT,
            actual_duration TEXT,
            create_date TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_project_outline ON tasks(project_id, outline_number);

        CREATE TABLE IF NOT EXISTS predecessors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            outline_number TEXT NOT NULL,
            type INTEGER NOT NULL,
            lag INTEGER NOT NULL,
            lag_format INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_predecessors_task ON predecessors(task_id);
        CREATE INDEX IF NOT EXISTS idx_predecessors_project ON predecessors(project_id);
        ",
    )
}
