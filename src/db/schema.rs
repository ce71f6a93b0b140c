use rusqlite::Connection;

use crate::error::Result;

const SCHEMA_VERSION: i32 = 1;

/// Tasks are stored document-style: set-valued fields and the recurrence
/// rule live in JSON columns, and no foreign keys tie records together.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current_version == 0 {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY CHECK (id LIKE 'task_%'),
                text TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                archived INTEGER NOT NULL DEFAULT 0,
                priority TEXT NOT NULL DEFAULT 'medium',
                category_id TEXT,
                due_date TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                parent_id TEXT CHECK (parent_id LIKE 'task_%'),
                sort_order INTEGER NOT NULL DEFAULT 0,
                depends_on TEXT NOT NULL DEFAULT '[]',
                blocked_by TEXT NOT NULL DEFAULT '[]',
                is_recurring INTEGER NOT NULL DEFAULT 0,
                recurrence TEXT,
                parent_recurring_id TEXT CHECK (parent_recurring_id LIKE 'task_%'),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_parent ON tasks(parent_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_recurring ON tasks(parent_recurring_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_completed ON tasks(completed);

            PRAGMA journal_mode = WAL;
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

pub fn open_db(path: &std::path::Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
    init_schema(&conn)?;
    Ok(conn)
}
