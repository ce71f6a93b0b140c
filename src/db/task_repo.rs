use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::de::DeserializeOwned;

use crate::error::{Result, TaskError};
use crate::id::TaskId;
use crate::types::{NewTask, Task, TaskPatch, TaskQuery};

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
    })
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let priority: String = row.get("priority")?;
    let recurrence: Option<String> = row.get("recurrence")?;
    Ok(Task {
        id: row.get("id")?,
        text: row.get("text")?,
        completed: row.get::<_, i32>("completed")? != 0,
        archived: row.get::<_, i32>("archived")? != 0,
        priority: priority.parse().unwrap_or_default(),
        category_id: row.get("category_id")?,
        due_date: row
            .get::<_, Option<String>>("due_date")?
            .and_then(|s| parse_time(&s)),
        tags: json_column(row, "tags")?,
        parent_id: row.get("parent_id")?,
        order: row.get("sort_order")?,
        depends_on: json_column(row, "depends_on")?,
        blocked_by: json_column(row, "blocked_by")?,
        is_recurring: row.get::<_, i32>("is_recurring")? != 0,
        recurrence: recurrence
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?,
        parent_recurring_id: row.get("parent_recurring_id")?,
        created_at: row
            .get::<_, String>("created_at")
            .ok()
            .and_then(|s| parse_time(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>("updated_at")
            .ok()
            .and_then(|s| parse_time(&s))
            .unwrap_or_else(Utc::now),
        version: row.get::<_, i64>("version")? as u64,
    })
}

/// Write every column of `task`, replacing any existing row.
fn write_task(conn: &Connection, task: &Task) -> Result<()> {
    let recurrence = task
        .recurrence
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        r#"
        INSERT OR REPLACE INTO tasks (
            id, text, completed, archived, priority, category_id, due_date, tags,
            parent_id, sort_order, depends_on, blocked_by, is_recurring, recurrence,
            parent_recurring_id, created_at, updated_at, version
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        "#,
        params![
            &task.id,
            task.text,
            task.completed as i32,
            task.archived as i32,
            task.priority.as_str(),
            task.category_id,
            task.due_date.map(|d| d.to_rfc3339()),
            serde_json::to_string(&task.tags)?,
            task.parent_id.as_ref(),
            task.order,
            serde_json::to_string(&task.depends_on)?,
            serde_json::to_string(&task.blocked_by)?,
            task.is_recurring as i32,
            recurrence,
            task.parent_recurring_id.as_ref(),
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
            task.version as i64,
        ],
    )?;
    Ok(())
}

pub fn insert_task(conn: &Connection, input: NewTask) -> Result<TaskId> {
    let id = TaskId::new();
    let task = input.into_task(id.clone(), Utc::now());
    write_task(conn, &task)?;
    Ok(id)
}

pub fn get_task(conn: &Connection, id: &TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT * FROM tasks WHERE id = ?1",
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

/// Read-modify-write of one record inside an immediate transaction, so a
/// second connection cannot slip a write between the read and the replace.
pub fn patch_task(conn: &mut Connection, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let next = apply_patch(&tx, id, patch)?;
    tx.commit()?;
    Ok(next)
}

/// Read-modify-write without its own transaction. The caller must already
/// hold one.
pub fn apply_patch(conn: &Connection, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
    let current = get_task(conn, id)?.ok_or_else(|| TaskError::NotFound(id.clone()))?;
    let next = patch.apply(&current, Utc::now());
    write_task(conn, &next)?;
    Ok(next)
}

pub fn delete_task(conn: &Connection, id: &TaskId) -> Result<()> {
    conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn query_tasks(conn: &Connection, query: &TaskQuery) -> Result<Vec<Task>> {
    let (sql, arg) = match query {
        TaskQuery::All => ("SELECT * FROM tasks ORDER BY created_at ASC, id ASC", None),
        TaskQuery::TopLevel => (
            "SELECT * FROM tasks WHERE parent_id IS NULL ORDER BY created_at ASC, id ASC",
            None,
        ),
        TaskQuery::ChildrenOf(parent_id) => (
            "SELECT * FROM tasks WHERE parent_id = ?1 ORDER BY sort_order ASC, created_at ASC, id ASC",
            Some(parent_id),
        ),
        TaskQuery::InstancesOf(template_id) => (
            "SELECT * FROM tasks WHERE parent_recurring_id = ?1 ORDER BY created_at ASC, id ASC",
            Some(template_id),
        ),
    };

    let mut stmt = conn.prepare(sql)?;
    let tasks = match arg {
        Some(id) => stmt
            .query_map(params![id], row_to_task)?
            .collect::<rusqlite::Result<Vec<Task>>>()?,
        None => stmt
            .query_map([], row_to_task)?
            .collect::<rusqlite::Result<Vec<Task>>>()?,
    };
    Ok(tasks)
}
