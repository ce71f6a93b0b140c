//! Storage port and its implementations.
//!
//! Each `patch` is a read-modify-write of one task that no other write can
//! interleave with. Writes that must land together on several records go
//! through [`TaskStore::transaction`].

pub mod memory;
pub mod schema;
pub mod task_repo;

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, TransactionBehavior};

use crate::error::Result;
use crate::id::TaskId;
use crate::types::{NewTask, Task, TaskPatch, TaskQuery};

pub use memory::MemoryStore;
pub use schema::open_db;

/// Document store holding task records.
pub trait TaskStore: Send + Sync {
    fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    fn insert(&self, task: NewTask) -> Result<TaskId>;

    /// Apply `patch` atomically and return the new version.
    /// Fails with `NotFound` if the record is gone.
    fn patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task>;

    /// Deleting a missing record is not an error.
    fn delete(&self, id: &TaskId) -> Result<()>;

    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>>;

    /// Run `f` as one unit. No other writer, in this process or another,
    /// interleaves with it, and an error from `f` discards every write it made.
    fn transaction(&self, f: &mut dyn FnMut(&dyn TaskTx) -> Result<()>) -> Result<()>;
}

/// Record access inside [`TaskStore::transaction`].
pub trait TaskTx {
    fn get(&self, id: &TaskId) -> Result<Option<Task>>;

    fn patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task>;

    fn delete(&self, id: &TaskId) -> Result<()>;

    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>>;
}

/// SQLite-backed store. The mutex serializes this process; `BEGIN IMMEDIATE`
/// takes the database write lock up front so other processes wait on
/// `busy_timeout` instead of interleaving.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskStore for SqliteStore {
    fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        task_repo::get_task(&self.conn(), id)
    }

    fn insert(&self, task: NewTask) -> Result<TaskId> {
        task_repo::insert_task(&self.conn(), task)
    }

    fn patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        task_repo::patch_task(&mut self.conn(), id, patch)
    }

    fn delete(&self, id: &TaskId) -> Result<()> {
        task_repo::delete_task(&self.conn(), id)
    }

    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        task_repo::query_tasks(&self.conn(), query)
    }

    fn transaction(&self, f: &mut dyn FnMut(&dyn TaskTx) -> Result<()>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Dropping `tx` on the error path rolls back
        f(&SqliteTx(&*tx))?;
        tx.commit()?;
        Ok(())
    }
}

struct SqliteTx<'a>(&'a Connection);

impl TaskTx for SqliteTx<'_> {
    fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        task_repo::get_task(self.0, id)
    }

    fn patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        task_repo::apply_patch(self.0, id, patch)
    }

    fn delete(&self, id: &TaskId) -> Result<()> {
        task_repo::delete_task(self.0, id)
    }

    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        task_repo::query_tasks(self.0, query)
    }
}
