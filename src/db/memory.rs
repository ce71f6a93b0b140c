use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::db::{TaskStore, TaskTx};
use crate::error::{Result, TaskError};
use crate::id::TaskId;
use crate::types::{NewTask, Task, TaskPatch, TaskQuery};

/// In-process store. Records are replaced wholesale on every patch, so a
/// `Task` handed out earlier is a frozen older version.
#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn patch_in(tasks: &mut HashMap<TaskId, Task>, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
    let current = tasks.get(id).ok_or_else(|| TaskError::NotFound(id.clone()))?;
    let next = patch.apply(current, Utc::now());
    tasks.insert(id.clone(), next.clone());
    Ok(next)
}

/// Same sort orders as the SQLite queries.
fn query_in(tasks: &HashMap<TaskId, Task>, query: &TaskQuery) -> Vec<Task> {
    let mut found: Vec<Task> = tasks
        .values()
        .filter(|t| match query {
            TaskQuery::All => true,
            TaskQuery::TopLevel => t.parent_id.is_none(),
            TaskQuery::ChildrenOf(parent_id) => t.parent_id.as_ref() == Some(parent_id),
            TaskQuery::InstancesOf(template_id) => {
                t.parent_recurring_id.as_ref() == Some(template_id)
            }
        })
        .cloned()
        .collect();

    match query {
        TaskQuery::ChildrenOf(_) => found.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        }),
        _ => found.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        }),
    }
    found
}

/// Transaction view over the locked map.
struct MemoryTx<'a> {
    tasks: RefCell<&'a mut HashMap<TaskId, Task>>,
}

impl TaskTx for MemoryTx<'_> {
    fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks.borrow().get(id).cloned())
    }

    fn patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        patch_in(&mut self.tasks.borrow_mut(), id, patch)
    }

    fn delete(&self, id: &TaskId) -> Result<()> {
        self.tasks.borrow_mut().remove(id);
        Ok(())
    }

    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        Ok(query_in(&self.tasks.borrow(), query))
    }
}

impl TaskStore for MemoryStore {
    fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        Ok(self.tasks().get(id).cloned())
    }

    fn insert(&self, task: NewTask) -> Result<TaskId> {
        let id = TaskId::new();
        let task = task.into_task(id.clone(), Utc::now());
        self.tasks().insert(id.clone(), task);
        Ok(id)
    }

    fn patch(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task> {
        patch_in(&mut self.tasks(), id, patch)
    }

    fn delete(&self, id: &TaskId) -> Result<()> {
        self.tasks().remove(id);
        Ok(())
    }

    fn query(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        Ok(query_in(&self.tasks(), query))
    }

    fn transaction(&self, f: &mut dyn FnMut(&dyn TaskTx) -> Result<()>) -> Result<()> {
        let mut tasks = self.tasks();
        let snapshot = tasks.clone();
        let result = f(&MemoryTx {
            tasks: RefCell::new(&mut *tasks),
        });
        if result.is_err() {
            *tasks = snapshot;
        }
        result
    }
}
