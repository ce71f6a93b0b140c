//! Completion, un-completion and archiving, plus spawning the next instance
//! of a recurring series when one of its instances is completed.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::dependency_graph::DependencyGraph;
use crate::core::locks::ParentLocks;
use crate::core::recurrence::next_occurrence;
use crate::db::TaskStore;
use crate::error::{Result, TaskError};
use crate::id::TaskId;
use crate::types::{NewTask, Task, TaskPatch, TaskQuery};

/// Result of a completion. The completion stands even when spawning the
/// successor failed; `spawn_error` then carries the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOutcome {
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_instance: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
}

pub struct TaskLifecycleCoordinator<'a> {
    store: &'a dyn TaskStore,
    graph: DependencyGraph<'a>,
}

impl<'a> TaskLifecycleCoordinator<'a> {
    pub fn new(store: &'a dyn TaskStore, locks: &'a ParentLocks) -> Self {
        Self {
            store,
            graph: DependencyGraph::new(store, locks),
        }
    }

    fn load(&self, id: &TaskId) -> Result<Task> {
        self.store
            .get(id)?
            .ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    /// Mark a task completed.
    ///
    /// Subtasks must have all direct dependencies completed. Completing a
    /// recurring instance spawns the next one when the template still
    /// recurs and its rule yields another date. Completing an already
    /// completed task changes nothing and spawns nothing.
    pub fn complete(&self, id: &TaskId) -> Result<CompletionOutcome> {
        let task = self.load(id)?;

        if task.completed {
            debug!(task = %id, "already completed");
            return Ok(CompletionOutcome {
                task,
                next_instance: None,
                spawn_error: None,
            });
        }

        if task.is_subtask() {
            let pending = self.graph.pending_dependencies(&task)?;
            if !pending.is_empty() {
                return Err(TaskError::DependencyBlocked {
                    task_id: id.clone(),
                    pending,
                });
            }
        }

        let task = self.store.patch(
            id,
            &TaskPatch {
                completed: Some(true),
                ..Default::default()
            },
        )?;
        info!(task = %id, "task completed");

        let mut outcome = CompletionOutcome {
            task,
            next_instance: None,
            spawn_error: None,
        };

        if let Some(template_id) = outcome.task.parent_recurring_id.clone() {
            match self.spawn_next(&outcome.task, &template_id) {
                Ok(next) => outcome.next_instance = next,
                Err(e) => {
                    warn!(task = %id, template = %template_id, error = %e, "failed to spawn next instance");
                    outcome.spawn_error = Some(e.to_string());
                }
            }
        }

        Ok(outcome)
    }

    /// Create the instance that follows `instance`, if the series continues.
    fn spawn_next(&self, instance: &Task, template_id: &TaskId) -> Result<Option<Task>> {
        let Some(template) = self.store.get(template_id)? else {
            debug!(template = %template_id, "template gone, series ends");
            return Ok(None);
        };
        if !template.is_recurring {
            debug!(template = %template_id, "template no longer recurring");
            return Ok(None);
        }

        let Some(due) = next_occurrence(template.recurrence.as_ref(), instance.due_date) else {
            info!(template = %template_id, "series ended");
            return Ok(None);
        };

        let next = self.spawn_instance(&template, due)?;
        info!(template = %template_id, instance = %next.id, due = %due, "spawned next instance");
        Ok(Some(next))
    }

    /// Insert an instance of `template` due at `due`.
    fn spawn_instance(&self, template: &Task, due: chrono::DateTime<chrono::Utc>) -> Result<Task> {
        let id = self.store.insert(NewTask {
            text: template.text.clone(),
            priority: template.priority,
            category_id: template.category_id.clone(),
            due_date: Some(due),
            tags: template.tags.clone(),
            parent_recurring_id: Some(template.id.clone()),
            ..Default::default()
        })?;
        self.load(&id)
    }

    /// Spawn the first instance of a template, due at the template's own
    /// due date.
    pub fn start_series(&self, template_id: &TaskId) -> Result<Task> {
        let template = self.load(template_id)?;
        if !template.is_template() {
            return Err(TaskError::InvalidRecurrence(format!(
                "{template_id} has no recurrence rule"
            )));
        }
        let due = template.due_date.ok_or_else(|| {
            TaskError::InvalidRecurrence(format!("{template_id} has no due date to start from"))
        })?;
        let instance = self.spawn_instance(&template, due)?;
        info!(template = %template_id, instance = %instance.id, "series started");
        Ok(instance)
    }

    /// Clear the template's recurring flag; instances completed later spawn
    /// nothing.
    pub fn stop_series(&self, template_id: &TaskId) -> Result<Task> {
        self.load(template_id)?;
        let template = self.store.patch(
            template_id,
            &TaskPatch {
                is_recurring: Some(false),
                ..Default::default()
            },
        )?;
        info!(template = %template_id, "series stopped");
        Ok(template)
    }

    /// Reopen a task. An archived task is un-archived as well, since
    /// archived tasks must stay completed.
    pub fn uncomplete(&self, id: &TaskId) -> Result<Task> {
        let task = self.load(id)?;
        let patch = TaskPatch {
            completed: Some(false),
            archived: task.archived.then_some(false),
            ..Default::default()
        };
        let task = self.store.patch(id, &patch)?;
        info!(task = %id, "task reopened");
        Ok(task)
    }

    /// Archive every completed top-level task. Subtasks are left alone.
    /// Returns the archived tasks.
    pub fn archive_all_completed(&self) -> Result<Vec<Task>> {
        let mut archived = Vec::new();
        for task in self.store.query(&TaskQuery::TopLevel)? {
            if task.completed && !task.archived {
                archived.push(self.store.patch(
                    &task.id,
                    &TaskPatch {
                        archived: Some(true),
                        ..Default::default()
                    },
                )?);
            }
        }
        info!(count = archived.len(), "archived completed tasks");
        Ok(archived)
    }
}
