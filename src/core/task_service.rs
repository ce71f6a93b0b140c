use chrono::{DateTime, Utc};
use tracing::info;

use crate::core::dependency_graph::{DependencyGraph, SiblingGraph};
use crate::core::lifecycle::{CompletionOutcome, TaskLifecycleCoordinator};
use crate::core::locks::ParentLocks;
use crate::core::ordering::OrderingService;
use crate::core::recurrence::{self, next_occurrence};
use crate::db::TaskStore;
use crate::error::{Result, TaskError};
use crate::id::TaskId;
use crate::types::{
    CreateTaskInput, ListTasksFilter, NewTask, Task, TaskPatch, TaskQuery, UpdateTaskInput,
};

/// Entry point for every task operation. Owns the store handle and the
/// per-parent lock arena shared by the graph and ordering services.
pub struct TaskService<S: TaskStore> {
    store: S,
    locks: ParentLocks,
}

impl<S: TaskStore> TaskService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: ParentLocks::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn graph(&self) -> DependencyGraph<'_> {
        DependencyGraph::new(&self.store, &self.locks)
    }

    pub fn ordering(&self) -> OrderingService<'_> {
        OrderingService::new(&self.store, &self.locks)
    }

    pub fn lifecycle(&self) -> TaskLifecycleCoordinator<'_> {
        TaskLifecycleCoordinator::new(&self.store, &self.locks)
    }

    pub fn create_task(&self, input: &CreateTaskInput) -> Result<Task> {
        if let Some(ref rule) = input.recurrence {
            recurrence::validate_rule(rule)?;
            if input.parent_id.is_some() {
                return Err(TaskError::InvalidRecurrence(
                    "subtasks cannot recur".to_string(),
                ));
            }
        }

        let order = match input.parent_id {
            Some(ref parent_id) => {
                self.guard_parent(parent_id)?;
                self.ordering().next_order(parent_id)?
            }
            None => 0,
        };

        let id = self.store.insert(NewTask {
            text: input.text.clone(),
            priority: input.priority.unwrap_or_default(),
            category_id: input.category_id.clone(),
            due_date: input.due_date,
            tags: input.tags.iter().cloned().collect(),
            parent_id: input.parent_id.clone(),
            order,
            is_recurring: input.recurrence.is_some(),
            recurrence: input.recurrence.clone(),
            parent_recurring_id: None,
        })?;
        info!(task = %id, recurring = input.recurrence.is_some(), "task created");
        self.get(&id)
    }

    /// New subtask placed after its existing siblings.
    pub fn create_subtask(&self, parent_id: &TaskId, text: &str) -> Result<Task> {
        self.create_task(&CreateTaskInput {
            text: text.to_string(),
            parent_id: Some(parent_id.clone()),
            ..Default::default()
        })
    }

    /// Subtasks may only hang off top-level tasks.
    fn guard_parent(&self, parent_id: &TaskId) -> Result<Task> {
        let parent = self
            .store
            .get(parent_id)?
            .ok_or_else(|| TaskError::ParentNotFound(parent_id.clone()))?;
        if parent.is_subtask() {
            return Err(TaskError::MaxDepthExceeded);
        }
        Ok(parent)
    }

    pub fn get(&self, id: &TaskId) -> Result<Task> {
        self.store
            .get(id)?
            .ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    pub fn list(&self, filter: &ListTasksFilter) -> Result<Vec<Task>> {
        let query = match filter.parent_id {
            Some(ref parent_id) => TaskQuery::ChildrenOf(parent_id.clone()),
            None => TaskQuery::TopLevel,
        };
        let mut tasks = self.store.query(&query)?;
        tasks.retain(|t| {
            (filter.include_archived || !t.archived)
                && filter.completed.is_none_or(|c| t.completed == c)
                && filter.tag.as_ref().is_none_or(|tag| t.tags.contains(tag))
        });
        Ok(tasks)
    }

    pub fn subtasks(&self, parent_id: &TaskId) -> Result<Vec<Task>> {
        self.get(parent_id)?;
        self.store.query(&TaskQuery::ChildrenOf(parent_id.clone()))
    }

    /// Raw field update. Archiving here does not require completion.
    pub fn update(&self, id: &TaskId, input: &UpdateTaskInput) -> Result<Task> {
        self.get(id)?;
        let patch = TaskPatch {
            text: input.text.clone(),
            priority: input.priority,
            category_id: input.category_id.clone(),
            due_date: input.due_date,
            tags: input
                .tags
                .as_ref()
                .map(|tags| tags.iter().cloned().collect()),
            archived: input.archived,
            ..Default::default()
        };
        self.store.patch(id, &patch)
    }

    /// Delete a task and its subtasks. The task leaves its siblings'
    /// dependency sets in the same step.
    pub fn delete(&self, id: &TaskId) -> Result<()> {
        let task = self.get(id)?;
        self.graph().remove_task(&task)?;
        info!(task = %id, "task deleted");
        Ok(())
    }

    pub fn complete_task(&self, id: &TaskId) -> Result<CompletionOutcome> {
        self.lifecycle().complete(id)
    }

    pub fn uncomplete_task(&self, id: &TaskId) -> Result<Task> {
        self.lifecycle().uncomplete(id)
    }

    pub fn archive_completed_top_level(&self) -> Result<Vec<Task>> {
        self.lifecycle().archive_all_completed()
    }

    pub fn add_dependency(&self, subtask_id: &TaskId, depends_on_id: &TaskId) -> Result<Task> {
        self.graph().add_edge(subtask_id, depends_on_id)?;
        self.get(subtask_id)
    }

    pub fn remove_dependency(&self, subtask_id: &TaskId, depends_on_id: &TaskId) -> Result<Task> {
        self.graph().remove_edge(subtask_id, depends_on_id)?;
        self.get(subtask_id)
    }

    pub fn can_complete(&self, subtask_id: &TaskId) -> Result<bool> {
        self.graph().can_complete(subtask_id)
    }

    pub fn dependency_graph(&self, parent_id: &TaskId) -> Result<SiblingGraph> {
        self.get(parent_id)?;
        self.graph().snapshot(parent_id)
    }

    pub fn reorder_subtasks(&self, parent_id: &TaskId, ordered_ids: &[TaskId]) -> Result<Vec<Task>> {
        self.ordering().reorder(parent_id, ordered_ids)?;
        self.subtasks(parent_id)
    }

    pub fn start_series(&self, template_id: &TaskId) -> Result<Task> {
        self.lifecycle().start_series(template_id)
    }

    pub fn stop_series(&self, template_id: &TaskId) -> Result<Task> {
        self.lifecycle().stop_series(template_id)
    }

    /// Upcoming due dates of a template, starting after `from` (or the
    /// template's due date). Stops early when the series ends.
    pub fn preview_series(
        &self,
        template_id: &TaskId,
        from: Option<DateTime<Utc>>,
        count: usize,
    ) -> Result<Vec<DateTime<Utc>>> {
        let template = self.get(template_id)?;
        let mut dates = Vec::new();
        let mut current = from.or(template.due_date);
        while dates.len() < count {
            match next_occurrence(template.recurrence.as_ref(), current) {
                Some(next) => {
                    dates.push(next);
                    current = Some(next);
                }
                None => break,
            }
        }
        Ok(dates)
    }
}
