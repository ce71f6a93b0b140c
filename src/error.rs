use thiserror::Error;

use crate::id::TaskId;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Parent task not found: {0}")]
    ParentNotFound(TaskId),

    /// Dependency endpoints (or a reordered id) belong to different parents
    #[error("{task_id} and {other_id} do not share a parent")]
    CrossParentMismatch { task_id: TaskId, other_id: TaskId },

    #[error("Task {0} is listed more than once")]
    DuplicateId(TaskId),

    #[error("Circular dependency: {dependency_id} already depends on {task_id}")]
    CircularDependency {
        task_id: TaskId,
        dependency_id: TaskId,
    },

    /// Completion attempted while direct dependencies are still open
    #[error("Task {task_id} is blocked by {} incomplete dependencies", pending.len())]
    DependencyBlocked {
        task_id: TaskId,
        pending: Vec<TaskId>,
    },

    #[error("Task {0} is not a subtask")]
    NotASubtask(TaskId),

    #[error("Maximum depth exceeded: subtasks cannot have children")]
    MaxDepthExceeded,

    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;
