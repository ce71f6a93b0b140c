use clap::Subcommand;

use crate::commands::parse_task_id;
use crate::core::TaskService;
use crate::db::TaskStore;
use crate::error::Result;
use crate::id::TaskId;
use crate::types::Task;

#[derive(Subcommand)]
pub enum SubtaskCommand {
    /// Add a subtask at the end of its parent's list
    Add {
        #[arg(value_parser = parse_task_id)]
        parent: TaskId,
        text: String,
    },
    /// List a parent's subtasks in order
    List {
        #[arg(value_parser = parse_task_id)]
        parent: TaskId,
    },
    /// Put subtasks in the given order
    Reorder {
        #[arg(value_parser = parse_task_id)]
        parent: TaskId,
        #[arg(required = true, num_args = 1.., value_parser = parse_task_id)]
        ids: Vec<TaskId>,
    },
}

pub enum SubtaskResult {
    One(Task),
    Many(Vec<Task>),
}

pub fn handle<S: TaskStore>(svc: &TaskService<S>, cmd: &SubtaskCommand) -> Result<SubtaskResult> {
    match cmd {
        SubtaskCommand::Add { parent, text } => {
            Ok(SubtaskResult::One(svc.create_subtask(parent, text)?))
        }
        SubtaskCommand::List { parent } => Ok(SubtaskResult::Many(svc.subtasks(parent)?)),
        SubtaskCommand::Reorder { parent, ids } => {
            Ok(SubtaskResult::Many(svc.reorder_subtasks(parent, ids)?))
        }
    }
}
