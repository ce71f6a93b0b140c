use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::commands::parse_task_id;
use crate::core::{Asymmetry, SiblingGraph, TaskService};
use crate::db::TaskStore;
use crate::error::Result;
use crate::id::TaskId;
use crate::types::Task;

#[derive(Subcommand)]
pub enum DepCommand {
    /// Make a subtask depend on a sibling
    Add {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
        #[arg(long, value_parser = parse_task_id)]
        on: TaskId,
    },
    Remove {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
        #[arg(long, value_parser = parse_task_id)]
        on: TaskId,
    },
    /// Report whether a subtask's direct dependencies are all completed
    Check {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    /// Show the dependency graph among a parent's subtasks
    Graph {
        #[arg(value_parser = parse_task_id)]
        parent: TaskId,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub task_id: TaskId,
    pub can_complete: bool,
    pub pending: Vec<TaskId>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphReport {
    #[serde(flatten)]
    pub graph: SiblingGraph,
    pub edge_count: usize,
    pub asymmetries: Vec<Asymmetry>,
}

pub enum DepResult {
    One(Task),
    Check(CheckReport),
    Graph(GraphReport),
}

pub fn handle<S: TaskStore>(svc: &TaskService<S>, cmd: &DepCommand) -> Result<DepResult> {
    match cmd {
        DepCommand::Add { id, on } => Ok(DepResult::One(svc.add_dependency(id, on)?)),
        DepCommand::Remove { id, on } => Ok(DepResult::One(svc.remove_dependency(id, on)?)),
        DepCommand::Check { id } => {
            let task = svc.get(id)?;
            let pending = svc.graph().pending_dependencies(&task)?;
            Ok(DepResult::Check(CheckReport {
                task_id: task.id,
                can_complete: pending.is_empty(),
                pending,
            }))
        }
        DepCommand::Graph { parent } => {
            let graph = svc.dependency_graph(parent)?;
            Ok(DepResult::Graph(GraphReport {
                edge_count: graph.edge_count(),
                asymmetries: graph.asymmetries(),
                graph,
            }))
        }
    }
}
