use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use crate::commands::{parse_date, parse_task_id};
use crate::core::{CompletionOutcome, TaskService};
use crate::db::TaskStore;
use crate::error::Result;
use crate::id::TaskId;
use crate::types::{
    CreateTaskInput, DayOfWeek, ListTasksFilter, Priority, RecurrenceKind, RecurrenceRule, Task,
    UpdateTaskInput,
};

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Create a task (a recurring template when --repeat is given)
    Create(CreateArgs),
    Get {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    List(ListArgs),
    Update(UpdateArgs),
    /// Delete a task, its subtasks and its dependency edges
    Delete {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    /// Complete a task; completing a recurring instance spawns the next one
    Complete {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    Uncomplete {
        #[arg(value_parser = parse_task_id)]
        id: TaskId,
    },
    /// Archive every completed top-level task
    Archive,
}

#[derive(Args)]
pub struct CreateArgs {
    pub text: String,

    #[arg(short, long)]
    pub priority: Option<Priority>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long, value_parser = parse_date)]
    pub due: Option<DateTime<Utc>>,

    /// Tag to attach (repeatable)
    #[arg(long = "tag", action = clap::ArgAction::Append)]
    pub tags: Vec<String>,

    #[arg(long, value_parser = parse_task_id)]
    pub parent: Option<TaskId>,

    #[command(flatten)]
    pub recurrence: RecurrenceArgs,
}

#[derive(Args)]
pub struct RecurrenceArgs {
    /// Repeat kind: daily, weekly, monthly, custom
    #[arg(long)]
    pub repeat: Option<RecurrenceKind>,

    /// Repeat every N days/weeks/months
    #[arg(long, requires = "repeat")]
    pub every: Option<u32>,

    /// Weekdays for weekly repeats (comma separated, e.g. mon,fri)
    #[arg(long, value_delimiter = ',', requires = "repeat")]
    pub on: Vec<DayOfWeek>,

    #[arg(long, requires = "repeat")]
    pub day_of_month: Option<u32>,

    /// Last date an occurrence may fall on
    #[arg(long, value_parser = parse_date, requires = "repeat")]
    pub until: Option<DateTime<Utc>>,
}

impl RecurrenceArgs {
    pub fn to_rule(&self) -> Option<RecurrenceRule> {
        let mut rule = RecurrenceRule::new(self.repeat?).on_days(self.on.iter().copied());
        if let Some(interval) = self.every {
            rule = rule.every(interval);
        }
        if let Some(day) = self.day_of_month {
            rule = rule.on_day_of_month(day);
        }
        if let Some(end) = self.until {
            rule = rule.until(end);
        }
        Some(rule)
    }
}

#[derive(Args)]
pub struct ListArgs {
    /// List subtasks of this parent instead of top-level tasks
    #[arg(long, value_parser = parse_task_id)]
    pub parent: Option<TaskId>,

    #[arg(long, conflicts_with = "open")]
    pub completed: bool,

    #[arg(long)]
    pub open: bool,

    /// Include archived tasks
    #[arg(short, long)]
    pub all: bool,

    #[arg(long)]
    pub tag: Option<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    #[arg(value_parser = parse_task_id)]
    pub id: TaskId,

    #[arg(long)]
    pub text: Option<String>,

    #[arg(short, long)]
    pub priority: Option<Priority>,

    #[arg(long, conflicts_with = "clear_category")]
    pub category: Option<String>,

    #[arg(long)]
    pub clear_category: bool,

    #[arg(long, value_parser = parse_date, conflicts_with = "clear_due")]
    pub due: Option<DateTime<Utc>>,

    #[arg(long)]
    pub clear_due: bool,

    /// Replace the tag set (comma separated; empty string clears)
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    /// Set the archived flag directly, without touching completion
    #[arg(long)]
    pub archived: Option<bool>,
}

pub enum TaskResult {
    One(Task),
    Many(Vec<Task>),
    Completed(CompletionOutcome),
    Deleted,
}

pub fn handle<S: TaskStore>(svc: &TaskService<S>, cmd: &TaskCommand) -> Result<TaskResult> {
    match cmd {
        TaskCommand::Create(args) => {
            let input = CreateTaskInput {
                text: args.text.clone(),
                priority: args.priority,
                category_id: args.category.clone(),
                due_date: args.due,
                tags: args.tags.clone(),
                parent_id: args.parent.clone(),
                recurrence: args.recurrence.to_rule(),
            };
            Ok(TaskResult::One(svc.create_task(&input)?))
        }

        TaskCommand::Get { id } => Ok(TaskResult::One(svc.get(id)?)),

        TaskCommand::List(args) => {
            let completed = if args.completed {
                Some(true)
            } else if args.open {
                Some(false)
            } else {
                None
            };
            let filter = ListTasksFilter {
                parent_id: args.parent.clone(),
                completed,
                include_archived: args.all,
                tag: args.tag.clone(),
            };
            Ok(TaskResult::Many(svc.list(&filter)?))
        }

        TaskCommand::Update(args) => {
            let category_id = if args.clear_category {
                Some(None)
            } else {
                args.category.clone().map(Some)
            };
            let due_date = if args.clear_due {
                Some(None)
            } else {
                args.due.map(Some)
            };
            let tags = args.tags.as_ref().map(|tags| {
                tags.iter()
                    .filter(|t| !t.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
            });
            let input = UpdateTaskInput {
                text: args.text.clone(),
                priority: args.priority,
                category_id,
                due_date,
                tags,
                archived: args.archived,
            };
            Ok(TaskResult::One(svc.update(&args.id, &input)?))
        }

        TaskCommand::Delete { id } => {
            svc.delete(id)?;
            Ok(TaskResult::Deleted)
        }

        TaskCommand::Complete { id } => Ok(TaskResult::Completed(svc.complete_task(id)?)),

        TaskCommand::Uncomplete { id } => Ok(TaskResult::One(svc.uncomplete_task(id)?)),

        TaskCommand::Archive => Ok(TaskResult::Many(svc.archive_completed_top_level()?)),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::db::MemoryStore;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        cmd: TaskCommand,
    }

    fn parse(args: &[&str]) -> TaskCommand {
        let mut argv = vec!["tl"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().cmd
    }

    #[test]
    fn create_with_repeat_builds_rule() {
        let TaskCommand::Create(args) = parse(&[
            "create",
            "Gym",
            "--repeat",
            "weekly",
            "--on",
            "mon,fri",
            "--due",
            "2026-03-02",
        ]) else {
            panic!("expected create");
        };
        let rule = args.recurrence.to_rule().unwrap();
        assert_eq!(rule.kind, RecurrenceKind::Weekly);
        assert_eq!(rule.days_of_week.len(), 2);
        assert!(rule.days_of_week.contains(&DayOfWeek::Friday));
    }

    #[test]
    fn recurrence_flags_require_repeat() {
        let result = TestCli::try_parse_from(["tl", "create", "Gym", "--every", "2"]);
        assert!(result.is_err());
    }

    #[test]
    fn create_then_complete_spawns_instance() {
        let svc = TaskService::new(MemoryStore::new());
        let TaskResult::One(template) = handle(
            &svc,
            &parse(&["create", "Standup", "--repeat", "daily", "--due", "2026-03-02"]),
        )
        .unwrap() else {
            panic!("expected task");
        };
        let first = svc.start_series(&template.id).unwrap();

        let cmd = TaskCommand::Complete {
            id: first.id.clone(),
        };
        let TaskResult::Completed(outcome) = handle(&svc, &cmd).unwrap() else {
            panic!("expected completion");
        };
        assert!(outcome.task.completed);
        assert!(outcome.next_instance.is_some());
    }

    #[test]
    fn update_clears_due_date() {
        let svc = TaskService::new(MemoryStore::new());
        let TaskResult::One(task) =
            handle(&svc, &parse(&["create", "Report", "--due", "2026-03-02"])).unwrap()
        else {
            panic!("expected task");
        };
        assert!(task.due_date.is_some());

        let id = task.id.to_string();
        let TaskResult::One(task) = handle(&svc, &parse(&["update", &id, "--clear-due"])).unwrap()
        else {
            panic!("expected task");
        };
        assert!(task.due_date.is_none());
    }
}
