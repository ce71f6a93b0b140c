use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};

use crate::commands::{parse_date, parse_task_id};
use crate::core::TaskService;
use crate::db::TaskStore;
use crate::error::Result;
use crate::id::TaskId;
use crate::types::Task;

/// Upper bound for `series preview -n`.
pub const MAX_PREVIEW: i64 = 1000;

#[derive(Subcommand)]
pub enum SeriesCommand {
    /// Spawn the first instance of a recurring template
    Start {
        #[arg(value_parser = parse_task_id)]
        template: TaskId,
    },
    /// Stop a series; completing its instances spawns nothing afterwards
    Stop {
        #[arg(value_parser = parse_task_id)]
        template: TaskId,
    },
    /// Show upcoming due dates of a template
    Preview {
        #[arg(value_parser = parse_task_id)]
        template: TaskId,

        /// Start after this date instead of the template's due date
        #[arg(long, value_parser = parse_date)]
        from: Option<DateTime<Utc>>,

        /// Number of dates to show (1-1000)
        #[arg(
            short = 'n',
            long,
            default_value = "5",
            value_parser = clap::value_parser!(u16).range(1..=MAX_PREVIEW)
        )]
        count: u16,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub template_id: TaskId,
    pub dates: Vec<DateTime<Utc>>,
}

pub enum SeriesResult {
    One(Task),
    Preview(Preview),
}

pub fn handle<S: TaskStore>(svc: &TaskService<S>, cmd: &SeriesCommand) -> Result<SeriesResult> {
    match cmd {
        SeriesCommand::Start { template } => Ok(SeriesResult::One(svc.start_series(template)?)),
        SeriesCommand::Stop { template } => Ok(SeriesResult::One(svc.stop_series(template)?)),
        SeriesCommand::Preview {
            template,
            from,
            count,
        } => Ok(SeriesResult::Preview(Preview {
            template_id: template.clone(),
            dates: svc.preview_series(template, *from, usize::from(*count))?,
        })),
    }
}
