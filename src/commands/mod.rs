pub mod dep;
pub mod series;
pub mod subtask;
pub mod task;

use chrono::{DateTime, NaiveDate, Utc};

use crate::id::TaskId;

pub use dep::{DepCommand, DepResult};
pub use series::{SeriesCommand, SeriesResult};
pub use subtask::{SubtaskCommand, SubtaskResult};
pub use task::{TaskCommand, TaskResult};

/// Parse TaskId from CLI string (requires prefix)
pub(crate) fn parse_task_id(s: &str) -> std::result::Result<TaskId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC.
pub(crate) fn parse_date(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{s}' (expected YYYY-MM-DD or RFC 3339)"))
}
