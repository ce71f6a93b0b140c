use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::TaskId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("invalid priority '{other}' (low, medium, high)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    /// Scheduled like `Daily`; kept distinct so the choice round-trips.
    Custom,
}

impl FromStr for RecurrenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "custom" => Ok(Self::Custom),
            other => Err(format!(
                "invalid recurrence '{other}' (daily, weekly, monthly, custom)"
            )),
        }
    }
}

/// Day of week, ordered Sunday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl DayOfWeek {
    /// Sunday = 0 ... Saturday = 6
    pub fn index(self) -> u32 {
        self as u32
    }
}

impl FromStr for DayOfWeek {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sunday" | "sun" => Ok(Self::Sunday),
            "monday" | "mon" => Ok(Self::Monday),
            "tuesday" | "tue" => Ok(Self::Tuesday),
            "wednesday" | "wed" => Ok(Self::Wednesday),
            "thursday" | "thu" => Ok(Self::Thursday),
            "friday" | "fri" => Ok(Self::Friday),
            "saturday" | "sat" => Ok(Self::Saturday),
            other => Err(format!("invalid weekday '{other}'")),
        }
    }
}

fn default_interval() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub kind: RecurrenceKind,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Only consulted for weekly rules
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub days_of_week: BTreeSet<DayOfWeek>,
    /// 1-31, only consulted for monthly rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u32>,
}

impl RecurrenceRule {
    pub fn new(kind: RecurrenceKind) -> Self {
        Self {
            kind,
            interval: 1,
            end: None,
            days_of_week: BTreeSet::new(),
            day_of_month: None,
        }
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn on_days(mut self, days: impl IntoIterator<Item = DayOfWeek>) -> Self {
        self.days_of_week = days.into_iter().collect();
        self
    }

    pub fn on_day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }
}

/// A stored task record. Each patch produces a new `version`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    pub archived: bool,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub order: i64,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<TaskId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub blocked_by: BTreeSet<TaskId>,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_recurring_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Task {
    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_template(&self) -> bool {
        self.recurrence.is_some()
    }

    pub fn is_instance(&self) -> bool {
        self.parent_recurring_id.is_some()
    }
}

/// Fields of a record about to be inserted. The store assigns id,
/// timestamps and the initial version.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub text: String,
    pub priority: Priority,
    pub category_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: BTreeSet<String>,
    pub parent_id: Option<TaskId>,
    pub order: i64,
    pub is_recurring: bool,
    pub recurrence: Option<RecurrenceRule>,
    pub parent_recurring_id: Option<TaskId>,
}

impl NewTask {
    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            text: self.text,
            completed: false,
            archived: false,
            priority: self.priority,
            category_id: self.category_id,
            due_date: self.due_date,
            tags: self.tags,
            parent_id: self.parent_id,
            order: self.order,
            depends_on: BTreeSet::new(),
            blocked_by: BTreeSet::new(),
            is_recurring: self.is_recurring,
            recurrence: self.recurrence,
            parent_recurring_id: self.parent_recurring_id,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// Partial update of a single record. `None` leaves a field untouched;
/// the nested options on `category_id`/`due_date` allow clearing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub archived: Option<bool>,
    pub priority: Option<Priority>,
    pub category_id: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub tags: Option<BTreeSet<String>>,
    pub order: Option<i64>,
    pub depends_on: Option<BTreeSet<TaskId>>,
    pub blocked_by: Option<BTreeSet<TaskId>>,
    pub is_recurring: Option<bool>,
}

impl TaskPatch {
    /// Produce the next version of `task` with this patch applied.
    pub fn apply(&self, task: &Task, now: DateTime<Utc>) -> Task {
        let mut next = task.clone();
        if let Some(ref text) = self.text {
            next.text = text.clone();
        }
        if let Some(completed) = self.completed {
            next.completed = completed;
        }
        if let Some(archived) = self.archived {
            next.archived = archived;
        }
        if let Some(priority) = self.priority {
            next.priority = priority;
        }
        if let Some(ref category_id) = self.category_id {
            next.category_id = category_id.clone();
        }
        if let Some(due_date) = self.due_date {
            next.due_date = due_date;
        }
        if let Some(ref tags) = self.tags {
            next.tags = tags.clone();
        }
        if let Some(order) = self.order {
            next.order = order;
        }
        if let Some(ref depends_on) = self.depends_on {
            next.depends_on = depends_on.clone();
        }
        if let Some(ref blocked_by) = self.blocked_by {
            next.blocked_by = blocked_by.clone();
        }
        if let Some(is_recurring) = self.is_recurring {
            next.is_recurring = is_recurring;
        }
        next.updated_at = now;
        next.version = task.version + 1;
        next
    }
}

/// Lookups the core needs from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskQuery {
    All,
    /// Tasks without a parent (templates and instances included)
    TopLevel,
    /// Subtasks of a parent, in sibling order
    ChildrenOf(TaskId),
    /// Instances spawned from a template
    InstancesOf(TaskId),
}

#[derive(Debug, Clone, Default)]
pub struct CreateTaskInput {
    pub text: String,
    pub priority: Option<Priority>,
    pub category_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub parent_id: Option<TaskId>,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTaskInput {
    pub text: Option<String>,
    pub priority: Option<Priority>,
    pub category_id: Option<Option<String>>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ListTasksFilter {
    pub parent_id: Option<TaskId>,
    pub completed: Option<bool>,
    pub include_archived: bool,
    pub tag: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        NewTask {
            text: "Water plants".to_string(),
            ..Default::default()
        }
        .into_task(TaskId::new(), Utc::now())
    }

    #[test]
    fn patch_bumps_version_and_leaves_original() {
        let task = sample();
        let patch = TaskPatch {
            completed: Some(true),
            ..Default::default()
        };
        let next = patch.apply(&task, Utc::now());
        assert!(next.completed);
        assert_eq!(next.version, 2);
        assert!(!task.completed);
        assert_eq!(task.version, 1);
    }

    #[test]
    fn patch_can_clear_due_date() {
        let mut task = sample();
        task.due_date = Some(Utc::now());
        let patch = TaskPatch {
            due_date: Some(None),
            ..Default::default()
        };
        assert_eq!(patch.apply(&task, Utc::now()).due_date, None);
    }

    #[test]
    fn rule_json_uses_lowercase_names() {
        let rule = RecurrenceRule::new(RecurrenceKind::Weekly)
            .on_days([DayOfWeek::Monday, DayOfWeek::Friday]);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["kind"], "weekly");
        assert_eq!(json["daysOfWeek"], serde_json::json!(["monday", "friday"]));

        let parsed: RecurrenceRule =
            serde_json::from_str(r#"{"kind":"daily"}"#).unwrap();
        assert_eq!(parsed.interval, 1);
    }

    #[test]
    fn parse_names() {
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("wed".parse::<DayOfWeek>().unwrap(), DayOfWeek::Wednesday);
        assert!("someday".parse::<RecurrenceKind>().is_err());
        assert_eq!(DayOfWeek::Sunday.index(), 0);
        assert_eq!(DayOfWeek::Saturday.index(), 6);
    }
}
