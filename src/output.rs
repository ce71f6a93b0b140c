use std::io::IsTerminal;

use owo_colors::{OwoColorize, Style};

use tasklane::commands::dep::{CheckReport, GraphReport};
use tasklane::commands::series::Preview;
use tasklane::commands::{DepCommand, SeriesCommand, SubtaskCommand, TaskCommand};
use tasklane::core::{CompletionOutcome, MissingSide};
use tasklane::types::{Priority, Task};

use crate::Command;

/// Task status for display classification
#[derive(Clone, Copy, PartialEq, Eq)]
enum TaskStatus {
    Archived,
    Completed,
    Open,
}

impl TaskStatus {
    fn classify(task: &Task) -> Self {
        if task.archived {
            Self::Archived
        } else if task.completed {
            Self::Completed
        } else {
            Self::Open
        }
    }
}

/// Color policy: --no-color > NO_COLOR env > TERM=dumb > !isatty > default (color)
fn should_use_color_for(no_color_flag: bool, is_tty: bool) -> bool {
    if no_color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    if std::env::var("TERM").ok().as_deref() == Some("dumb") {
        return false;
    }
    is_tty
}

struct Colors {
    task_id: Style,
    completed: Style,
    pending: Style,
    archived: Style,
    blocked: Style,
    priority_high: Style,
    priority_low: Style,
    recurring: Style,
    error: Style,
}

impl Colors {
    fn new(use_color: bool) -> Self {
        if use_color {
            Self {
                task_id: Style::new().cyan().dimmed(),
                completed: Style::new().green(),
                pending: Style::new().yellow(),
                archived: Style::new().dimmed(),
                blocked: Style::new().red(),
                priority_high: Style::new().red(),
                priority_low: Style::new().dimmed(),
                recurring: Style::new().magenta(),
                error: Style::new().red().bold(),
            }
        } else {
            Self {
                task_id: Style::new(),
                completed: Style::new(),
                pending: Style::new(),
                archived: Style::new(),
                blocked: Style::new(),
                priority_high: Style::new(),
                priority_low: Style::new(),
                recurring: Style::new(),
                error: Style::new(),
            }
        }
    }
}

/// Handles human-readable CLI output. Every command's result arrives as the
/// same JSON that `--json` prints and is re-read here for display.
pub struct Printer {
    colors: Colors,
}

impl Printer {
    pub fn new(no_color_flag: bool) -> Self {
        let use_color = should_use_color_for(no_color_flag, std::io::stdout().is_terminal());
        Self {
            colors: Colors::new(use_color),
        }
    }

    pub fn new_for_stderr(no_color_flag: bool) -> Self {
        let use_color = should_use_color_for(no_color_flag, std::io::stderr().is_terminal());
        Self {
            colors: Colors::new(use_color),
        }
    }

    pub fn print_error(&self, message: &str) {
        eprintln!("{}", message.style(self.colors.error));
    }

    fn fmt_id(&self, id: &impl std::fmt::Display) -> String {
        format!("{}", id.to_string().style(self.colors.task_id))
    }

    fn status_symbol_style(&self, status: TaskStatus) -> (&'static str, Style) {
        match status {
            TaskStatus::Archived => ("▪", self.colors.archived),
            TaskStatus::Completed => ("✓", self.colors.completed),
            TaskStatus::Open => ("○", self.colors.pending),
        }
    }

    fn priority_style(&self, priority: Priority) -> Style {
        match priority {
            Priority::High => self.colors.priority_high,
            Priority::Medium => Style::new(),
            Priority::Low => self.colors.priority_low,
        }
    }

    pub fn print(&self, command: &Command, output: &str) {
        match command {
            Command::Init => println!("Initialized tasklane database"),
            Command::Task(TaskCommand::Delete { .. }) => println!("Task deleted"),
            Command::Task(TaskCommand::List(_)) | Command::Task(TaskCommand::Archive) => {
                self.print_task_list(output);
            }
            Command::Task(TaskCommand::Complete { .. }) => self.print_completion(output),
            Command::Task(_) => self.print_task(output),
            Command::Subtask(SubtaskCommand::Add { .. }) => self.print_task(output),
            Command::Subtask(_) => self.print_task_list(output),
            Command::Dep(DepCommand::Check { .. }) => self.print_check(output),
            Command::Dep(DepCommand::Graph { .. }) => self.print_graph(output),
            Command::Dep(_) => self.print_task(output),
            Command::Series(SeriesCommand::Preview { .. }) => self.print_preview(output),
            Command::Series(_) => self.print_task(output),
            // PRECONDITION: completions are written straight to stdout by main()
            Command::Completions { .. } => {}
        }
    }

    fn task_line(&self, task: &Task) -> String {
        let (sym, style) = self.status_symbol_style(TaskStatus::classify(task));
        let mut line = format!(
            "[{}] {} - {}",
            sym.style(style),
            self.fmt_id(&task.id),
            task.text.style(self.priority_style(task.priority))
        );
        if task.is_template() {
            line.push_str(&format!(" {}", "↻".style(self.colors.recurring)));
        }
        if let Some(due) = task.due_date {
            line.push_str(&format!(" (due {})", due.format("%Y-%m-%d %H:%M")));
        }
        line
    }

    fn print_task_list(&self, output: &str) {
        let Ok(tasks) = serde_json::from_str::<Vec<Task>>(output) else {
            println!("{}", output);
            return;
        };
        if tasks.is_empty() {
            println!("No tasks found");
            return;
        }
        for task in &tasks {
            let indent = if task.is_subtask() { "  " } else { "" };
            println!("{}{}", indent, self.task_line(task));
        }
        let done = tasks.iter().filter(|t| t.completed).count();
        println!();
        println!("{} tasks: {} completed, {} open", tasks.len(), done, tasks.len() - done);
    }

    fn print_task_detail(&self, task: &Task) {
        let (label, style) = match TaskStatus::classify(task) {
            TaskStatus::Archived => ("archived", self.colors.archived),
            TaskStatus::Completed => ("completed", self.colors.completed),
            TaskStatus::Open => ("open", self.colors.pending),
        };
        println!("Task: {} ({})", self.fmt_id(&task.id), label.style(style));
        println!("  Text: {}", task.text);
        println!(
            "  Priority: {}",
            task.priority.style(self.priority_style(task.priority))
        );
        if let Some(due) = task.due_date {
            println!("  Due: {}", due.to_rfc3339());
        }
        if let Some(ref category) = task.category_id {
            println!("  Category: {}", category);
        }
        if !task.tags.is_empty() {
            let tags: Vec<&str> = task.tags.iter().map(String::as_str).collect();
            println!("  Tags: {}", tags.join(", "));
        }
        if let Some(ref parent) = task.parent_id {
            println!("  Parent: {} (order {})", self.fmt_id(parent), task.order);
        }
        if let Some(ref rule) = task.recurrence {
            let state = if task.is_recurring { "active" } else { "stopped" };
            println!(
                "  Repeats: {:?} every {} ({})",
                rule.kind,
                rule.interval,
                state.style(self.colors.recurring)
            );
        }
        if let Some(ref template) = task.parent_recurring_id {
            println!("  Series: {}", self.fmt_id(template));
        }
        if !task.depends_on.is_empty() {
            let ids: Vec<String> = task.depends_on.iter().map(|id| self.fmt_id(id)).collect();
            println!("  Depends on: {}", ids.join(", "));
        }
        if !task.blocked_by.is_empty() {
            let ids: Vec<String> = task.blocked_by.iter().map(|id| self.fmt_id(id)).collect();
            println!("  Blocks: {}", ids.join(", "));
        }
    }

    fn print_task(&self, output: &str) {
        match serde_json::from_str::<Task>(output) {
            Ok(task) => self.print_task_detail(&task),
            Err(_) => println!("{}", output),
        }
    }

    fn print_completion(&self, output: &str) {
        let Ok(outcome) = serde_json::from_str::<CompletionOutcome>(output) else {
            println!("{}", output);
            return;
        };
        self.print_task_detail(&outcome.task);
        if let Some(ref next) = outcome.next_instance {
            println!("Next: {}", self.task_line(next));
        }
        if let Some(ref err) = outcome.spawn_error {
            println!(
                "{} {}",
                "Next instance not created:".style(self.colors.blocked),
                err
            );
        }
    }

    fn print_check(&self, output: &str) {
        let Ok(report) = serde_json::from_str::<CheckReport>(output) else {
            println!("{}", output);
            return;
        };
        if report.can_complete {
            println!(
                "{} {} can be completed",
                "✓".style(self.colors.completed),
                self.fmt_id(&report.task_id)
            );
        } else {
            let ids: Vec<String> = report.pending.iter().map(|id| self.fmt_id(id)).collect();
            println!(
                "{} {} is waiting on {}",
                "⊘".style(self.colors.blocked),
                self.fmt_id(&report.task_id),
                ids.join(", ")
            );
        }
    }

    fn print_graph(&self, output: &str) {
        let Ok(report) = serde_json::from_str::<GraphReport>(output) else {
            println!("{}", output);
            return;
        };
        println!("Dependencies under {}", self.fmt_id(&report.graph.parent_id));
        if report.edge_count == 0 {
            println!("  (none)");
        }
        for (from, to) in report.graph.edges() {
            println!("  {} -> {}", self.fmt_id(from), self.fmt_id(to));
        }
        for gap in &report.asymmetries {
            let side = match gap.missing {
                MissingSide::BlockedBy => "blockedBy",
                MissingSide::DependsOn => "dependsOn",
            };
            println!(
                "  {} {} -> {} missing {}",
                "!".style(self.colors.blocked),
                self.fmt_id(&gap.from),
                self.fmt_id(&gap.to),
                side
            );
        }
    }

    fn print_preview(&self, output: &str) {
        let Ok(preview) = serde_json::from_str::<Preview>(output) else {
            println!("{}", output);
            return;
        };
        if preview.dates.is_empty() {
            println!("No upcoming occurrences");
            return;
        }
        for date in &preview.dates {
            println!("  {}", date.format("%a %Y-%m-%d %H:%M"));
        }
    }
}
