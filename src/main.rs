use std::io;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use tasklane::commands::{
    dep, series, subtask, task, DepCommand, DepResult, SeriesCommand, SeriesResult,
    SubtaskCommand, SubtaskResult, TaskCommand, TaskResult,
};
use tasklane::core::TaskService;
use tasklane::db::{self, SqliteStore};
use tasklane::error;

mod output;

use output::Printer;

#[derive(Parser)]
#[command(name = "tl")]
#[command(version)]
#[command(
    about = "tasklane - to-do lists with subtasks, dependencies and recurring tasks",
    long_about = r#"
tasklane (tl) - personal task manager.

Features:
  • Subtasks with explicit ordering
  • Dependencies between sibling subtasks
  • Recurring tasks (daily, weekly, monthly)

Environment:
  TASKLANE_DB_PATH  Override database location
  TASKLANE_LOG      Log filter (e.g. debug, tasklane=trace)
  NO_COLOR          Disable colored output
"#
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output in JSON format (for programmatic use)
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Override database path (default: ./.tasklane/tasks.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log service activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Task management (CRUD, completion, archiving)
    #[command(subcommand)]
    Task(TaskCommand),

    /// Subtasks of a task
    #[command(subcommand)]
    Subtask(SubtaskCommand),

    /// Dependencies between sibling subtasks
    #[command(subcommand)]
    Dep(DepCommand),

    /// Recurring series
    #[command(subcommand)]
    Series(SeriesCommand),

    /// Generate shell completions
    #[command(
        about = "Generate shell completions",
        long_about = r#"
Generate shell completions for tl CLI.

Examples:
  tl completions bash > ~/.local/share/bash-completion/completions/tl
  tl completions zsh > ~/.zfunc/_tl
  tl completions fish > ~/.config/fish/completions/tl.fish
"#
    )]
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },

    /// Initialize database
    #[command(
        about = "Initialize database",
        long_about = r#"
Initialize the tasklane database.

The database is created at:
  1. --db <path> (if given)
  2. TASKLANE_DB_PATH (if set)
  3. CWD/.tasklane/tasks.db (fallback)

Usually runs automatically on first command.
"#
    )]
    Init,
}

/// Resolution order:
/// 1. TASKLANE_DB_PATH env var (if set)
/// 2. current working directory -> .tasklane/tasks.db
fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("TASKLANE_DB_PATH") {
        return PathBuf::from(path);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    cwd.join(".tasklane").join("tasks.db")
}

/// Logs go to stderr so stdout stays clean for `--json`.
fn setup_logging(verbose: bool) {
    let default = if verbose { "tasklane=debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("TASKLANE_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // PRECONDITION: Completions bypass normal output flow - raw shell script to stdout
    if let Command::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "tl", &mut io::stdout());
        return;
    }

    setup_logging(cli.verbose);

    let db_path = cli.db.clone().unwrap_or_else(default_db_path);
    tracing::debug!(path = %db_path.display(), "using database");

    match run(&cli.command, &db_path) {
        Ok(output) => {
            if cli.json {
                println!("{}", output);
            } else {
                let printer = Printer::new(cli.no_color);
                printer.print(&cli.command, &output);
            }
        }
        Err(e) => {
            if cli.json {
                let err = serde_json::json!({ "error": e.to_string() });
                eprintln!("{}", err);
            } else {
                let printer = Printer::new_for_stderr(cli.no_color);
                printer.print_error(&format!("Error: {}", e));
            }
            std::process::exit(1);
        }
    }
}

fn run(command: &Command, db_path: &Path) -> error::Result<String> {
    if let Command::Init = command {
        db::open_db(db_path)?;
        return Ok(serde_json::json!({ "initialized": true, "path": db_path }).to_string());
    }

    let svc = TaskService::new(SqliteStore::open(db_path)?);

    match command {
        Command::Task(cmd) => match task::handle(&svc, cmd)? {
            TaskResult::One(t) => Ok(serde_json::to_string_pretty(&t)?),
            TaskResult::Many(ts) => Ok(serde_json::to_string_pretty(&ts)?),
            TaskResult::Completed(outcome) => Ok(serde_json::to_string_pretty(&outcome)?),
            TaskResult::Deleted => Ok(serde_json::json!({ "deleted": true }).to_string()),
        },
        Command::Subtask(cmd) => match subtask::handle(&svc, cmd)? {
            SubtaskResult::One(t) => Ok(serde_json::to_string_pretty(&t)?),
            SubtaskResult::Many(ts) => Ok(serde_json::to_string_pretty(&ts)?),
        },
        Command::Dep(cmd) => match dep::handle(&svc, cmd)? {
            DepResult::One(t) => Ok(serde_json::to_string_pretty(&t)?),
            DepResult::Check(report) => Ok(serde_json::to_string_pretty(&report)?),
            DepResult::Graph(report) => Ok(serde_json::to_string_pretty(&report)?),
        },
        Command::Series(cmd) => match series::handle(&svc, cmd)? {
            SeriesResult::One(t) => Ok(serde_json::to_string_pretty(&t)?),
            SeriesResult::Preview(preview) => Ok(serde_json::to_string_pretty(&preview)?),
        },
        // PRECONDITION: Init and Completions handled before the store is opened
        Command::Init | Command::Completions { .. } => {
            unreachable!("handled before run() opens the store")
        }
    }
}
