//! taskloop - local-first task, streak and timer tracker
//!
//! Keeps tasks, completion history, habit streaks and loose to-dos in local
//! storage and optionally mirrors them to a REST backend.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

mod config;
mod dates;
mod models;
mod remote;
mod repository;
mod stats;
mod store;
mod streak;
mod timer;

use config::Config;
use models::{NewTask, PendingTask, PendingTaskPatch, Settings, Streak, StreakPatch, Task, TaskPatch};
use remote::MirrorClient;
use repository::{Repository, setting_u64};
use store::Store;

#[derive(Parser)]
#[command(name = "taskloop")]
#[command(about = "Local-first task, streak and timer tracker")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new config file
    Init {
        /// Output path for config file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scheduled, timed tasks
    #[command(subcommand)]
    Task(TaskCommand),

    /// Completed-task history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Daily habit streaks
    #[command(subcommand)]
    Streak(StreakCommand),

    /// Unscheduled to-do items
    #[command(subcommand)]
    Pending(PendingCommand),

    /// View or change settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Totals, accuracy and day streak over history
    Stats,

    /// Write a JSON backup
    Export {
        /// Output file (defaults to taskloop-backup-<date>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace tasks and history from a JSON backup
    Import {
        /// Backup file
        file: PathBuf,
    },

    /// Delete all data and restore default settings
    Clear {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Add a task
    Add {
        name: String,
        /// Planned minutes (defaults to the defaultDuration setting)
        #[arg(short, long)]
        duration: Option<u32>,
        /// Planned wall-clock start, e.g. 09:30
        #[arg(short, long)]
        start: Option<String>,
        /// Scheduled date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// List tasks (today by default)
    List {
        #[arg(long, conflicts_with = "all")]
        date: Option<String>,
        #[arg(long)]
        all: bool,
    },
    /// Change fields of a task
    Edit {
        id: String,
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Start or resume a task's countdown
    Start { id: String },
    /// Pause the running task
    Pause,
    /// Complete the current task
    Complete {
        /// Minutes actually spent (defaults to planned)
        #[arg(long)]
        actual: Option<u32>,
    },
    /// Delete a task
    Delete { id: String },
    /// Show the current task and its countdown
    Current {
        /// Refresh every second until the countdown ends
        #[arg(short, long)]
        follow: bool,
    },
}

#[derive(Args)]
struct TaskFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(short, long)]
    duration: Option<u32>,
    #[arg(short, long)]
    start: Option<String>,
    #[arg(long)]
    date: Option<String>,
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List completed tasks
    List {
        /// Only entries completed on this date
        #[arg(long)]
        date: Option<String>,
        /// Show at most this many recent entries
        #[arg(short = 'n', long, default_value_t = 10)]
        last: usize,
    },
    /// Drop entries older than the retention window
    Prune {
        /// Days to keep (defaults to the historyRetention setting, 0 keeps all)
        #[arg(long)]
        days: Option<u32>,
    },
}

#[derive(Subcommand)]
enum StreakCommand {
    Add { name: String },
    List,
    /// Mark a streak done for today
    Complete { id: String },
    Rename { id: String, name: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum PendingCommand {
    Add { name: String },
    List,
    Done { id: String },
    Undone { id: String },
    Rename { id: String, name: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    /// Set one option; the value is parsed as JSON, else kept as text
    Set { key: String, value: String },
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(
                    "taskloop=info"
                        .parse::<tracing_subscriber::filter::Directive>()
                        .context("Invalid log directive")?,
                ),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Init { output } = &cli.command {
        return init_config(output.clone(), cli.config.as_ref());
    }

    let cfg = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let repo = open_repository(&cfg)?;

    let result = run(&repo, cli.command).await;

    // Mirror jobs still pending at exit would be dropped
    repo.settle().await;
    result
}

fn init_config(output: Option<PathBuf>, config: Option<&PathBuf>) -> Result<()> {
    let path = match output.or_else(|| config.cloned()) {
        Some(path) => path,
        None => Config::default_path()?,
    };
    if path.exists() {
        bail!("Config file already exists at {}", path.display());
    }

    Config::default().save_to(&path)?;
    println!("Created config file: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Pick a storage backend under [storage]");
    println!("  2. Optionally set [remote] url/api_key and enabled = true");
    println!("  3. Add a task: taskloop task add \"Write report\" --duration 30");
    Ok(())
}

fn open_repository(cfg: &Config) -> Result<Repository> {
    let substrate = store::open_substrate(&cfg.storage).context("Failed to open storage")?;
    let store = Store::new(substrate);
    store.on_change(|changes| {
        for key in changes.keys() {
            tracing::debug!(key = %key, "Storage changed");
        }
    });

    let mirror = if cfg.remote.is_active() {
        match MirrorClient::new(cfg.remote.clone()) {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "Remote mirror disabled");
                None
            }
        }
    } else {
        None
    };

    let substrate = store.substrate_name();
    let repo = Repository::new(store, mirror);
    tracing::debug!(substrate, mirrored = repo.is_mirrored(), "Repository ready");
    Ok(repo)
}

async fn run(repo: &Repository, command: Commands) -> Result<()> {
    match command {
        Commands::Init { .. } => Ok(()),
        Commands::Task(cmd) => run_task(repo, cmd).await,
        Commands::History(cmd) => run_history(repo, cmd).await,
        Commands::Streak(cmd) => run_streak(repo, cmd).await,
        Commands::Pending(cmd) => run_pending(repo, cmd).await,
        Commands::Settings(cmd) => run_settings(repo, cmd).await,
        Commands::Stats => {
            let history = repo.get_task_history().await;
            println!("Completed tasks: {}", history.len());
            println!(
                "Total time:      {}",
                stats::format_minutes(stats::total_minutes(&history))
            );
            println!("Avg accuracy:    {}%", stats::average_accuracy(&history));
            println!(
                "Day streak:      {}",
                stats::streak_days(&history, dates::today())
            );
            Ok(())
        }
        Commands::Export { output } => {
            let doc = repo.export_data().await.context("Failed to export data")?;
            let path = output.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "taskloop-backup-{}.json",
                    dates::format_date(dates::today())
                ))
            });
            let text = serde_json::to_string_pretty(&doc).context("Failed to serialize backup")?;
            std::fs::write(&path, text).context("Failed to write backup")?;
            println!("Exported {} tasks to {}", doc.tasks.len(), path.display());
            Ok(())
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file).context("Failed to read backup")?;
            let summary = repo
                .import_data(&text)
                .await
                .context("Error importing data")?;
            println!(
                "Imported {} tasks and {} history entries",
                summary.tasks, summary.history
            );
            if let Some(streaks) = summary.streaks {
                println!("Imported {} streaks", streaks);
            }
            if let Some(pending) = summary.pending_tasks {
                println!("Imported {} pending tasks", pending);
            }
            if summary.skipped > 0 {
                println!("Skipped {} unreadable entries", summary.skipped);
            }
            Ok(())
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("This deletes all tasks, history and settings. Re-run with --yes.");
            }
            if !repo.clear_all().await {
                bail!("Failed to clear data");
            }
            println!("All data cleared");
            Ok(())
        }
    }
}

async fn run_task(repo: &Repository, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Add {
            name,
            duration,
            start,
            date,
        } => {
            let duration = match duration {
                Some(minutes) => minutes,
                None => default_duration(repo).await,
            };
            let scheduled_date = date.map(|d| validate_date(&d)).transpose()?;
            let task = repo
                .add_task(NewTask {
                    name,
                    duration,
                    start_time: start,
                    status: None,
                    scheduled_date,
                })
                .await
                .context("Failed to add task")?;
            println!("Added task {}", task.id);
            print_task(&task);
        }
        TaskCommand::List { date, all } => {
            let tasks = if all {
                repo.get_tasks().await
            } else if let Some(date) = date {
                repo.get_tasks_by_date(&validate_date(&date)?).await
            } else {
                repo.get_todays_tasks().await
            };
            if tasks.is_empty() {
                println!("No tasks.");
            }
            for task in &tasks {
                print_task(task);
            }
        }
        TaskCommand::Edit { id, fields } => {
            let patch = TaskPatch {
                name: fields.name,
                duration: fields.duration,
                start_time: fields.start,
                scheduled_date: fields.date.map(|d| validate_date(&d)).transpose()?,
                ..Default::default()
            };
            let task = repo
                .update_task(&id, patch)
                .await
                .with_context(|| format!("Task '{}' not updated", id))?;
            print_task(&task);
        }
        TaskCommand::Start { id } => {
            let task = repo
                .start_task(&id, dates::now_ms())
                .await
                .with_context(|| format!("Task '{}' not started", id))?;
            println!(
                "Started {} ({} left)",
                task.name,
                timer::format_countdown(timer::remaining_ms(&task, dates::now_ms()))
            );
        }
        TaskCommand::Pause => match repo.pause_current(dates::now_ms()).await {
            Some(task) => println!(
                "Paused {} with {} left",
                task.name,
                timer::format_countdown(timer::planned_remaining_ms(&task))
            ),
            None => println!("No running task."),
        },
        TaskCommand::Complete { actual } => match repo.complete_current(actual).await {
            Some(entry) => println!(
                "Completed {} in {}",
                entry.task.name,
                stats::format_minutes(u64::from(entry.actual_duration))
            ),
            None => println!("No current task."),
        },
        TaskCommand::Delete { id } => {
            if repo.get_current_task().await.is_some_and(|t| t.id == id) {
                repo.clear_current_task().await;
            }
            if !repo.delete_task(&id).await {
                bail!("Task '{}' not found", id);
            }
            println!("Deleted task {}", id);
        }
        TaskCommand::Current { follow } => show_current(repo, follow).await?,
    }
    Ok(())
}

async fn show_current(repo: &Repository, follow: bool) -> Result<()> {
    let Some(task) = repo.get_current_task().await else {
        println!("No current task.");
        return Ok(());
    };
    if !timer::is_counting_down(Some(&task)) {
        println!(
            "{} [{}] {} left",
            task.name,
            task.status,
            timer::format_countdown(timer::planned_remaining_ms(&task))
        );
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        // Re-read so pauses from elsewhere show up
        let current = repo.get_current_task().await;
        let Some(task) = current.filter(|t| timer::is_counting_down(Some(t))) else {
            println!();
            println!("Countdown stopped.");
            break;
        };
        let remaining = timer::remaining_ms(&task, dates::now_ms());
        if follow {
            use std::io::Write;
            print!(
                "\r{} ({} min) {}  ",
                task.name,
                task.duration,
                timer::format_countdown(remaining)
            );
            std::io::stdout().flush().context("Failed to write to stdout")?;
        } else {
            println!(
                "{} ({} min) {}",
                task.name,
                task.duration,
                timer::format_countdown(remaining)
            );
        }

        if !follow || remaining == 0 {
            if follow {
                println!();
            }
            break;
        }
    }
    Ok(())
}

async fn run_history(repo: &Repository, cmd: HistoryCommand) -> Result<()> {
    match cmd {
        HistoryCommand::List { date, last } => {
            let history = match date {
                Some(date) => {
                    let day = dates::parse_date(&date)
                        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
                    repo.history_by_date(day).await
                }
                None => repo.get_task_history().await,
            };
            if history.is_empty() {
                println!("No completed tasks.");
            }
            for entry in history.iter().rev().take(last) {
                println!(
                    "{}  {:<30} planned {:>4}  actual {:>4}",
                    dates::to_rfc3339(entry.completed_at),
                    entry.task.name,
                    stats::format_minutes(u64::from(entry.task.duration)),
                    stats::format_minutes(u64::from(entry.actual_duration)),
                );
            }
        }
        HistoryCommand::Prune { days } => {
            let days = match days {
                Some(days) => days,
                None => {
                    let settings = repo.get_settings().await;
                    setting_u64(&settings, "historyRetention")
                        .and_then(|d| u32::try_from(d).ok())
                        .unwrap_or(0)
                }
            };
            let removed = repo
                .prune_history(days, dates::now_ms())
                .await
                .context("Failed to prune history")?;
            println!("Removed {} old history entries", removed);
        }
    }
    Ok(())
}

async fn run_streak(repo: &Repository, cmd: StreakCommand) -> Result<()> {
    match cmd {
        StreakCommand::Add { name } => {
            let streak = repo.add_streak(&name).await.context("Failed to add streak")?;
            print_streak(&streak);
        }
        StreakCommand::List => {
            let streaks = repo.get_streaks().await;
            if streaks.is_empty() {
                println!("No streaks.");
            }
            for streak in &streaks {
                print_streak(streak);
            }
        }
        StreakCommand::Complete { id } => match repo.complete_streak_today(&id).await {
            Ok(streak) => println!(
                "{}: {} day{}",
                streak.task_name,
                streak.current_streak,
                if streak.current_streak == 1 { "" } else { "s" }
            ),
            Err(e) => bail!("{}", e),
        },
        StreakCommand::Rename { id, name } => {
            let streak = repo
                .update_streak(
                    &id,
                    StreakPatch {
                        task_name: Some(name),
                        ..Default::default()
                    },
                )
                .await
                .with_context(|| format!("Streak '{}' not updated", id))?;
            print_streak(&streak);
        }
        StreakCommand::Delete { id } => {
            if !repo.delete_streak(&id).await {
                bail!("Streak '{}' not found", id);
            }
            println!("Deleted streak {}", id);
        }
    }
    Ok(())
}

async fn run_pending(repo: &Repository, cmd: PendingCommand) -> Result<()> {
    let set_done = |completed: bool| PendingTaskPatch {
        completed: Some(completed),
        ..Default::default()
    };

    match cmd {
        PendingCommand::Add { name } => {
            let item = repo
                .add_pending_task(&name)
                .await
                .context("Failed to add pending task")?;
            print_pending(&item);
        }
        PendingCommand::List => {
            let items = repo.get_pending_tasks().await;
            if items.is_empty() {
                println!("Nothing pending.");
            }
            for item in &items {
                print_pending(item);
            }
        }
        PendingCommand::Done { id } => {
            let item = repo
                .update_pending_task(&id, set_done(true))
                .await
                .with_context(|| format!("Pending task '{}' not updated", id))?;
            print_pending(&item);
        }
        PendingCommand::Undone { id } => {
            let item = repo
                .update_pending_task(&id, set_done(false))
                .await
                .with_context(|| format!("Pending task '{}' not updated", id))?;
            print_pending(&item);
        }
        PendingCommand::Rename { id, name } => {
            let item = repo
                .update_pending_task(
                    &id,
                    PendingTaskPatch {
                        task_name: Some(name),
                        ..Default::default()
                    },
                )
                .await
                .with_context(|| format!("Pending task '{}' not updated", id))?;
            print_pending(&item);
        }
        PendingCommand::Delete { id } => {
            if !repo.delete_pending_task(&id).await {
                bail!("Pending task '{}' not found", id);
            }
            println!("Deleted pending task {}", id);
        }
    }
    Ok(())
}

async fn run_settings(repo: &Repository, cmd: SettingsCommand) -> Result<()> {
    match cmd {
        SettingsCommand::Show => print_settings(&repo.get_settings().await),
        SettingsCommand::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let mut updates = Settings::new();
            updates.insert(key, value);
            let settings = repo
                .update_settings(updates)
                .await
                .context("Error saving settings")?;
            print_settings(&settings);
        }
        SettingsCommand::Reset => {
            if !repo.reset_settings().await {
                bail!("Error resetting settings");
            }
            println!("Settings reset to defaults");
        }
    }
    Ok(())
}

async fn default_duration(repo: &Repository) -> u32 {
    let settings = repo.get_settings().await;
    setting_u64(&settings, "defaultDuration")
        .and_then(|d| u32::try_from(d).ok())
        .unwrap_or(30)
}

fn validate_date(text: &str) -> Result<String> {
    let date = dates::parse_date(text)
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", text))?;
    Ok(dates::format_date(date))
}

fn print_task(task: &Task) {
    let start = task.start_time.as_deref().unwrap_or("--:--");
    println!(
        "  {}  {}  {:<9} {:>6}  {}  {}",
        task.id,
        task.scheduled_date,
        task.status.to_string(),
        stats::format_minutes(u64::from(task.duration)),
        start,
        task.name
    );
}

fn print_streak(streak: &Streak) {
    println!(
        "  {}  {:>3}  last {}  {}",
        streak.id,
        streak.current_streak,
        streak.last_completed_date.as_deref().unwrap_or("never"),
        streak.task_name
    );
}

fn print_pending(item: &PendingTask) {
    let mark = if item.completed { "x" } else { " " };
    println!("  {}  [{}] {}", item.id, mark, item.task_name);
}

fn print_settings(settings: &Settings) {
    for (key, value) in settings {
        println!("  {:<20} {}", key, value);
    }
}
