//! CLI command definitions for tasknest
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use crate::activity::TimeScope;
use crate::types::{CompletionFilter, StatsFilter, TaskFilter, TaskId};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};

/// Personal task hierarchy engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Owning user id
    #[arg(short, long, default_value_t = 1, global = true)]
    pub user: i64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a task, optionally under a parent
    Add(AddArgs),

    /// Show a task with its full subtask tree
    Show { id: TaskId },

    /// List root tasks with their trees
    Roots {
        /// Only trees whose root was created on this day
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },

    /// Edit task fields
    Update(UpdateArgs),

    /// Flip a task's completion flag
    Toggle { id: TaskId },

    /// Re-parent a task together with its subtree
    Move {
        id: TaskId,

        /// New parent task
        #[arg(long, conflicts_with = "root")]
        parent: Option<TaskId>,

        /// Detach the task and make it a root
        #[arg(long)]
        root: bool,
    },

    /// Delete a task and its whole subtree
    Delete { id: TaskId },

    /// Manage dependency edges
    #[command(subcommand)]
    Dep(DepCommand),

    /// List tasks waiting on an incomplete prerequisite
    Blocked,

    /// Per-day statistics for a date range
    Stats(RangeArgs),

    /// Per-day statistics for the week containing a date
    Week {
        #[arg(long, value_name = "YYYY-MM-DD")]
        anchor: Option<NaiveDate>,

        #[command(flatten)]
        filter: StatsFilterArgs,
    },

    /// Per-day statistics for a calendar month
    Month {
        year: i32,
        month: u32,

        #[command(flatten)]
        filter: StatsFilterArgs,
    },

    /// Range statistics folded by weekday
    Weekdays(RangeArgs),

    /// Totals for a date range
    Summary(RangeArgs),

    /// Search root tasks
    Search(SearchArgs),

    /// Manage categories
    #[command(subcommand)]
    Category(CategoryCommand),

    /// Manage priority levels
    #[command(subcommand)]
    Priority(PriorityCommand),

    /// Compare the closure table against parent pointers
    Check,

    /// Recompute the closure table from parent pointers
    Rebuild,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    pub name: String,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub parent: Option<TaskId>,

    #[arg(long)]
    pub category: Option<i64>,

    #[arg(long)]
    pub priority: Option<String>,

    /// Creation day (default: today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub created: Option<NaiveDate>,

    /// Deadline as a date or date-time
    #[arg(long, value_parser = parse_deadline)]
    pub deadline: Option<NaiveDateTime>,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    pub id: TaskId,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long)]
    pub category: Option<i64>,

    #[arg(long, value_parser = parse_deadline)]
    pub deadline: Option<NaiveDateTime>,

    /// Remove the deadline
    #[arg(long, conflicts_with = "deadline")]
    pub clear_deadline: bool,

    /// Move the task under this parent
    #[arg(long, conflicts_with = "root")]
    pub parent: Option<TaskId>,

    /// Move the task to the top level
    #[arg(long)]
    pub root: bool,

    #[arg(long)]
    pub color: Option<String>,

    #[arg(long)]
    pub shape: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum DepCommand {
    /// Make SOURCE a prerequisite of TARGET
    Add { source: TaskId, target: TaskId },

    /// Remove a dependency edge by id
    Remove { edge: i64 },

    /// List edges, for one task or for the whole user
    List {
        #[arg(long)]
        task: Option<TaskId>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CategoryCommand {
    Add {
        name: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        icon: Option<String>,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum PriorityCommand {
    /// Create or recolor a priority level
    Set { level: String, color: String },
    List,
}

/// Category and priority narrowing shared by the statistics commands.
#[derive(Args, Debug, Default)]
pub struct StatsFilterArgs {
    /// Comma-separated category ids
    #[arg(long = "category", value_delimiter = ',')]
    pub categories: Vec<i64>,

    /// Comma-separated priority levels
    #[arg(long = "priority", value_delimiter = ',')]
    pub priorities: Vec<String>,
}

impl StatsFilterArgs {
    pub fn to_filter(&self) -> StatsFilter {
        StatsFilter {
            category_ids: self.categories.clone(),
            priority_levels: self.priorities.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: NaiveDate,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end: NaiveDate,

    /// Evaluate undated tasks as if this were today
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub today: Option<NaiveDate>,

    #[command(flatten)]
    pub filter: StatsFilterArgs,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text matched against names, descriptions and category names
    #[arg(short, long)]
    pub query: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub start: Option<NaiveDate>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub end: Option<NaiveDate>,

    /// daily, weekly, monthly or yearly window around --anchor (overrides --start/--end)
    #[arg(long)]
    pub scope: Option<TimeScope>,

    #[arg(long, value_name = "YYYY-MM-DD")]
    pub anchor: Option<NaiveDate>,

    #[command(flatten)]
    pub filter: StatsFilterArgs,

    #[arg(long, value_parser = parse_deadline)]
    pub deadline_before: Option<NaiveDateTime>,

    #[arg(long, value_parser = parse_deadline)]
    pub deadline_after: Option<NaiveDateTime>,

    /// all, completed or incomplete
    #[arg(long, default_value = "all")]
    pub status: CompletionFilter,
}

impl SearchArgs {
    pub fn to_filter(&self) -> TaskFilter {
        TaskFilter {
            start: self.start,
            end: self.end,
            query: self.query.clone(),
            category_ids: self.filter.categories.clone(),
            priority_levels: self.filter.priorities.clone(),
            deadline_before: self.deadline_before,
            deadline_after: self.deadline_after,
            completion: self.status,
        }
    }
}

/// Accept `YYYY-MM-DD` (end of day) or `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_deadline(value: &str) -> Result<NaiveDateTime, String> {
    if let Ok(datetime) = value.parse::<NaiveDateTime>() {
        return Ok(datetime);
    }
    value
        .parse::<NaiveDate>()
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .ok_or_else(|| format!("invalid deadline '{}': expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS", value))
}
