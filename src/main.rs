//! tasknest
//!
//! Command-line front end for the task hierarchy engine. Every command prints
//! its result as pretty JSON on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tasknest::cli::{
    CategoryCommand, Cli, Command, DepCommand, PriorityCommand, RangeArgs, UpdateArgs,
};
use tasknest::config::Config;
use tasknest::db::{Database, local_today};
use tasknest::logging::{self, LogTarget};
use tasknest::notify::MemorySink;
use tasknest::types::{NewTask, TaskUpdate, UserId};
use tracing::{debug, info};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init(&LogTarget::parse(&cli.log), cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load(path)?;
            config.apply_env();
            config
        }
        None => Config::load_or_default(),
    };

    // Override paths from CLI arguments
    if let Some(db_path) = &cli.database {
        config.store.db_path = db_path.into();
    }
    config.ensure_db_dir()?;

    let sink = Arc::new(MemorySink::new());
    let db = Database::open_with(&config)
        .with_context(|| format!("opening {}", config.store.db_path.display()))?
        .with_sink(sink.clone());
    debug!(db = %config.store.db_path.display(), user = cli.user, "database ready");

    run(&db, cli.user, cli.command)?;

    for notice in sink.drain() {
        info!(event = notice.kind.event_name(), room = %notice.room(), task = ?notice.task_id, "change");
    }
    Ok(())
}

fn run(db: &Database, user: UserId, command: Command) -> Result<()> {
    match command {
        Command::Add(args) => {
            let input = NewTask {
                name: args.name,
                description: args.description,
                parent_id: args.parent,
                category_id: args.category,
                priority: args.priority,
                creation_date: args.created.and_then(|d| d.and_hms_opt(0, 0, 0)),
                deadline: args.deadline,
                ..Default::default()
            };
            print_json(&db.add_task(user, input)?)
        }
        Command::Show { id } => print_json(&db.get_task_with_subtasks(user, id)?),
        Command::Roots { date } => match date {
            Some(date) => print_json(&db.get_trees_created_on(user, date)?),
            None => print_json(&db.get_forest(user)?),
        },
        Command::Update(args) => run_update(db, user, args),
        Command::Toggle { id } => print_json(&db.toggle_task_completion(user, id)?),
        Command::Move { id, parent, root } => {
            let parent = if root { None } else { parent };
            print_json(&db.try_move_subtask(user, id, parent)?)
        }
        Command::Delete { id } => print_json(&json!({ "deleted": db.try_delete_task(user, id)? })),
        Command::Dep(dep) => match dep {
            DepCommand::Add { source, target } => print_json(&db.add_dependency(user, source, target)?),
            DepCommand::Remove { edge } => {
                db.remove_dependency(user, edge)?;
                print_json(&json!({ "removed": edge }))
            }
            DepCommand::List { task: Some(task) } => print_json(&db.get_task_dependencies(user, task)?),
            DepCommand::List { task: None } => print_json(&db.get_user_dependencies(user)?),
        },
        Command::Blocked => print_json(&db.get_blocked_tasks(user)?),
        Command::Stats(range) => run_stats(db, user, range),
        Command::Week { anchor, filter } => {
            let anchor = anchor.unwrap_or_else(local_today);
            print_json(&db.week_stats(user, anchor, &filter.to_filter())?)
        }
        Command::Month { year, month, filter } => {
            print_json(&db.month_stats(user, year, month, &filter.to_filter())?)
        }
        Command::Weekdays(range) => {
            print_json(&db.weekly_distribution(user, range.start, range.end, &range.filter.to_filter())?)
        }
        Command::Summary(range) => {
            print_json(&db.range_summary(user, range.start, range.end, &range.filter.to_filter())?)
        }
        Command::Search(args) => {
            let filter = args.to_filter();
            match args.scope {
                Some(scope) => {
                    let anchor = args.anchor.unwrap_or_else(local_today);
                    print_json(&db.search_in_scope(user, scope, anchor, &filter)?)
                }
                None => print_json(&db.search_tasks(user, &filter)?),
            }
        }
        Command::Category(category) => match category {
            CategoryCommand::Add { name, description, icon } => print_json(&db.create_category(
                user,
                &name,
                description.as_deref(),
                icon.as_deref(),
            )?),
            CategoryCommand::List => print_json(&db.list_categories(user)?),
        },
        Command::Priority(priority) => match priority {
            PriorityCommand::Set { level, color } => print_json(&db.set_priority(user, &level, &color)?),
            PriorityCommand::List => print_json(&db.list_priorities(user)?),
        },
        Command::Check => print_json(&db.check_hierarchy(user)?),
        Command::Rebuild => print_json(&json!({ "closure_rows": db.rebuild_hierarchy(user)? })),
    }
}

fn run_update(db: &Database, user: UserId, args: UpdateArgs) -> Result<()> {
    let parent_id = match (args.root, args.parent) {
        (true, _) => Some(None),
        (false, Some(parent)) => Some(Some(parent)),
        (false, None) => None,
    };
    let deadline = if args.clear_deadline {
        Some(None)
    } else {
        args.deadline.map(Some)
    };

    let update = TaskUpdate {
        name: args.name,
        description: args.description.map(Some),
        priority: args.priority.map(Some),
        category_id: args.category.map(Some),
        deadline,
        parent_id,
        canvas_color: args.color.map(Some),
        canvas_shape: args.shape.map(Some),
        ..Default::default()
    };
    print_json(&db.update_task(user, args.id, update)?)
}

fn run_stats(db: &Database, user: UserId, range: RangeArgs) -> Result<()> {
    let filter = range.filter.to_filter();
    let days = match range.today {
        Some(today) => db.daily_stats_as_of(user, range.start, range.end, &filter, today)?,
        None => db.daily_stats(user, range.start, range.end, &filter)?,
    };
    print_json(&days)
}
