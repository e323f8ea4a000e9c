//! Task rows: validation, reads, and in-place field edits.
//!
//! Parentage is not managed here. Creating, moving and deleting tasks goes
//! through [`super::hierarchy`], which keeps the closure table in step.

use super::{hierarchy, lookups, now_local, tree, Database};
use crate::error::{Result, TaskError};
use crate::notify::{ChangeKind, ChangeNotice};
use crate::types::{
    CanvasPosition, CompletionToggle, NewTask, Task, TaskId, TaskTree, TaskUpdate, UserId,
    DEFAULT_CANVAS_SHAPE, MAX_TASK_NAME_LEN,
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::debug;

pub fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let position_x: Option<f64> = row.get("position_x")?;
    let position_y: Option<f64> = row.get("position_y")?;

    Ok(Task {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        completed: row.get("completed")?,
        completed_date: row.get("completed_date")?,
        priority: row.get("priority")?,
        category_id: row.get("category_id")?,
        parent_id: row.get("parent_id")?,
        creation_date: row.get("creation_date")?,
        deadline: row.get("deadline")?,
        position: match (position_x, position_y) {
            (Some(x), Some(y)) => Some(CanvasPosition { x, y }),
            _ => None,
        },
        canvas_color: row.get("canvas_color")?,
        canvas_shape: row.get("canvas_shape")?,
    })
}

/// Fetch a task owned by `user_id`.
pub fn find_task(conn: &Connection, user_id: UserId, task_id: TaskId) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            "SELECT * FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
            parse_task_row,
        )
        .optional()?;
    Ok(task)
}

/// Fetch a task owned by `user_id`, or fail with `NotFound`.
pub fn require_task(conn: &Connection, user_id: UserId, task_id: TaskId) -> Result<Task> {
    find_task(conn, user_id, task_id)?.ok_or_else(|| TaskError::task_not_found(task_id))
}

/// Reject malformed ids before they reach the store.
pub fn validate_id(field: &str, id: i64) -> Result<()> {
    if id < 0 {
        return Err(TaskError::InvalidArgument(format!(
            "{} cannot be negative: {}",
            field, id
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TaskError::InvalidArgument("task name is required".into()));
    }
    if name.chars().count() > MAX_TASK_NAME_LEN {
        return Err(TaskError::InvalidArgument(format!(
            "task name exceeds {} characters",
            MAX_TASK_NAME_LEN
        )));
    }
    Ok(())
}

/// Validate everything about a new task except its parent, which the
/// hierarchy checks for ownership.
pub fn validate_new_task(conn: &Connection, user_id: UserId, input: &NewTask) -> Result<()> {
    validate_name(&input.name)?;
    if let Some(parent_id) = input.parent_id {
        validate_id("parent_id", parent_id)?;
    }
    if let Some(category_id) = input.category_id {
        validate_id("category_id", category_id)?;
        if !lookups::category_owned(conn, user_id, category_id)? {
            return Err(TaskError::NotFound(format!("category {}", category_id)));
        }
    }
    Ok(())
}

fn today_midnight() -> NaiveDateTime {
    now_local().date().and_time(chrono::NaiveTime::MIN)
}

/// Insert the task row only. Callers add the closure rows in the same transaction.
pub fn insert_task_row(conn: &Connection, user_id: UserId, input: &NewTask) -> Result<Task> {
    let creation_date = input.creation_date.unwrap_or_else(today_midnight);
    let shape = input
        .canvas_shape
        .clone()
        .unwrap_or_else(|| DEFAULT_CANVAS_SHAPE.to_string());

    conn.execute(
        "INSERT INTO tasks (
            user_id, name, description, completed, priority, category_id, parent_id,
            creation_date, deadline, position_x, position_y, canvas_color, canvas_shape
        ) VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            user_id,
            input.name.trim(),
            input.description,
            input.priority,
            input.category_id,
            input.parent_id,
            creation_date,
            input.deadline,
            input.position.map(|p| p.x),
            input.position.map(|p| p.y),
            input.canvas_color,
            shape,
        ],
    )?;

    let id = conn.last_insert_rowid();
    require_task(conn, user_id, id)
}

fn datetime_value(value: Option<NaiveDateTime>) -> Value {
    match value {
        Some(dt) => Value::Text(dt.format("%F %T%.f").to_string()),
        None => Value::Null,
    }
}

fn text_value(value: Option<String>) -> Value {
    value.map(Value::Text).unwrap_or(Value::Null)
}

/// Apply field edits (everything except parentage) to one task.
pub fn update_fields(
    conn: &Connection,
    user_id: UserId,
    task_id: TaskId,
    update: &TaskUpdate,
) -> Result<Task> {
    let current = require_task(conn, user_id, task_id)?;

    let mut sets: Vec<&'static str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(ref name) = update.name {
        validate_name(name)?;
        sets.push("name = ?");
        values.push(Value::Text(name.trim().to_string()));
    }
    if let Some(ref description) = update.description {
        sets.push("description = ?");
        values.push(text_value(description.clone()));
    }
    if let Some(ref priority) = update.priority {
        sets.push("priority = ?");
        values.push(text_value(priority.clone()));
    }
    if let Some(category_id) = update.category_id {
        if let Some(cid) = category_id {
            validate_id("category_id", cid)?;
            if !lookups::category_owned(conn, user_id, cid)? {
                return Err(TaskError::NotFound(format!("category {}", cid)));
            }
        }
        sets.push("category_id = ?");
        values.push(category_id.map(Value::Integer).unwrap_or(Value::Null));
    }
    if let Some(deadline) = update.deadline {
        sets.push("deadline = ?");
        values.push(datetime_value(deadline));
    }
    if let Some(position) = update.position {
        sets.push("position_x = ?");
        values.push(position.map(|p| Value::Real(p.x)).unwrap_or(Value::Null));
        sets.push("position_y = ?");
        values.push(position.map(|p| Value::Real(p.y)).unwrap_or(Value::Null));
    }
    if let Some(ref color) = update.canvas_color {
        sets.push("canvas_color = ?");
        values.push(text_value(color.clone()));
    }
    if let Some(ref shape) = update.canvas_shape {
        sets.push("canvas_shape = ?");
        values.push(text_value(shape.clone()));
    }
    if let Some(completed) = update.completed {
        if completed != current.completed {
            sets.push("completed = ?");
            values.push(Value::Integer(completed as i64));
            sets.push("completed_date = ?");
            values.push(datetime_value(completed.then(now_local)));
        }
    }

    if sets.is_empty() {
        return Ok(current);
    }

    let sql = format!(
        "UPDATE tasks SET {} WHERE id = ? AND user_id = ?",
        sets.join(", ")
    );
    values.push(Value::Integer(task_id));
    values.push(Value::Integer(user_id));
    conn.execute(&sql, params_from_iter(values))?;

    debug!(task_id, fields = sets.len(), "task fields updated");
    require_task(conn, user_id, task_id)
}

/// Flip a task's completion flag, stamping or clearing `completed_date`.
pub fn toggle_completion(
    conn: &Connection,
    user_id: UserId,
    task_id: TaskId,
) -> Result<CompletionToggle> {
    let task = require_task(conn, user_id, task_id)?;
    let completed = !task.completed;
    let completed_date = completed.then(now_local);

    conn.execute(
        "UPDATE tasks SET completed = ?1, completed_date = ?2 WHERE id = ?3 AND user_id = ?4",
        params![completed, completed_date, task_id, user_id],
    )?;

    Ok(CompletionToggle {
        id: task_id,
        completed,
    })
}

/// All top-level tasks of a user, oldest first.
pub fn root_tasks(conn: &Connection, user_id: UserId) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE user_id = ?1 AND parent_id IS NULL
         ORDER BY creation_date, id",
    )?;
    let tasks = stmt
        .query_map(params![user_id], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Tasks (at any level) whose creation date falls on `date`.
pub fn tasks_created_on(conn: &Connection, user_id: UserId, date: NaiveDate) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tasks WHERE user_id = ?1 AND date(creation_date) = ?2
         ORDER BY id",
    )?;
    let tasks = stmt
        .query_map(params![user_id, date], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Every task of a user.
pub fn user_tasks(conn: &Connection, user_id: UserId) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE user_id = ?1 ORDER BY id")?;
    let tasks = stmt
        .query_map(params![user_id], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

impl Database {
    /// Get a task by id.
    pub fn get_task(&self, user_id: UserId, task_id: TaskId) -> Result<Option<Task>> {
        self.with_conn(|conn| find_task(conn, user_id, task_id))
    }

    /// Get all root tasks for a user.
    pub fn get_root_tasks(&self, user_id: UserId) -> Result<Vec<Task>> {
        self.with_conn(|conn| root_tasks(conn, user_id))
    }

    /// Get root tasks created on `date`, each with its subtask tree.
    pub fn get_trees_created_on(&self, user_id: UserId, date: NaiveDate) -> Result<Vec<TaskTree>> {
        self.with_conn(|conn| {
            let mut trees = Vec::new();
            for task in tasks_created_on(conn, user_id, date)? {
                if !task.is_root() {
                    continue;
                }
                if let Some(tree) = tree::task_with_subtasks(conn, user_id, task.id)? {
                    trees.push(tree);
                }
            }
            Ok(trees)
        })
    }

    /// Edit a task in place. A `parent_id` change is applied first as a
    /// subtree move; both happen in the same transaction.
    pub fn update_task(
        &self,
        user_id: UserId,
        task_id: TaskId,
        update: TaskUpdate,
    ) -> Result<TaskTree> {
        let tree = self.transaction(|tx| {
            if let Some(new_parent) = update.parent_id {
                hierarchy::move_subtask(tx, user_id, task_id, new_parent)?;
            }
            update_fields(tx, user_id, task_id, &update)?;
            tree::task_with_subtasks(tx, user_id, task_id)?
                .ok_or_else(|| TaskError::task_not_found(task_id))
        })?;

        self.publish(ChangeNotice::new(ChangeKind::TaskUpdated, user_id).snapshot(tree.clone()));
        Ok(tree)
    }

    /// Flip the completion flag of a task.
    pub fn toggle_task_completion(
        &self,
        user_id: UserId,
        task_id: TaskId,
    ) -> Result<CompletionToggle> {
        let (toggle, date) = self.transaction(|tx| {
            let toggle = toggle_completion(tx, user_id, task_id)?;
            let task = require_task(tx, user_id, task_id)?;
            Ok((toggle, task.creation_day()))
        })?;

        self.publish(
            ChangeNotice::new(ChangeKind::TaskCompleted, user_id)
                .task(task_id)
                .completed(toggle.completed)
                .on_date(date),
        );
        Ok(toggle)
    }
}
