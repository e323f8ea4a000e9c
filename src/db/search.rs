//! Root-task search with text, lookup, deadline and completion filters.
//!
//! Text matches anywhere in a tree surface the tree's root: the root is found
//! through the closure table rather than by walking parent pointers.

use super::stats::direct_subtask_counts;
use super::tasks::root_tasks;
use super::{tree, Database};
use crate::activity::TimeScope;
use crate::error::Result;
use crate::types::{CompletionFilter, Task, TaskFilter, TaskId, TaskTree, UserId};
use chrono::NaiveDate;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};

/// Register `fold_case(text)`, a Unicode lowercase. SQLite's own `lower()`
/// and `LIKE` only fold ASCII.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
}

/// Escape LIKE wildcards so user text matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Roots of every tree holding a task whose name, description or category
/// name contains `query` (case-insensitive).
pub fn roots_matching_text(conn: &Connection, user_id: UserId, query: &str) -> Result<HashSet<TaskId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT h.ancestor
         FROM tasks t
         LEFT JOIN categories c ON c.id = t.category_id
         JOIN task_hierarchy h ON h.descendant = t.id
         JOIN tasks r ON r.id = h.ancestor AND r.parent_id IS NULL
         WHERE t.user_id = ?1
           AND (fold_case(t.name) LIKE ?2 ESCAPE '\\'
                OR fold_case(COALESCE(t.description, '')) LIKE ?2 ESCAPE '\\'
                OR fold_case(COALESCE(c.name, '')) LIKE ?2 ESCAPE '\\')",
    )?;
    let ids = stmt
        .query_map(params![user_id, like_pattern(query)], |row| row.get::<_, TaskId>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;
    Ok(ids)
}

fn in_date_range(task: &Task, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    let day = task.creation_date.date();
    start.is_none_or(|s| day >= s) && end.is_none_or(|e| day <= e)
}

fn passes_lookups(task: &Task, filter: &TaskFilter) -> bool {
    let category_ok = filter.category_ids.is_empty()
        || task
            .category_id
            .is_some_and(|c| filter.category_ids.contains(&c));
    let priority_ok = filter.priority_levels.is_empty()
        || task
            .priority
            .as_ref()
            .is_some_and(|p| filter.priority_levels.contains(p));
    let before_ok = filter
        .deadline_before
        .is_none_or(|limit| task.deadline.is_some_and(|d| d <= limit));
    let after_ok = filter
        .deadline_after
        .is_none_or(|limit| task.deadline.is_some_and(|d| d >= limit));
    category_ok && priority_ok && before_ok && after_ok
}

fn passes_completion(task: &Task, mode: CompletionFilter, counts: &HashMap<TaskId, (u32, u32)>) -> bool {
    let (subtasks, done) = counts.get(&task.id).copied().unwrap_or((0, 0));
    match mode {
        CompletionFilter::All => true,
        CompletionFilter::Completed => task.completed || done > 0,
        CompletionFilter::Incomplete => !task.completed || done < subtasks,
    }
}

/// Root tasks matching every filter, each with its subtask tree.
pub fn search_tasks(conn: &Connection, user_id: UserId, filter: &TaskFilter) -> Result<Vec<TaskTree>> {
    let counts = direct_subtask_counts(conn, user_id)?;
    let text_roots = match filter.query.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => Some(roots_matching_text(conn, user_id, query)?),
        _ => None,
    };

    let mut trees = Vec::new();
    for root in root_tasks(conn, user_id)? {
        if !in_date_range(&root, filter.start, filter.end)
            || !passes_lookups(&root, filter)
            || !passes_completion(&root, filter.completion, &counts)
        {
            continue;
        }
        if text_roots.as_ref().is_some_and(|ids| !ids.contains(&root.id)) {
            continue;
        }
        if let Some(tree) = tree::task_with_subtasks(conn, user_id, root.id)? {
            trees.push(tree);
        }
    }
    Ok(trees)
}

impl Database {
    /// Search root tasks.
    pub fn search_tasks(&self, user_id: UserId, filter: &TaskFilter) -> Result<Vec<TaskTree>> {
        self.with_conn(|conn| search_tasks(conn, user_id, filter))
    }

    /// Search root tasks created within `scope` around `anchor`.
    pub fn search_in_scope(
        &self,
        user_id: UserId,
        scope: TimeScope,
        anchor: NaiveDate,
        filter: &TaskFilter,
    ) -> Result<Vec<TaskTree>> {
        let (start, end) = scope.range(anchor);
        let filter = TaskFilter {
            start: Some(start),
            end: Some(end),
            ..filter.clone()
        };
        self.search_tasks(user_id, &filter)
    }
}
