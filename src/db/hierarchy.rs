//! Closure-table maintenance for the task tree.
//!
//! `task_hierarchy` holds one `(ancestor, descendant, depth)` row for every
//! ancestor of every task, the task itself included at depth 0. All subtree
//! and ancestor questions are answered from it; `tasks.parent_id` is written
//! alongside but never walked here.

use super::{deps, tasks, tree, Database};
use crate::error::{Result, TaskError};
use crate::notify::{ChangeKind, ChangeNotice};
use crate::types::{HierarchyEdge, HierarchyReport, NewTask, Task, TaskId, TaskTree, UserId};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What a cascading delete removed.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedSubtree {
    pub root: Task,
    /// Removed task ids, deepest first.
    pub removed: Vec<TaskId>,
    pub closure_rows: usize,
    pub dependency_rows: usize,
}

fn parse_edge(row: &rusqlite::Row) -> rusqlite::Result<HierarchyEdge> {
    Ok(HierarchyEdge {
        ancestor: row.get(0)?,
        descendant: row.get(1)?,
        depth: row.get(2)?,
    })
}

/// Insert the closure rows of a freshly inserted task: its own self-row plus
/// a copy of the parent's ancestor chain at depth + 1.
pub fn insert_closure(conn: &Connection, task_id: TaskId, parent_id: Option<TaskId>) -> Result<usize> {
    let inserted = match parent_id {
        Some(pid) => conn.execute(
            "INSERT INTO task_hierarchy (ancestor, descendant, depth)
             SELECT ancestor, ?1, depth + 1 FROM task_hierarchy WHERE descendant = ?2
             UNION ALL
             SELECT ?1, ?1, 0",
            params![task_id, pid],
        )?,
        None => conn.execute(
            "INSERT INTO task_hierarchy (ancestor, descendant, depth) VALUES (?1, ?1, 0)",
            params![task_id],
        )?,
    };
    Ok(inserted)
}

/// Create a task under `input.parent_id` (or as a root) with its closure rows.
pub fn add_task(conn: &Connection, user_id: UserId, input: &NewTask) -> Result<Task> {
    tasks::validate_new_task(conn, user_id, input)?;
    if let Some(parent_id) = input.parent_id {
        tasks::require_task(conn, user_id, parent_id)?;
    }

    let task = tasks::insert_task_row(conn, user_id, input)?;
    let rows = insert_closure(conn, task.id, task.parent_id)?;

    debug!(task_id = task.id, parent_id = ?task.parent_id, closure_rows = rows, "task created");
    Ok(task)
}

/// True when `descendant` sits strictly below `ancestor`.
pub fn is_descendant(conn: &Connection, ancestor: TaskId, descendant: TaskId) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM task_hierarchy WHERE ancestor = ?1 AND descendant = ?2 AND depth > 0",
            params![ancestor, descendant],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Closure rows of the subtree rooted at `root`, root first, by depth.
pub fn subtree_edges(conn: &Connection, root: TaskId) -> Result<Vec<HierarchyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT ancestor, descendant, depth FROM task_hierarchy
         WHERE ancestor = ?1 ORDER BY depth, descendant",
    )?;
    let edges = stmt
        .query_map(params![root], parse_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Closure rows naming the ancestors of `task`, the task itself first.
pub fn ancestor_edges(conn: &Connection, task: TaskId) -> Result<Vec<HierarchyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT ancestor, descendant, depth FROM task_hierarchy
         WHERE descendant = ?1 ORDER BY depth",
    )?;
    let edges = stmt
        .query_map(params![task], parse_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Every closure row touching a task of `user_id`.
pub fn user_edges(conn: &Connection, user_id: UserId) -> Result<Vec<HierarchyEdge>> {
    let mut stmt = conn.prepare(
        "SELECT h.ancestor, h.descendant, h.depth FROM task_hierarchy h
         WHERE h.descendant IN (SELECT id FROM tasks WHERE user_id = ?1)
            OR h.ancestor IN (SELECT id FROM tasks WHERE user_id = ?1)
         ORDER BY h.ancestor, h.depth, h.descendant",
    )?;
    let edges = stmt
        .query_map(params![user_id], parse_edge)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Remove a task and its whole subtree, including every closure row and
/// dependency edge that references a removed task. Returns `None` when the
/// task does not exist or is not owned by `user_id`.
pub fn delete_task(conn: &Connection, user_id: UserId, task_id: TaskId) -> Result<Option<DeletedSubtree>> {
    let Some(root) = tasks::find_task(conn, user_id, task_id)? else {
        return Ok(None);
    };

    // Deepest first, so parent_id references never dangle mid-delete
    let mut stmt = conn.prepare(
        "SELECT descendant FROM task_hierarchy WHERE ancestor = ?1
         ORDER BY depth DESC, descendant",
    )?;
    let mut removed = stmt
        .query_map(params![task_id], |row| row.get::<_, TaskId>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if !removed.contains(&task_id) {
        // Missing self-row; still delete the task itself
        removed.push(task_id);
    }

    let mut closure_rows = 0;
    {
        let mut delete_edges = conn.prepare_cached(
            "DELETE FROM task_hierarchy WHERE ancestor = ?1 OR descendant = ?1",
        )?;
        for id in &removed {
            closure_rows += delete_edges.execute(params![id])?;
        }
    }

    let dependency_rows = deps::delete_for_tasks(conn, &removed)?;

    {
        let mut delete_row =
            conn.prepare_cached("DELETE FROM tasks WHERE id = ?1 AND user_id = ?2")?;
        for id in &removed {
            delete_row.execute(params![id, user_id])?;
        }
    }

    info!(
        task_id,
        tasks = removed.len(),
        closure_rows,
        dependency_rows,
        "task subtree deleted"
    );
    Ok(Some(DeletedSubtree {
        root,
        removed,
        closure_rows,
        dependency_rows,
    }))
}

/// Re-parent `task_id` (and its whole subtree) under `new_parent`, or make it
/// a root when `new_parent` is `None`.
///
/// Every rejection happens before the first write. The subtree's internal
/// rows are kept; only rows linking it to its old ancestors are replaced.
pub fn move_subtask(
    conn: &Connection,
    user_id: UserId,
    task_id: TaskId,
    new_parent: Option<TaskId>,
) -> Result<()> {
    tasks::validate_id("task_id", task_id)?;
    tasks::require_task(conn, user_id, task_id)?;

    if let Some(parent_id) = new_parent {
        tasks::validate_id("parent_id", parent_id)?;
        if parent_id == task_id {
            return Err(TaskError::InvalidArgument(format!(
                "task {} cannot be its own parent",
                task_id
            )));
        }
        tasks::require_task(conn, user_id, parent_id)?;
        if is_descendant(conn, task_id, parent_id)? {
            return Err(TaskError::Cycle(format!(
                "task {} is a descendant of task {}",
                parent_id, task_id
            )));
        }
    }

    // Sever the subtree from every ancestor outside it
    let severed = conn.execute(
        "DELETE FROM task_hierarchy
         WHERE descendant IN (SELECT descendant FROM task_hierarchy WHERE ancestor = ?1)
           AND ancestor NOT IN (SELECT descendant FROM task_hierarchy WHERE ancestor = ?1)",
        params![task_id],
    )?;

    // Graft: each ancestor of the new parent gains each subtree member at
    // depth(ancestor -> parent) + depth(task -> member) + 1
    let grafted = match new_parent {
        Some(parent_id) => conn.execute(
            "INSERT INTO task_hierarchy (ancestor, descendant, depth)
             SELECT p.ancestor, s.descendant, p.depth + s.depth + 1
             FROM task_hierarchy p
             CROSS JOIN task_hierarchy s
             WHERE p.descendant = ?1 AND s.ancestor = ?2
             ON CONFLICT (ancestor, descendant) DO UPDATE SET depth = excluded.depth",
            params![parent_id, task_id],
        )?,
        None => 0,
    };

    conn.execute(
        "UPDATE tasks SET parent_id = ?1 WHERE id = ?2 AND user_id = ?3",
        params![new_parent, task_id, user_id],
    )?;

    info!(task_id, new_parent = ?new_parent, severed, grafted, "subtree moved");
    Ok(())
}

/// Expected closure rows for a user's tasks, derived from parent pointers.
/// Tasks whose chain loops or leaves the user's task set are returned apart
/// and contribute only their self-row.
fn expected_edges(tasks: &[Task]) -> (Vec<HierarchyEdge>, Vec<TaskId>) {
    let parents: HashMap<TaskId, Option<TaskId>> =
        tasks.iter().map(|t| (t.id, t.parent_id)).collect();

    let mut edges = Vec::new();
    let mut broken = Vec::new();

    for task in tasks {
        let mut chain = Vec::new();
        let mut seen = HashSet::from([task.id]);
        let mut current = task.parent_id;
        let mut ok = true;

        while let Some(ancestor) = current {
            if !seen.insert(ancestor) {
                ok = false;
                break;
            }
            match parents.get(&ancestor) {
                Some(next) => {
                    chain.push(ancestor);
                    current = *next;
                }
                None => {
                    ok = false;
                    break;
                }
            }
        }

        edges.push(HierarchyEdge {
            ancestor: task.id,
            descendant: task.id,
            depth: 0,
        });
        if ok {
            for (i, ancestor) in chain.into_iter().enumerate() {
                edges.push(HierarchyEdge {
                    ancestor,
                    descendant: task.id,
                    depth: i as i64 + 1,
                });
            }
        } else {
            broken.push(task.id);
        }
    }

    (edges, broken)
}

/// Compare the closure table with what the parent pointers imply.
pub fn check_hierarchy(conn: &Connection, user_id: UserId) -> Result<HierarchyReport> {
    let tasks = tasks::user_tasks(conn, user_id)?;
    let (expected, broken_parents) = expected_edges(&tasks);

    let actual: HashMap<(TaskId, TaskId), i64> = user_edges(conn, user_id)?
        .into_iter()
        .map(|e| ((e.ancestor, e.descendant), e.depth))
        .collect();
    let expected_map: HashMap<(TaskId, TaskId), i64> = expected
        .iter()
        .map(|e| ((e.ancestor, e.descendant), e.depth))
        .collect();

    let mut report = HierarchyReport {
        tasks_checked: tasks.len(),
        broken_parents,
        ..Default::default()
    };

    for edge in &expected {
        match actual.get(&(edge.ancestor, edge.descendant)) {
            None => report.missing.push(*edge),
            Some(depth) if *depth != edge.depth => report.wrong_depth.push(*edge),
            Some(_) => {}
        }
    }
    for (&(ancestor, descendant), &depth) in &actual {
        if !expected_map.contains_key(&(ancestor, descendant)) {
            report.stale.push(HierarchyEdge {
                ancestor,
                descendant,
                depth,
            });
        }
    }
    report.stale.sort();
    report.missing.sort();
    report.wrong_depth.sort();

    Ok(report)
}

/// Rewrite a user's closure rows from parent pointers. Returns rows inserted.
pub fn rebuild_hierarchy(conn: &Connection, user_id: UserId) -> Result<usize> {
    let tasks = tasks::user_tasks(conn, user_id)?;
    let (expected, broken) = expected_edges(&tasks);
    if !broken.is_empty() {
        warn!(user_id, ?broken, "tasks with broken parent chains rebuilt as detached");
    }

    conn.execute(
        "DELETE FROM task_hierarchy
         WHERE descendant IN (SELECT id FROM tasks WHERE user_id = ?1)
            OR ancestor IN (SELECT id FROM tasks WHERE user_id = ?1)",
        params![user_id],
    )?;

    let mut insert = conn.prepare_cached(
        "INSERT INTO task_hierarchy (ancestor, descendant, depth) VALUES (?1, ?2, ?3)",
    )?;
    for edge in &expected {
        insert.execute(params![edge.ancestor, edge.descendant, edge.depth])?;
    }

    info!(user_id, rows = expected.len(), "closure table rebuilt");
    Ok(expected.len())
}

impl Database {
    /// Create a task (root or subtask) with its closure rows.
    pub fn add_task(&self, user_id: UserId, input: NewTask) -> Result<TaskTree> {
        let tree = self.transaction(|tx| {
            let task = add_task(tx, user_id, &input)?;
            tree::task_with_subtasks(tx, user_id, task.id)?
                .ok_or_else(|| TaskError::task_not_found(task.id))
        })?;

        self.publish(ChangeNotice::new(ChangeKind::TaskCreated, user_id).snapshot(tree.clone()));
        Ok(tree)
    }

    /// Delete a task and its subtree. `Ok(false)` when the task is absent or
    /// not owned; store failures roll back and surface as `TransactionFailure`.
    pub fn try_delete_task(&self, user_id: UserId, task_id: TaskId) -> Result<bool> {
        let deleted = self.transaction(|tx| delete_task(tx, user_id, task_id))?;

        match deleted {
            Some(subtree) => {
                self.publish(
                    ChangeNotice::new(ChangeKind::TaskDeleted, user_id)
                        .task(task_id)
                        .on_date(subtree.root.creation_day()),
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete a task and its subtree; all-or-nothing, `false` on any failure.
    pub fn delete_task(&self, user_id: UserId, task_id: TaskId) -> bool {
        match self.try_delete_task(user_id, task_id) {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!(task_id, error = %err, "task delete rolled back");
                false
            }
        }
    }

    /// Move a subtree, reporting why a move was rejected.
    pub fn try_move_subtask(
        &self,
        user_id: UserId,
        task_id: TaskId,
        new_parent: Option<TaskId>,
    ) -> Result<TaskTree> {
        let tree = self.transaction(|tx| {
            move_subtask(tx, user_id, task_id, new_parent)?;
            tree::task_with_subtasks(tx, user_id, task_id)?
                .ok_or_else(|| TaskError::task_not_found(task_id))
        })?;

        self.publish(ChangeNotice::new(ChangeKind::TaskUpdated, user_id).snapshot(tree.clone()));
        Ok(tree)
    }

    /// Move a subtree; `false` on any rejection or failure, with nothing changed.
    pub fn move_subtask(&self, user_id: UserId, task_id: TaskId, new_parent: Option<TaskId>) -> bool {
        match self.try_move_subtask(user_id, task_id, new_parent) {
            Ok(_) => true,
            Err(err) => {
                warn!(task_id, new_parent = ?new_parent, error = %err, "subtree move rejected");
                false
            }
        }
    }

    /// Ancestors of a task (itself first, root last).
    pub fn get_ancestors(&self, user_id: UserId, task_id: TaskId) -> Result<Vec<HierarchyEdge>> {
        self.with_conn(|conn| {
            tasks::require_task(conn, user_id, task_id)?;
            ancestor_edges(conn, task_id)
        })
    }

    /// Subtree of a task (itself first), by depth.
    pub fn get_descendants(&self, user_id: UserId, task_id: TaskId) -> Result<Vec<HierarchyEdge>> {
        self.with_conn(|conn| {
            tasks::require_task(conn, user_id, task_id)?;
            subtree_edges(conn, task_id)
        })
    }

    /// The root task above `task_id` (the task itself when it is a root).
    pub fn get_root_of(&self, user_id: UserId, task_id: TaskId) -> Result<TaskId> {
        let edges = self.get_ancestors(user_id, task_id)?;
        Ok(edges.last().map(|e| e.ancestor).unwrap_or(task_id))
    }

    /// All closure rows for a user's tasks.
    pub fn get_hierarchy_edges(&self, user_id: UserId) -> Result<Vec<HierarchyEdge>> {
        self.with_conn(|conn| user_edges(conn, user_id))
    }

    pub fn check_hierarchy(&self, user_id: UserId) -> Result<HierarchyReport> {
        self.with_conn(|conn| check_hierarchy(conn, user_id))
    }

    pub fn rebuild_hierarchy(&self, user_id: UserId) -> Result<usize> {
        self.transaction(|tx| rebuild_hierarchy(tx, user_id))
    }
}
