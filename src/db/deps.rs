//! Dependency operations and cycle detection.

use super::tasks::{self, parse_task_row};
use super::Database;
use crate::error::{Result, TaskError};
use crate::notify::{ChangeKind, ChangeNotice};
use crate::types::{DependencyEdge, Task, TaskDependencies, TaskId, UserId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use tracing::debug;

fn parse_edge_row(row: &Row) -> rusqlite::Result<DependencyEdge> {
    Ok(DependencyEdge {
        id: row.get("id")?,
        source_task_id: row.get("source_task_id")?,
        target_task_id: row.get("target_task_id")?,
        user_id: row.get("user_id")?,
    })
}

/// True when `to` can be reached from `from` along at least one edge.
fn reaches(graph: &HashMap<TaskId, Vec<TaskId>>, from: TaskId, to: TaskId) -> bool {
    let mut visited: HashSet<TaskId> = HashSet::new();
    let mut stack: Vec<TaskId> = graph.get(&from).cloned().unwrap_or_default();

    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = graph.get(&current) {
            stack.extend(next.iter().copied().filter(|n| !visited.contains(n)));
        }
    }

    false
}

/// Check whether adding `source -> target` would close a cycle in the user's graph.
///
/// Builds the candidate graph (existing edges plus the proposed one) and
/// searches depth-first from `source`; getting back to `source` means a path
/// `target => source` already exists.
pub fn would_create_cycle(
    conn: &Connection,
    user_id: UserId,
    source: TaskId,
    target: TaskId,
) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT source_task_id, target_task_id FROM task_dependencies WHERE user_id = ?1",
    )?;
    let mut graph: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    let rows = stmt.query_map(params![user_id], |row| {
        Ok((row.get::<_, TaskId>(0)?, row.get::<_, TaskId>(1)?))
    })?;
    for row in rows {
        let (from, to) = row?;
        graph.entry(from).or_default().push(to);
    }

    graph.entry(source).or_default().push(target);
    Ok(reaches(&graph, source, source))
}

/// Add a dependency (source must happen before target).
pub fn add_dependency(
    conn: &Connection,
    user_id: UserId,
    source: TaskId,
    target: TaskId,
) -> Result<DependencyEdge> {
    tasks::validate_id("source_task_id", source)?;
    tasks::validate_id("target_task_id", target)?;

    if tasks::find_task(conn, user_id, source)?.is_none()
        || tasks::find_task(conn, user_id, target)?.is_none()
    {
        return Err(TaskError::NotFound(format!(
            "one or both of tasks {} and {}",
            source, target
        )));
    }

    if source == target {
        return Err(TaskError::InvalidArgument(
            "cannot create dependency to the same task".into(),
        ));
    }

    let existing = conn
        .query_row(
            "SELECT id FROM task_dependencies
             WHERE source_task_id = ?1 AND target_task_id = ?2 AND user_id = ?3",
            params![source, target, user_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Err(TaskError::Conflict(format!(
            "dependency {} -> {} already exists (id {})",
            source, target, id
        )));
    }

    if would_create_cycle(conn, user_id, source, target)? {
        return Err(TaskError::dependency_cycle(source, target));
    }

    conn.execute(
        "INSERT INTO task_dependencies (source_task_id, target_task_id, user_id)
         VALUES (?1, ?2, ?3)",
        params![source, target, user_id],
    )?;

    let edge = DependencyEdge {
        id: conn.last_insert_rowid(),
        source_task_id: source,
        target_task_id: target,
        user_id,
    };
    debug!(edge_id = edge.id, source, target, "dependency added");
    Ok(edge)
}

/// Remove a dependency by id.
pub fn remove_dependency(conn: &Connection, user_id: UserId, edge_id: i64) -> Result<DependencyEdge> {
    let edge = conn
        .query_row(
            "SELECT * FROM task_dependencies WHERE id = ?1 AND user_id = ?2",
            params![edge_id, user_id],
            parse_edge_row,
        )
        .optional()?
        .ok_or_else(|| TaskError::NotFound(format!("dependency {}", edge_id)))?;

    conn.execute(
        "DELETE FROM task_dependencies WHERE id = ?1 AND user_id = ?2",
        params![edge_id, user_id],
    )?;

    debug!(edge_id, "dependency removed");
    Ok(edge)
}

/// Get all dependencies of a user.
pub fn user_dependencies(conn: &Connection, user_id: UserId) -> Result<Vec<DependencyEdge>> {
    let mut stmt = conn.prepare("SELECT * FROM task_dependencies WHERE user_id = ?1 ORDER BY id")?;
    let edges = stmt
        .query_map(params![user_id], parse_edge_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(edges)
}

/// Outgoing and incoming edges of one task.
pub fn task_dependencies(conn: &Connection, user_id: UserId, task_id: TaskId) -> Result<TaskDependencies> {
    tasks::require_task(conn, user_id, task_id)?;

    let mut outgoing = conn.prepare(
        "SELECT * FROM task_dependencies WHERE source_task_id = ?1 AND user_id = ?2 ORDER BY id",
    )?;
    let mut incoming = conn.prepare(
        "SELECT * FROM task_dependencies WHERE target_task_id = ?1 AND user_id = ?2 ORDER BY id",
    )?;

    Ok(TaskDependencies {
        outgoing: outgoing
            .query_map(params![task_id, user_id], parse_edge_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        incoming: incoming
            .query_map(params![task_id, user_id], parse_edge_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
    })
}

/// Incomplete tasks with at least one incomplete predecessor.
pub fn blocked_tasks(conn: &Connection, user_id: UserId) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT t.*
         FROM tasks t
         INNER JOIN task_dependencies d ON t.id = d.target_task_id
         INNER JOIN tasks blocker ON d.source_task_id = blocker.id
         WHERE d.user_id = ?1
         AND t.completed = 0
         AND blocker.completed = 0
         ORDER BY t.creation_date, t.id",
    )?;
    let tasks = stmt
        .query_map(params![user_id], parse_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}

/// Delete every edge that references one of `task_ids`. Returns rows removed.
pub(crate) fn delete_for_tasks(conn: &Connection, task_ids: &[TaskId]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "DELETE FROM task_dependencies WHERE source_task_id = ?1 OR target_task_id = ?1",
    )?;
    let mut removed = 0;
    for id in task_ids {
        removed += stmt.execute(params![id])?;
    }
    Ok(removed)
}

impl Database {
    /// Add a dependency, rejecting self-edges, duplicates and cycles.
    pub fn add_dependency(&self, user_id: UserId, source: TaskId, target: TaskId) -> Result<DependencyEdge> {
        let edge = self.transaction(|tx| add_dependency(tx, user_id, source, target))?;
        self.publish(ChangeNotice::new(ChangeKind::DependencyAdded, user_id).dependency(edge));
        Ok(edge)
    }

    /// Remove a dependency owned by the user.
    pub fn remove_dependency(&self, user_id: UserId, edge_id: i64) -> Result<()> {
        let edge = self.transaction(|tx| remove_dependency(tx, user_id, edge_id))?;
        self.publish(ChangeNotice::new(ChangeKind::DependencyRemoved, user_id).dependency(edge));
        Ok(())
    }

    pub fn get_user_dependencies(&self, user_id: UserId) -> Result<Vec<DependencyEdge>> {
        self.with_conn(|conn| user_dependencies(conn, user_id))
    }

    pub fn get_task_dependencies(&self, user_id: UserId, task_id: TaskId) -> Result<TaskDependencies> {
        self.with_conn(|conn| task_dependencies(conn, user_id, task_id))
    }

    /// Get tasks that are waiting on incomplete predecessors.
    pub fn get_blocked_tasks(&self, user_id: UserId) -> Result<Vec<Task>> {
        self.with_conn(|conn| blocked_tasks(conn, user_id))
    }
}
