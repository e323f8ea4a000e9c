//! Nested task trees assembled from one depth-ordered closure query.

use super::tasks::parse_task_row;
use super::Database;
use crate::error::Result;
use crate::types::{CategoryInfo, PriorityInfo, TaskId, TaskTree, UserId};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

fn parse_tree_row(row: &Row) -> rusqlite::Result<TaskTree> {
    let task = parse_task_row(row)?;

    let category = match row.get::<_, Option<i64>>("category_ref")? {
        Some(id) => Some(CategoryInfo {
            id,
            name: row.get("category_name")?,
            description: row.get("category_description")?,
            icon: row.get("category_icon")?,
        }),
        None => None,
    };
    let priority_color: Option<String> = row.get("priority_color")?;
    let priority_info = task.priority.clone().map(|level| PriorityInfo {
        level,
        color: priority_color,
    });

    Ok(TaskTree {
        task,
        category,
        priority_info,
        depth: row.get("depth")?,
        subtasks: Vec::new(),
    })
}

/// Fold a flat, depth-ordered node list (requested root first) into a tree.
///
/// Works on indices into an arena: a node is attached to its parent only
/// after all deeper nodes have been attached to it, so no recursion is
/// needed however deep the tree is. Nodes whose parent is not in the list
/// are dropped.
pub fn assemble(nodes: Vec<TaskTree>) -> Option<TaskTree> {
    if nodes.is_empty() {
        return None;
    }

    let mut index: HashMap<TaskId, usize> = HashMap::with_capacity(nodes.len());
    let mut parent_slot: Vec<Option<usize>> = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        let parent = if i == 0 {
            None
        } else {
            node.task.parent_id.and_then(|p| index.get(&p).copied())
        };
        index.insert(node.task.id, i);
        parent_slot.push(parent);
    }

    let mut slots: Vec<Option<TaskTree>> = nodes.into_iter().map(Some).collect();

    // Deepest first; children were pushed in reverse order, so flip them once
    for i in (1..slots.len()).rev() {
        let Some(mut node) = slots[i].take() else {
            continue;
        };
        node.subtasks.reverse();
        if let Some(parent) = parent_slot[i].and_then(|p| slots[p].as_mut()) {
            parent.subtasks.push(node);
        }
    }

    let mut root = slots[0].take()?;
    root.subtasks.reverse();
    Some(root)
}

/// One task plus all its subtasks, with category and priority resolved.
pub fn task_with_subtasks(
    conn: &Connection,
    user_id: UserId,
    task_id: TaskId,
) -> Result<Option<TaskTree>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.*, h.depth AS depth,
                c.id AS category_ref, c.name AS category_name,
                c.description AS category_description, c.icon AS category_icon,
                p.color AS priority_color
         FROM task_hierarchy h
         JOIN tasks t ON t.id = h.descendant
         LEFT JOIN categories c ON c.id = t.category_id AND c.user_id = t.user_id
         LEFT JOIN priorities p ON p.level = t.priority AND p.user_id = t.user_id
         WHERE h.ancestor = ?1 AND t.user_id = ?2
         ORDER BY h.depth ASC, t.id ASC",
    )?;

    let nodes = stmt
        .query_map(params![task_id, user_id], parse_tree_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match nodes.first() {
        Some(first) if first.task.id == task_id => Ok(assemble(nodes)),
        _ => Ok(None),
    }
}

impl Database {
    /// Get a task with all its subtasks as a nested tree.
    pub fn get_task_with_subtasks(&self, user_id: UserId, task_id: TaskId) -> Result<Option<TaskTree>> {
        self.with_conn(|conn| task_with_subtasks(conn, user_id, task_id))
    }

    /// Every root task of a user with its subtasks.
    pub fn get_forest(&self, user_id: UserId) -> Result<Vec<TaskTree>> {
        self.with_conn(|conn| {
            let mut trees = Vec::new();
            for root in super::tasks::root_tasks(conn, user_id)? {
                if let Some(tree) = task_with_subtasks(conn, user_id, root.id)? {
                    trees.push(tree);
                }
            }
            Ok(trees)
        })
    }
}
