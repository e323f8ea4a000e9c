//! Change notices handed to an external real-time delivery mechanism.
//!
//! The engine never delivers anything itself. After a mutation commits, the
//! `Database` builds a [`ChangeNotice`] (task snapshot, affected date) and
//! passes it to the installed [`ChangeSink`]. The default sink drops notices;
//! [`MemorySink`] buffers them for tests and for the CLI.

use crate::types::{DependencyEdge, TaskId, TaskTree, UserId};
use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Categories of committed mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    TaskCreated,
    /// Field edit or subtree move.
    TaskUpdated,
    /// Task removed together with its subtree.
    TaskDeleted,
    TaskCompleted,
    DependencyAdded,
    DependencyRemoved,
}

impl ChangeKind {
    /// Event name used by push channels.
    pub fn event_name(&self) -> &'static str {
        match self {
            ChangeKind::TaskCreated => "task_created",
            ChangeKind::TaskUpdated => "task_updated",
            ChangeKind::TaskDeleted => "task_deleted",
            ChangeKind::TaskCompleted => "task_completed",
            ChangeKind::DependencyAdded => "dependency_added",
            ChangeKind::DependencyRemoved => "dependency_removed",
        }
    }
}

/// Payload describing one committed change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeNotice {
    pub kind: ChangeKind,
    pub user_id: UserId,
    pub task_id: Option<TaskId>,
    /// Creation date (`YYYY-MM-DD`) of the affected task, so views of that day refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<TaskTree>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<DependencyEdge>,
}

impl ChangeNotice {
    pub fn new(kind: ChangeKind, user_id: UserId) -> Self {
        Self {
            kind,
            user_id,
            task_id: None,
            date: None,
            completed: None,
            snapshot: None,
            dependency: None,
        }
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn on_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Attach a tree snapshot; also fills in the task id and date from it.
    pub fn snapshot(mut self, tree: TaskTree) -> Self {
        self.task_id = Some(tree.task.id);
        self.date = Some(tree.task.creation_day());
        self.snapshot = Some(tree);
        self
    }

    pub fn dependency(mut self, edge: DependencyEdge) -> Self {
        self.task_id = Some(edge.target_task_id);
        self.dependency = Some(edge);
        self
    }

    /// Channel the notice is addressed to.
    pub fn room(&self) -> String {
        format!("user_{}", self.user_id)
    }
}

/// Receiver of committed change notices.
pub trait ChangeSink: Send + Sync {
    fn publish(&self, notice: ChangeNotice);
}

/// Drops every notice.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ChangeSink for NoopSink {
    fn publish(&self, _notice: ChangeNotice) {}
}

/// Buffers notices in memory until drained.
#[derive(Debug, Default)]
pub struct MemorySink {
    notices: Mutex<Vec<ChangeNotice>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every buffered notice, oldest first.
    pub fn drain(&self) -> Vec<ChangeNotice> {
        let mut notices = self.notices.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *notices)
    }

    pub fn len(&self) -> usize {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeSink for MemorySink {
    fn publish(&self, notice: ChangeNotice) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}
