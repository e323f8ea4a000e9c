//! Core types for the task hierarchy engine.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Task identifier (SQLite rowid).
pub type TaskId = i64;

/// Identifier of the owning user. Resolved by the caller; never authenticated here.
pub type UserId = i64;

/// Shape used on the canvas when none is given.
pub const DEFAULT_CANVAS_SHAPE: &str = "rounded";

/// Maximum length of a task name.
pub const MAX_TASK_NAME_LEN: usize = 100;

/// A task node. Ancestry lives in the closure table; `parent_id` is kept by value only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub completed: bool,
    pub completed_date: Option<NaiveDateTime>,
    /// Free-text priority label, resolved against the user's priority table.
    pub priority: Option<String>,
    pub category_id: Option<i64>,
    pub parent_id: Option<TaskId>,
    pub creation_date: NaiveDateTime,
    pub deadline: Option<NaiveDateTime>,
    pub position: Option<CanvasPosition>,
    pub canvas_color: Option<String>,
    pub canvas_shape: Option<String>,
}

impl Task {
    /// Creation date formatted as `YYYY-MM-DD`, used in change notices.
    pub fn creation_day(&self) -> String {
        self.creation_date.date().format("%Y-%m-%d").to_string()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Canvas coordinates of a task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasPosition {
    pub x: f64,
    pub y: f64,
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<TaskId>,
    pub category_id: Option<i64>,
    pub priority: Option<String>,
    /// Defaults to today at local midnight.
    pub creation_date: Option<NaiveDateTime>,
    pub deadline: Option<NaiveDateTime>,
    pub position: Option<CanvasPosition>,
    pub canvas_color: Option<String>,
    pub canvas_shape: Option<String>,
}

impl NewTask {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn under(mut self, parent_id: TaskId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn created_on(mut self, date: NaiveDate) -> Self {
        self.creation_date = date.and_hms_opt(0, 0, 0);
        self
    }

    pub fn due(mut self, deadline: NaiveDateTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_priority(mut self, level: impl Into<String>) -> Self {
        self.priority = Some(level.into());
        self
    }

    pub fn in_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }
}

/// Field edits for an existing task. `None` leaves a field untouched;
/// `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub completed: Option<bool>,
    pub priority: Option<Option<String>>,
    pub category_id: Option<Option<i64>>,
    pub deadline: Option<Option<NaiveDateTime>>,
    /// Re-parenting goes through the subtree move algorithm.
    pub parent_id: Option<Option<TaskId>>,
    pub position: Option<Option<CanvasPosition>>,
    pub canvas_color: Option<Option<String>>,
    pub canvas_shape: Option<Option<String>>,
}

/// Result of flipping a task's completion flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionToggle {
    pub id: TaskId,
    pub completed: bool,
}

/// One closure-table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub ancestor: TaskId,
    pub descendant: TaskId,
    pub depth: i64,
}

/// "source must happen before target".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: i64,
    pub source_task_id: TaskId,
    pub target_task_id: TaskId,
    pub user_id: UserId,
}

/// Dependency edges touching one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependencies {
    /// Edges where the task is the source.
    pub outgoing: Vec<DependencyEdge>,
    /// Edges where the task is the target.
    pub incoming: Vec<DependencyEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInfo {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityInfo {
    pub level: String,
    /// `None` when the label has no entry in the user's priority table.
    pub color: Option<String>,
}

/// A task with its resolved lookups and nested subtasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTree {
    #[serde(flatten)]
    pub task: Task,
    pub category: Option<CategoryInfo>,
    pub priority_info: Option<PriorityInfo>,
    /// Depth below the requested root (0 for the root itself).
    pub depth: i64,
    pub subtasks: Vec<TaskTree>,
}

impl TaskTree {
    /// Total number of nodes in this tree, root included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.subtasks.iter());
        }
        count
    }

    /// Find a node anywhere in the tree by task id.
    pub fn find(&self, id: TaskId) -> Option<&TaskTree> {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.task.id == id {
                return Some(node);
            }
            stack.extend(node.subtasks.iter());
        }
        None
    }
}

/// Completion filter for task search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionFilter {
    #[default]
    All,
    /// Root is completed or has a completed direct subtask.
    Completed,
    /// Root is incomplete or has an incomplete direct subtask.
    Incomplete,
}

impl std::str::FromStr for CompletionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "completed" => Ok(Self::Completed),
            "incomplete" => Ok(Self::Incomplete),
            other => Err(format!("unknown completion status: {}", other)),
        }
    }
}

/// Filters for root-task search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Inclusive creation-date range of the root task.
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub query: Option<String>,
    pub category_ids: Vec<i64>,
    pub priority_levels: Vec<String>,
    pub deadline_before: Option<NaiveDateTime>,
    pub deadline_after: Option<NaiveDateTime>,
    pub completion: CompletionFilter,
}

/// Filters applied to root tasks before activity aggregation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsFilter {
    pub category_ids: Vec<i64>,
    pub priority_levels: Vec<String>,
}

impl StatsFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let category_ok = self.category_ids.is_empty()
            || task
                .category_id
                .is_some_and(|c| self.category_ids.contains(&c));
        let priority_ok = self.priority_levels.is_empty()
            || task
                .priority
                .as_ref()
                .is_some_and(|p| self.priority_levels.contains(p));
        category_ok && priority_ok
    }
}

/// Overall status of a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayStatus {
    Free,
    NotStarted,
    InProgress,
    Completed,
}

/// Activity statistics for one calendar day. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    /// 0 = Sunday .. 6 = Saturday.
    pub weekday: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub status: DayStatus,
    pub completion_percentage: f64,
}

/// Daily statistics folded by weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekdayStat {
    pub weekday: u32,
    pub weekday_name: String,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub completion_percentage: f64,
}

/// Totals over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSummary {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: u32,
    pub free_days: u32,
    pub completed_days: u32,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub completion_percentage: f64,
}

/// Result of comparing the closure table with parent pointers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyReport {
    pub tasks_checked: usize,
    /// Rows implied by parent pointers but absent from the table.
    pub missing: Vec<HierarchyEdge>,
    /// Rows in the table that parent pointers do not imply.
    pub stale: Vec<HierarchyEdge>,
    /// Rows present with the wrong depth (the expected depth is reported).
    pub wrong_depth: Vec<HierarchyEdge>,
    /// Tasks whose parent chain loops or leaves the user's tasks.
    pub broken_parents: Vec<TaskId>,
}

impl HierarchyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty()
            && self.stale.is_empty()
            && self.wrong_depth.is_empty()
            && self.broken_parents.is_empty()
    }
}
