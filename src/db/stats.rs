//! Aggregation queries for activity statistics.

use super::tasks::root_tasks;
use super::{local_today, Database};
use crate::activity::{self, Progress, RootActivity};
use crate::error::{Result, TaskError};
use crate::types::{DailyStat, RangeSummary, StatsFilter, TaskId, UserId, WeekdayStat};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::collections::HashMap;

/// `(direct subtasks, completed direct subtasks)` per parent, for one user.
pub fn direct_subtask_counts(conn: &Connection, user_id: UserId) -> Result<HashMap<TaskId, (u32, u32)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT h.ancestor, COUNT(*), COALESCE(SUM(s.completed), 0)
         FROM task_hierarchy h
         JOIN tasks s ON s.id = h.descendant
         WHERE h.depth = 1 AND s.user_id = ?1
         GROUP BY h.ancestor",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok((
            row.get::<_, TaskId>(0)?,
            (row.get::<_, u32>(1)?, row.get::<_, u32>(2)?),
        ))
    })?;
    let counts = rows.collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(counts)
}

/// Root tasks passing `filter`, each with progress folded from its subtasks.
pub fn root_activity(conn: &Connection, user_id: UserId, filter: &StatsFilter) -> Result<Vec<RootActivity>> {
    let counts = direct_subtask_counts(conn, user_id)?;

    let roots = root_tasks(conn, user_id)?
        .into_iter()
        .filter(|task| filter.matches(task))
        .map(|task| {
            let (subtasks, done) = counts.get(&task.id).copied().unwrap_or((0, 0));
            let progress = Progress::derive(task.completed, subtasks, done);
            RootActivity { task, progress }
        })
        .collect();
    Ok(roots)
}

/// Reject inverted or oversized ranges.
pub fn validate_range(start: NaiveDate, end: NaiveDate, max_days: i64) -> Result<()> {
    if start > end {
        return Err(TaskError::InvalidArgument(format!(
            "start date {} is after end date {}",
            start, end
        )));
    }
    let days = (end - start).num_days() + 1;
    if days > max_days {
        return Err(TaskError::InvalidArgument(format!(
            "range of {} days exceeds the limit of {}",
            days, max_days
        )));
    }
    Ok(())
}

/// Per-day statistics over `[start, end]`, with `today` governing undated tasks.
pub fn daily_stats(
    conn: &Connection,
    user_id: UserId,
    start: NaiveDate,
    end: NaiveDate,
    filter: &StatsFilter,
    today: NaiveDate,
) -> Result<Vec<DailyStat>> {
    let roots = root_activity(conn, user_id, filter)?;
    Ok(activity::daily_stats(start, end, today, &roots))
}

impl Database {
    /// Per-day statistics for a range, as of today's local date.
    pub fn daily_stats(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
        filter: &StatsFilter,
    ) -> Result<Vec<DailyStat>> {
        self.daily_stats_as_of(user_id, start, end, filter, local_today())
    }

    /// Per-day statistics for a range with an explicit "today".
    pub fn daily_stats_as_of(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
        filter: &StatsFilter,
        today: NaiveDate,
    ) -> Result<Vec<DailyStat>> {
        validate_range(start, end, self.max_range_days())?;
        self.with_conn(|conn| daily_stats(conn, user_id, start, end, filter, today))
    }

    /// Daily statistics for the Monday..Sunday week containing `anchor`.
    pub fn week_stats(
        &self,
        user_id: UserId,
        anchor: NaiveDate,
        filter: &StatsFilter,
    ) -> Result<Vec<DailyStat>> {
        let (start, end) = activity::week_range(anchor);
        self.daily_stats(user_id, start, end, filter)
    }

    /// Daily statistics for every day of a month.
    pub fn month_stats(
        &self,
        user_id: UserId,
        year: i32,
        month: u32,
        filter: &StatsFilter,
    ) -> Result<Vec<DailyStat>> {
        let (start, end) = activity::month_range(year, month).ok_or_else(|| {
            TaskError::InvalidArgument(format!("invalid month {}-{}", year, month))
        })?;
        self.daily_stats(user_id, start, end, filter)
    }

    /// Range statistics folded by weekday (Sunday first).
    pub fn weekly_distribution(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
        filter: &StatsFilter,
    ) -> Result<Vec<WeekdayStat>> {
        let days = self.daily_stats(user_id, start, end, filter)?;
        Ok(activity::fold_weekdays(&days))
    }

    /// Totals over a range.
    pub fn range_summary(
        &self,
        user_id: UserId,
        start: NaiveDate,
        end: NaiveDate,
        filter: &StatsFilter,
    ) -> Result<RangeSummary> {
        let days = self.daily_stats(user_id, start, end, filter)?;
        Ok(activity::summarize(start, end, &days))
    }
}
