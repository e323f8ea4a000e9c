//! Activity windows, derived root completion, and daily status rules.
//!
//! Everything here is pure; [`crate::db::stats`] loads the rows and feeds
//! them through these functions.

use crate::types::{DailyStat, DayStatus, RangeSummary, Task, WeekdayStat};
use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

pub const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Completion state of a root task, folded from its direct subtasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Progress {
    NotStarted,
    InProgress,
    Completed,
}

impl Progress {
    /// A root with subtasks is complete only when every direct subtask is;
    /// a root without subtasks uses its own flag.
    pub fn derive(own_completed: bool, subtasks: u32, subtasks_completed: u32) -> Self {
        if subtasks == 0 {
            return if own_completed {
                Progress::Completed
            } else {
                Progress::NotStarted
            };
        }
        if subtasks_completed >= subtasks {
            Progress::Completed
        } else if subtasks_completed == 0 {
            Progress::NotStarted
        } else {
            Progress::InProgress
        }
    }

    pub fn is_completed(self) -> bool {
        self == Progress::Completed
    }
}

/// A root task with its derived progress.
#[derive(Debug, Clone, PartialEq)]
pub struct RootActivity {
    pub task: Task,
    pub progress: Progress,
}

/// Whether a task counts on `day`.
///
/// Dated tasks are active from creation through their deadline. Undated
/// tasks are active only on `today` while incomplete, rolling forward day by
/// day until completed or given a deadline.
///
/// `completed` is the completion the caller counts, not necessarily
/// `task.completed`: for roots `day_stat` passes the progress derived from
/// direct subtasks, so a root whose subtasks are all done leaves "today"
/// even if its own flag is unset.
pub fn is_active_on(task: &Task, completed: bool, day: NaiveDate, today: NaiveDate) -> bool {
    if task.creation_date.date() > day {
        return false;
    }
    match task.deadline {
        Some(deadline) => deadline.date() >= day,
        None => !completed && day == today,
    }
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_sunday()
}

/// `completed / total * 100` rounded to two decimals; 0 when there is nothing to do.
pub fn completion_percentage(completed: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (f64::from(completed) / f64::from(total) * 10_000.0).round() / 100.0
}

pub fn day_status(total: u32, completed: u32, any_in_progress: bool) -> DayStatus {
    if total == 0 {
        DayStatus::Free
    } else if completed == total {
        DayStatus::Completed
    } else if any_in_progress || completed > 0 {
        DayStatus::InProgress
    } else {
        DayStatus::NotStarted
    }
}

/// Statistics for one day over the given roots.
pub fn day_stat(day: NaiveDate, today: NaiveDate, roots: &[RootActivity]) -> DailyStat {
    let mut total = 0;
    let mut completed = 0;
    let mut any_in_progress = false;

    for root in roots {
        if !is_active_on(&root.task, root.progress.is_completed(), day, today) {
            continue;
        }
        total += 1;
        match root.progress {
            Progress::Completed => completed += 1,
            Progress::InProgress => any_in_progress = true,
            Progress::NotStarted => {}
        }
    }

    DailyStat {
        date: day,
        weekday: weekday_index(day),
        total_tasks: total,
        completed_tasks: completed,
        status: day_status(total, completed, any_in_progress),
        completion_percentage: completion_percentage(completed, total),
    }
}

/// Inclusive iterator over calendar days.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

/// Daily statistics for every day in `[start, end]`.
pub fn daily_stats(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
    roots: &[RootActivity],
) -> Vec<DailyStat> {
    days_between(start, end)
        .map(|day| day_stat(day, today, roots))
        .collect()
}

/// Fold daily statistics by weekday, Sunday first.
pub fn fold_weekdays(days: &[DailyStat]) -> Vec<WeekdayStat> {
    let mut totals = [(0u32, 0u32); 7];
    for day in days {
        let slot = &mut totals[day.weekday as usize % 7];
        slot.0 += day.total_tasks;
        slot.1 += day.completed_tasks;
    }

    totals
        .iter()
        .enumerate()
        .map(|(i, &(total, completed))| WeekdayStat {
            weekday: i as u32,
            weekday_name: WEEKDAY_NAMES[i].to_string(),
            total_tasks: total,
            completed_tasks: completed,
            completion_percentage: completion_percentage(completed, total),
        })
        .collect()
}

/// Totals over a range of daily statistics.
pub fn summarize(start: NaiveDate, end: NaiveDate, days: &[DailyStat]) -> RangeSummary {
    let total: u32 = days.iter().map(|d| d.total_tasks).sum();
    let completed: u32 = days.iter().map(|d| d.completed_tasks).sum();

    RangeSummary {
        start,
        end,
        days: days.len() as u32,
        free_days: days.iter().filter(|d| d.status == DayStatus::Free).count() as u32,
        completed_days: days
            .iter()
            .filter(|d| d.status == DayStatus::Completed)
            .count() as u32,
        total_tasks: total,
        completed_tasks: completed,
        completion_percentage: completion_percentage(completed, total),
    }
}

/// First and last day of a month, or `None` for an invalid month.
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
    Some((first, last))
}

/// Monday..Sunday week containing `anchor`.
pub fn week_range(anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = u64::from(anchor.weekday().num_days_from_monday());
    let start = anchor - Days::new(offset);
    (start, start + Days::new(6))
}

/// Calendar window a dashboard view covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeScope {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl TimeScope {
    /// Inclusive date range of this scope around `anchor`.
    pub fn range(self, anchor: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            TimeScope::Daily => (anchor, anchor),
            TimeScope::Weekly => week_range(anchor),
            TimeScope::Monthly => {
                month_range(anchor.year(), anchor.month()).unwrap_or((anchor, anchor))
            }
            TimeScope::Yearly => {
                let year = anchor.year();
                match (
                    NaiveDate::from_ymd_opt(year, 1, 1),
                    NaiveDate::from_ymd_opt(year, 12, 31),
                ) {
                    (Some(start), Some(end)) => (start, end),
                    _ => (anchor, anchor),
                }
            }
        }
    }
}

impl std::str::FromStr for TimeScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(TimeScope::Daily),
            "weekly" => Ok(TimeScope::Weekly),
            "monthly" => Ok(TimeScope::Monthly),
            "yearly" => Ok(TimeScope::Yearly),
            other => Err(format!(
                "invalid time scope '{}': use daily, weekly, monthly, or yearly",
                other
            )),
        }
    }
}
