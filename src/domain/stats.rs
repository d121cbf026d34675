//! Aggregate analytics over the task list.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone};
use serde::Serialize;

use super::task::{Category, Task, TaskStatus, Timestamp};

/// Number of weeks in the completion trend, oldest first, ending with the
/// current week.
pub const TREND_WEEKS: usize = 6;

/// Completed tasks attributed to one week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeeklyCompletion {
    /// Monday of the week.
    pub week_start: NaiveDate,
    pub completed: usize,
}

/// Dashboard aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub in_progress: usize,
    pub backlog: usize,
    pub in_review: usize,
    pub overdue: usize,
    /// Rounded percentage of completed tasks, `0` for an empty list.
    pub completion_rate: u32,
    /// Count per status, in workflow order. Completed tasks always count as
    /// `Completed`.
    pub status_distribution: Vec<(TaskStatus, usize)>,
    /// Count per category, for categories that occur.
    pub category_counts: Vec<(Category, usize)>,
    /// Earliest deadline among open tasks.
    pub next_deadline: Option<Timestamp>,
    /// Earliest passed deadline among open tasks.
    pub oldest_overdue: Option<Timestamp>,
    pub completion_trend: Vec<WeeklyCompletion>,
}

fn is_done(task: &Task) -> bool {
    task.completed || task.status.is_completed()
}

/// `round(part / whole * 100)`, rounding halves up.
fn rounded_percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    let percent = (part * 200 + whole) / (whole * 2);
    u32::try_from(percent).unwrap_or(u32::MAX)
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

impl TaskStats {
    /// Computes every aggregate relative to `now`.
    ///
    /// Week boundaries and the trend use the local calendar of `now`. A
    /// completed task is attributed to the week of its deadline, or to the
    /// current week when it has none.
    #[must_use]
    pub fn compute<Tz: TimeZone>(tasks: &[Task], now: &DateTime<Tz>) -> Self {
        let zone = now.timezone();
        let now_utc = now.to_utc();
        let completed = tasks.iter().filter(|task| is_done(task)).count();

        let status_distribution = TaskStatus::ALL
            .iter()
            .map(|status| {
                let count = tasks
                    .iter()
                    .filter(|task| {
                        if is_done(task) {
                            status.is_completed()
                        } else {
                            task.status == *status
                        }
                    })
                    .count();
                (*status, count)
            })
            .collect();

        let category_counts = Category::ALL
            .iter()
            .map(|category| {
                let count = tasks.iter().filter(|task| task.category == *category).count();
                (*category, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect();

        let open_deadlines = || {
            tasks
                .iter()
                .filter(|task| !is_done(task))
                .filter_map(|task| task.deadline)
        };
        let next_deadline = open_deadlines().min();
        let oldest_overdue = open_deadlines()
            .filter(|deadline| *deadline.as_datetime() < now_utc)
            .min();

        let this_monday = monday_of(now.date_naive());
        let completion_trend = (0..TREND_WEEKS)
            .map(|index| {
                let weeks_back = i64::try_from(TREND_WEEKS - 1 - index).unwrap_or(0);
                let week_start = this_monday - Duration::weeks(weeks_back);
                let week_end = week_start + Duration::days(7);
                let completed = tasks
                    .iter()
                    .filter(|task| is_done(task))
                    .filter(|task| {
                        let reference = task.deadline.map_or_else(
                            || now.date_naive(),
                            |deadline| deadline.as_datetime().with_timezone(&zone).date_naive(),
                        );
                        week_start <= reference && reference < week_end
                    })
                    .count();
                WeeklyCompletion {
                    week_start,
                    completed,
                }
            })
            .collect();

        Self {
            total: tasks.len(),
            completed,
            in_progress: tasks
                .iter()
                .filter(|task| task.status == TaskStatus::InProgress)
                .count(),
            backlog: tasks
                .iter()
                .filter(|task| task.status == TaskStatus::Backlog)
                .count(),
            in_review: tasks
                .iter()
                .filter(|task| task.status == TaskStatus::InReview)
                .count(),
            overdue: tasks.iter().filter(|task| task.is_overdue(&now_utc)).count(),
            completion_rate: rounded_percent(completed, tasks.len()),
            status_distribution,
            category_counts,
            next_deadline,
            oldest_overdue,
            completion_trend,
        }
    }
}
