//! Read-only projections of the task list for the dashboard views.
//!
//! Every function borrows the tasks and returns references into them; none of
//! them touch the stores.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use super::task::{Category, Priority, Task, TaskStatus};

// =============================================================================
// Filtering and sorting
// =============================================================================

/// Sort key for the board view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Earliest deadline first; tasks without a deadline go last.
    #[default]
    Deadline,
    /// High priority first.
    Priority,
    /// Alphabetical, case-insensitive.
    Title,
}

/// Board filters. `None` means "all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub query: String,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub sort_by: SortBy,
}

impl TaskFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query(self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self
        }
    }

    #[must_use]
    pub fn with_category(self, category: Category) -> Self {
        Self {
            category: Some(category),
            ..self
        }
    }

    #[must_use]
    pub fn with_priority(self, priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..self
        }
    }

    #[must_use]
    pub fn with_status(self, status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    #[must_use]
    pub fn sorted_by(self, sort_by: SortBy) -> Self {
        Self { sort_by, ..self }
    }

    /// Returns `true` if `task` passes every active filter.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        let query = self.query.trim().to_lowercase();
        let matches_query = query.is_empty()
            || task.title.to_lowercase().contains(&query)
            || task
                .description
                .as_ref()
                .is_some_and(|description| description.to_lowercase().contains(&query));

        matches_query
            && self.category.is_none_or(|category| task.category == category)
            && self.priority.is_none_or(|priority| task.priority == priority)
            && self.status.is_none_or(|status| task.status == status)
    }

    /// Filters and sorts `tasks`. The sort is stable.
    #[must_use]
    pub fn apply<'a>(&self, tasks: &'a [Task]) -> Vec<&'a Task> {
        let mut selected: Vec<&Task> = tasks.iter().filter(|task| self.matches(task)).collect();
        match self.sort_by {
            SortBy::Deadline => selected.sort_by(|left, right| compare_deadlines(left, right)),
            SortBy::Priority => selected.sort_by_key(|task| task.priority.rank()),
            SortBy::Title => selected.sort_by_cached_key(|task| task.title.to_lowercase()),
        }
        selected
    }
}

/// Orders by deadline, tasks without one last.
fn compare_deadlines(left: &Task, right: &Task) -> Ordering {
    match (&left.deadline, &right.deadline) {
        (Some(left), Some(right)) => left.cmp(right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// =============================================================================
// Board
// =============================================================================

/// One board column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardColumn<'a> {
    pub status: TaskStatus,
    pub tasks: Vec<&'a Task>,
}

/// Groups tasks into one column per status, in workflow order. Empty columns
/// are kept.
#[must_use]
pub fn board_columns(tasks: &[Task]) -> Vec<BoardColumn<'_>> {
    TaskStatus::ALL
        .iter()
        .map(|status| BoardColumn {
            status: *status,
            tasks: tasks.iter().filter(|task| task.status == *status).collect(),
        })
        .collect()
}

// =============================================================================
// Today agenda
// =============================================================================

/// Buckets of the "today" view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodayAgenda<'a> {
    pub overdue: Vec<&'a Task>,
    /// Before noon, plus every open task without a deadline.
    pub morning: Vec<&'a Task>,
    /// Noon to 18h.
    pub afternoon: Vec<&'a Task>,
    /// From 18h.
    pub evening: Vec<&'a Task>,
}

impl TodayAgenda<'_> {
    /// Number of tasks across all buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.overdue.len() + self.morning.len() + self.afternoon.len() + self.evening.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the agenda for the local day of `now`.
///
/// Completed tasks are skipped, as are tasks due on a later day.
#[must_use]
pub fn today_agenda<'a, Tz: TimeZone>(tasks: &'a [Task], now: &DateTime<Tz>) -> TodayAgenda<'a> {
    let zone = now.timezone();
    let today = now.date_naive();
    let mut agenda = TodayAgenda::default();

    for task in tasks.iter().filter(|task| !task.completed) {
        let Some(deadline) = task.deadline else {
            agenda.morning.push(task);
            continue;
        };
        let local = deadline.as_datetime().with_timezone(&zone);

        if local < *now {
            agenda.overdue.push(task);
        } else if local.date_naive() == today {
            match local.hour() {
                0..12 => agenda.morning.push(task),
                12..18 => agenda.afternoon.push(task),
                _ => agenda.evening.push(task),
            }
        }
    }

    for bucket in [
        &mut agenda.overdue,
        &mut agenda.morning,
        &mut agenda.afternoon,
        &mut agenda.evening,
    ] {
        bucket.sort_by(|left, right| compare_deadlines(left, right));
    }
    agenda
}

// =============================================================================
// Calendar
// =============================================================================

/// Groups tasks with a deadline by the deadline's date in `zone`. Within a day
/// tasks are ordered by deadline.
#[must_use]
pub fn calendar<'a, Tz: TimeZone>(tasks: &'a [Task], zone: &Tz) -> BTreeMap<NaiveDate, Vec<&'a Task>> {
    let mut days: BTreeMap<NaiveDate, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        if let Some(deadline) = task.deadline {
            let date = deadline.as_datetime().with_timezone(zone).date_naive();
            days.entry(date).or_default().push(task);
        }
    }
    for day in days.values_mut() {
        day.sort_by(|left, right| compare_deadlines(left, right));
    }
    days
}
