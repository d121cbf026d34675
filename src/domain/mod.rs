//! Domain module for task tracking.
//!
//! This module contains the task and subtask models, the ordering engine,
//! the tag registry, and the read-only view and analytics queries.

pub mod ordering;
pub mod stats;
pub mod subtask;
pub mod tag;
pub mod task;
pub mod view;

pub use ordering::{
    Positioned, is_contiguous, keys_in_order, next_order, reorder, sort_by_order, sorted_by_order,
};
pub use stats::{TaskStats, WeeklyCompletion};
pub use subtask::{Subtask, SubtaskId};
pub use tag::TagRegistry;
pub use task::{
    Category, ParseEnumError, Priority, Tag, TagId, Task, TaskChanges, TaskDraft, TaskId,
    TaskStatus, Timestamp, UserId, ValidationError,
};
pub use view::{BoardColumn, SortBy, TaskFilter, TodayAgenda, board_columns, calendar, today_agenda};
