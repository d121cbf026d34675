//! Subtask domain model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ordering::Positioned;
use super::task::TaskId;

/// Prefix marking a subtask id assigned locally before the server confirms it.
pub const PROVISIONAL_PREFIX: &str = "temp-";

/// Identifier of a subtask, unique within its parent task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(String);

impl SubtaskId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a server-side identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Generates a temporary identifier for an optimistic insert.
    #[must_use]
    pub fn provisional() -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{}", Uuid::now_v7().simple()))
    }

    /// Returns `true` for identifiers created by [`SubtaskId::provisional`].
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubtaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for SubtaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A checklist item belonging to a task.
///
/// `task_id` is a back-reference only; the parent does not own subtasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtask {
    pub id: SubtaskId,
    pub task_id: TaskId,
    pub title: String,
    pub done: bool,
    /// Zero-based position within the parent's sequence.
    pub order: u32,
}

impl Subtask {
    /// Creates an open subtask.
    #[must_use]
    pub fn new(id: SubtaskId, task_id: TaskId, title: impl Into<String>, order: u32) -> Self {
        Self {
            id,
            task_id,
            title: title.into(),
            done: false,
            order,
        }
    }

    #[must_use]
    pub fn with_done(self, done: bool) -> Self {
        Self { done, ..self }
    }
}

impl Positioned for Subtask {
    type Key = SubtaskId;

    fn key(&self) -> &SubtaskId {
        &self.id
    }

    fn position(&self) -> u32 {
        self.order
    }

    fn with_position(self, position: u32) -> Self {
        Self {
            order: position,
            ..self
        }
    }
}
