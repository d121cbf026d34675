//! Task domain model.
//!
//! A task carries a title, classification (category, priority), a workflow
//! status, an optional deadline and a set of display tags. The `completed`
//! flag always mirrors `status == Completed`; every constructor and every
//! update path in this module re-derives it.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Unique identifier for a task.
///
/// Identifiers are opaque strings: the remote store assigns them, and tasks
/// created offline receive a generated UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a `TaskId` from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new random `TaskId` (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of the user owning a task.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Owner recorded on tasks created without a signed-in user.
    pub const LOCAL: &'static str = "local";

    /// Creates a `UserId` from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The placeholder owner for offline tasks.
    #[must_use]
    pub fn local() -> Self {
        Self(Self::LOCAL.to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagId(String);

impl TagId {
    /// Creates a `TagId` from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new random `TagId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A display tag attached to a task.
///
/// Tags live only on the client; the persistence API does not model them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// Stable identifier, unique within a task's tag set.
    pub id: TagId,
    /// Human-readable name.
    pub name: String,
}

impl Tag {
    /// Creates a new tag.
    #[must_use]
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
///
/// Serialized as an RFC 3339 string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parses an RFC 3339 / ISO-8601 timestamp.
    ///
    /// Returns `None` for unparseable input; an invalid deadline is treated
    /// as "no deadline".
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|datetime| Self(datetime.with_timezone(&Utc)))
    }

    /// Formats as ISO-8601 with millisecond precision (`2024-05-18T17:00:00.000Z`).
    #[must_use]
    pub fn to_iso_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.to_rfc3339())
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    /// The enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Life area a task belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Work,
    Personal,
    Study,
    Wellness,
    #[default]
    Other,
}

impl Category {
    /// Every category in display order.
    pub const ALL: [Self; 5] = [
        Self::Work,
        Self::Personal,
        Self::Study,
        Self::Wellness,
        Self::Other,
    ];

    /// Returns the wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Study => "study",
            Self::Wellness => "wellness",
            Self::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = ParseEnumError;

    /// Parses a category case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "work" => Ok(Self::Work),
            "personal" => Ok(Self::Personal),
            "study" => Ok(Self::Study),
            "wellness" => Ok(Self::Wellness),
            "other" => Ok(Self::Other),
            _ => Err(ParseEnumError::new("category", value)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// The priority level of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort rank: lower ranks sort first (high priority first).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }

    /// Returns the wire name of the priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ParseEnumError::new("priority", value)),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started yet.
    #[default]
    Backlog,
    /// Being worked on.
    InProgress,
    /// Waiting for review.
    InReview,
    /// Done.
    Completed,
}

impl TaskStatus {
    /// Every status in workflow order (board column order).
    pub const ALL: [Self; 4] = [
        Self::Backlog,
        Self::InProgress,
        Self::InReview,
        Self::Completed,
    ];

    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Completed => "completed",
        }
    }

    /// Returns `true` for the terminal `Completed` status.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    /// Parses a status case-insensitively (`IN_PROGRESS` and `in_progress`
    /// are both accepted).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "backlog" => Ok(Self::Backlog),
            "in_progress" => Ok(Self::InProgress),
            "in_review" => Ok(Self::InReview),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseEnumError::new("status", value)),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Parses an optional, possibly unknown value, falling back when the value is
/// missing or not recognised.
pub fn parse_or<T: FromStr>(value: Option<&str>, fallback: T) -> T {
    value
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

// =============================================================================
// Validation
// =============================================================================

/// Errors raised before a mutation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The title is empty after trimming.
    #[error("title must not be empty")]
    EmptyTitle,

    /// An explicit `completed` flag contradicts the requested status.
    #[error("completed={completed} contradicts status '{status}'")]
    ConflictingCompletion {
        /// The requested status.
        status: TaskStatus,
        /// The requested completion flag.
        completed: bool,
    },
}

fn validated_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyTitle)
    } else {
        Ok(trimmed.to_string())
    }
}

// =============================================================================
// Task
// =============================================================================

/// A task as held by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    /// `None` means the task has a flexible deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Timestamp>,
    pub status: TaskStatus,
    pub completed: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Task {
    /// Returns a new task with the given status; `completed` follows.
    #[must_use]
    pub fn with_status(self, status: TaskStatus) -> Self {
        Self {
            status,
            completed: status.is_completed(),
            ..self
        }
    }

    /// Returns a new task with the given tags (replacing existing tags).
    ///
    /// Later duplicates of an id are dropped.
    #[must_use]
    pub fn with_tags(self, tags: Vec<Tag>) -> Self {
        Self {
            tags: dedup_tags(tags),
            ..self
        }
    }

    /// Returns a new task with the tag added; unchanged if its id is present.
    #[must_use]
    pub fn add_tag(mut self, tag: Tag) -> Self {
        if !self.has_tag(&tag.id) {
            self.tags.push(tag);
        }
        self
    }

    /// Returns a new task without the tag of the given id.
    #[must_use]
    pub fn remove_tag(mut self, id: &TagId) -> Self {
        self.tags.retain(|tag| &tag.id != id);
        self
    }

    /// Returns `true` if a tag with the given id is attached.
    #[must_use]
    pub fn has_tag(&self, id: &TagId) -> bool {
        self.tags.iter().any(|tag| &tag.id == id)
    }

    /// Returns `true` if the task is not completed and its deadline has passed.
    #[must_use]
    pub fn is_overdue(&self, now: &DateTime<Utc>) -> bool {
        !self.completed
            && self
                .deadline
                .is_some_and(|deadline| deadline.as_datetime() < now)
    }

    /// Merges `changes` into this task.
    ///
    /// `completed` is re-derived from the resulting status. An explicit
    /// `completed` without a status drives the status instead: `true`
    /// completes the task, `false` reopens a completed task into the backlog.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the new title is blank or the explicit
    /// flag contradicts an explicit status.
    pub fn apply_changes(&self, changes: &TaskChanges) -> Result<Self, ValidationError> {
        let title = match &changes.title {
            Some(title) => validated_title(title)?,
            None => self.title.clone(),
        };

        let status = match (changes.status, changes.completed) {
            (Some(status), Some(completed)) if status.is_completed() != completed => {
                return Err(ValidationError::ConflictingCompletion { status, completed });
            }
            (Some(status), _) => status,
            (None, Some(true)) => TaskStatus::Completed,
            (None, Some(false)) if self.status.is_completed() => TaskStatus::Backlog,
            (None, _) => self.status,
        };

        Ok(Self {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            title,
            description: changes
                .description
                .clone()
                .unwrap_or_else(|| self.description.clone()),
            category: changes.category.unwrap_or(self.category),
            priority: changes.priority.unwrap_or(self.priority),
            deadline: changes.deadline.unwrap_or(self.deadline),
            status,
            completed: status.is_completed(),
            tags: changes
                .tags
                .clone()
                .map_or_else(|| self.tags.clone(), dedup_tags),
        })
    }
}

fn dedup_tags(tags: Vec<Tag>) -> Vec<Tag> {
    let mut unique: Vec<Tag> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !unique.iter().any(|existing| existing.id == tag.id) {
            unique.push(tag);
        }
    }
    unique
}

// =============================================================================
// TaskDraft
// =============================================================================

/// User input for a new task.
///
/// There is no `completed` field: it is always derived from `status`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub category: Category,
    pub priority: Priority,
    pub deadline: Option<Timestamp>,
    pub status: TaskStatus,
    pub tags: Vec<Tag>,
}

impl TaskDraft {
    /// Creates a draft with defaults for everything but the title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    #[must_use]
    pub fn with_category(self, category: Category) -> Self {
        Self { category, ..self }
    }

    #[must_use]
    pub fn with_priority(self, priority: Priority) -> Self {
        Self { priority, ..self }
    }

    #[must_use]
    pub fn with_deadline(self, deadline: Timestamp) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    #[must_use]
    pub fn with_status(self, status: TaskStatus) -> Self {
        Self { status, ..self }
    }

    #[must_use]
    pub fn with_tags(self, tags: Vec<Tag>) -> Self {
        Self { tags, ..self }
    }

    /// Checks the draft without consuming it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyTitle` for a blank title.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validated_title(&self.title).map(|_| ())
    }

    /// Turns the draft into a task with the given identity.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyTitle` for a blank title.
    pub fn into_task(self, id: TaskId, user_id: UserId) -> Result<Task, ValidationError> {
        let title = validated_title(&self.title)?;
        Ok(Task {
            id,
            user_id,
            title,
            description: self.description,
            category: self.category,
            priority: self.priority,
            deadline: self.deadline,
            status: self.status,
            completed: self.status.is_completed(),
            tags: dedup_tags(self.tags),
        })
    }
}

// =============================================================================
// TaskChanges
// =============================================================================

/// A partial update of a task.
///
/// `None` leaves a field untouched. For `description` and `deadline`,
/// `Some(None)` clears the value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<Category>,
    pub priority: Option<Priority>,
    pub deadline: Option<Option<Timestamp>>,
    pub status: Option<TaskStatus>,
    pub completed: Option<bool>,
    pub tags: Option<Vec<Tag>>,
}

impl TaskChanges {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    #[must_use]
    pub fn description(self, description: Option<String>) -> Self {
        Self {
            description: Some(description),
            ..self
        }
    }

    #[must_use]
    pub fn category(self, category: Category) -> Self {
        Self {
            category: Some(category),
            ..self
        }
    }

    #[must_use]
    pub fn priority(self, priority: Priority) -> Self {
        Self {
            priority: Some(priority),
            ..self
        }
    }

    #[must_use]
    pub fn deadline(self, deadline: Option<Timestamp>) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    #[must_use]
    pub fn status(self, status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..self
        }
    }

    #[must_use]
    pub fn completed(self, completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..self
        }
    }

    #[must_use]
    pub fn tags(self, tags: Vec<Tag>) -> Self {
        Self {
            tags: Some(tags),
            ..self
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
