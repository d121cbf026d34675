//! The persistence API consumed by the sync layer.
//!
//! This module defines the wire records, the error taxonomy, and the
//! [`TaskApi`] trait that every transport (in-process backend, HTTP client,
//! fail-injecting decorator) implements.
//!
//! # Wire format
//!
//! Task records are camelCase JSON. The enum fields of an [`ApiTask`] are plain
//! strings: the server may echo them in any case (`IN_PROGRESS`), and
//! [`map_api_task`] normalizes them case-insensitively.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::domain::task::parse_or;
use crate::domain::{
    Category, Priority, Subtask, SubtaskId, Task, TaskChanges, TaskId, TaskStatus, Timestamp,
    UserId,
};

// =============================================================================
// Remote Error
// =============================================================================

/// Error type for persistence API calls.
///
/// The sync layer treats every variant the same way (rollback); the variants
/// exist for logging and for callers that want to react differently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The entity does not exist or belongs to another user.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No authenticated principal accompanied the request.
    #[error("Unauthorized")]
    Unauthorized,

    /// The server rejected the payload.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with an unexpected status code.
    #[error("Unexpected status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The request timed out after the given number of milliseconds.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Failure injected for testing purposes.
    #[error("Injected failure: {0}")]
    InjectedFailure(String),
}

// =============================================================================
// Wire Records
// =============================================================================

/// A task as returned by the persistence API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiTask {
    pub id: TaskId,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
}

/// Body of a create-task request.
///
/// Identity and ownership are never sent; the server assigns both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub due_at: Option<Timestamp>,
}

/// Body of an update-task request.
///
/// An absent field is left unchanged. For `description` and `dueAt` an
/// explicit `null` clears the value, which is why those are double options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub due_at: Option<Option<Timestamp>>,
}

impl UpdateTaskPayload {
    /// Returns `true` when no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.due_at.is_none()
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of a subtask.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubtaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
}

impl SubtaskPatch {
    /// A patch that only sets `done`.
    #[must_use]
    pub const fn done(done: bool) -> Self {
        Self {
            title: None,
            done: Some(done),
        }
    }

    /// A patch that only renames the subtask.
    #[must_use]
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            done: None,
        }
    }
}

// =============================================================================
// Mapping
// =============================================================================

/// Converts a wire task into a local task.
///
/// Enum strings are matched case-insensitively. Unknown or missing values
/// fall back to the value held by `existing`, or to the defaults
/// (`other`, `medium`, `backlog`). `completed` is derived from the status and
/// tags are carried over from `existing`, since the API does not model them.
#[must_use]
pub fn map_api_task(api: ApiTask, existing: Option<&Task>) -> Task {
    let status = parse_or(
        Some(api.status.as_str()),
        existing.map_or(TaskStatus::default(), |task| task.status),
    );
    Task {
        id: api.id,
        user_id: api.user_id,
        title: api.title,
        description: api.description,
        category: parse_or(
            api.category.as_deref(),
            existing.map_or(Category::default(), |task| task.category),
        ),
        priority: parse_or(
            Some(api.priority.as_str()),
            existing.map_or(Priority::default(), |task| task.priority),
        ),
        deadline: api.due_at.as_deref().and_then(Timestamp::parse),
        status,
        completed: status.is_completed(),
        tags: existing.map(|task| task.tags.clone()).unwrap_or_default(),
    }
}

/// Builds the create payload for a local task.
#[must_use]
pub fn build_create_payload(task: &Task) -> CreateTaskPayload {
    CreateTaskPayload {
        title: task.title.clone(),
        description: task.description.clone(),
        status: Some(task.status),
        priority: Some(task.priority),
        category: Some(task.category),
        due_at: task.deadline,
    }
}

/// Builds the update payload for a merged task.
///
/// Only wire fields named in `changes` are included. A status-driving
/// `completed` flag is sent as the resulting status. Tags are never sent.
#[must_use]
pub fn build_update_payload(changes: &TaskChanges, merged: &Task) -> UpdateTaskPayload {
    let status_touched = changes.status.is_some() || changes.completed.is_some();
    UpdateTaskPayload {
        title: changes.title.as_ref().map(|_| merged.title.clone()),
        description: changes.description.as_ref().map(|_| merged.description.clone()),
        status: status_touched.then_some(merged.status),
        priority: changes.priority.map(|_| merged.priority),
        category: changes.category.map(|_| merged.category),
        due_at: changes.deadline.map(|_| merged.deadline),
    }
}

// =============================================================================
// Task API Trait
// =============================================================================

/// Result of a persistence API call.
pub type RemoteResult<'a, T> = BoxFuture<'a, Result<T, RemoteError>>;

/// The persistence API.
///
/// Implementations are bound to one principal; task calls operate on that
/// principal's tasks only. Arguments are owned so implementations can move
/// them into the returned future.
pub trait TaskApi: Send + Sync {
    /// Lists the principal's tasks, newest first.
    fn list_tasks(&self) -> RemoteResult<'_, Vec<ApiTask>>;

    /// Creates a task and returns the stored record.
    fn create_task(&self, payload: CreateTaskPayload) -> RemoteResult<'_, ApiTask>;

    /// Applies a partial update. Fails with `NotFound` for a foreign id.
    fn update_task(&self, id: TaskId, payload: UpdateTaskPayload) -> RemoteResult<'_, ApiTask>;

    /// Deletes a task. Fails with `NotFound` for a foreign or absent id.
    fn delete_task(&self, id: TaskId) -> RemoteResult<'_, ()>;

    /// Lists a task's subtasks ordered by position.
    fn list_subtasks(&self, task_id: TaskId) -> RemoteResult<'_, Vec<Subtask>>;

    /// Appends a subtask and returns it with its server id and position.
    fn create_subtask(&self, task_id: TaskId, title: String) -> RemoteResult<'_, Subtask>;

    /// Updates a subtask. Fails with `NotFound` when absent.
    fn update_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
        patch: SubtaskPatch,
    ) -> RemoteResult<'_, Subtask>;

    /// Deletes a subtask and returns the remaining collection.
    fn delete_subtask(&self, task_id: TaskId, subtask_id: SubtaskId)
    -> RemoteResult<'_, Vec<Subtask>>;

    /// Reorders a task's subtasks and returns the reordered collection.
    fn reorder_subtasks(
        &self,
        task_id: TaskId,
        ordered_ids: Vec<SubtaskId>,
    ) -> RemoteResult<'_, Vec<Subtask>>;
}

impl<T: TaskApi + ?Sized> TaskApi for Arc<T> {
    fn list_tasks(&self) -> RemoteResult<'_, Vec<ApiTask>> {
        (**self).list_tasks()
    }

    fn create_task(&self, payload: CreateTaskPayload) -> RemoteResult<'_, ApiTask> {
        (**self).create_task(payload)
    }

    fn update_task(&self, id: TaskId, payload: UpdateTaskPayload) -> RemoteResult<'_, ApiTask> {
        (**self).update_task(id, payload)
    }

    fn delete_task(&self, id: TaskId) -> RemoteResult<'_, ()> {
        (**self).delete_task(id)
    }

    fn list_subtasks(&self, task_id: TaskId) -> RemoteResult<'_, Vec<Subtask>> {
        (**self).list_subtasks(task_id)
    }

    fn create_subtask(&self, task_id: TaskId, title: String) -> RemoteResult<'_, Subtask> {
        (**self).create_subtask(task_id, title)
    }

    fn update_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
        patch: SubtaskPatch,
    ) -> RemoteResult<'_, Subtask> {
        (**self).update_subtask(task_id, subtask_id, patch)
    }

    fn delete_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        (**self).delete_subtask(task_id, subtask_id)
    }

    fn reorder_subtasks(
        &self,
        task_id: TaskId,
        ordered_ids: Vec<SubtaskId>,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        (**self).reorder_subtasks(task_id, ordered_ids)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Tag, TagId, TaskDraft};
    use rstest::rstest;

    fn api_task(status: &str, priority: &str, category: Option<&str>) -> ApiTask {
        ApiTask {
            id: TaskId::new("t-1"),
            user_id: UserId::new("u-1"),
            title: "Write report".to_string(),
            description: None,
            status: status.to_string(),
            priority: priority.to_string(),
            category: category.map(str::to_string),
            due_at: Some("2024-05-18T17:00:00.000Z".to_string()),
        }
    }

    fn local_task() -> Task {
        TaskDraft::new("Write report")
            .with_category(Category::Study)
            .with_priority(Priority::Low)
            .with_status(TaskStatus::InReview)
            .with_tags(vec![Tag::new(TagId::new("design"), "Design")])
            .into_task(TaskId::new("t-1"), UserId::new("u-1"))
            .unwrap()
    }

    #[rstest]
    fn test_map_api_task_normalizes_upper_case_enums() {
        let task = map_api_task(api_task("IN_PROGRESS", "HIGH", Some("WORK")), None);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.category, Category::Work);
        assert!(!task.completed);
        assert!(task.tags.is_empty());
        assert!(task.deadline.is_some());
    }

    #[rstest]
    fn test_map_api_task_derives_completed() {
        let task = map_api_task(api_task("COMPLETED", "LOW", None), None);
        assert!(task.completed);
    }

    #[rstest]
    fn test_map_api_task_falls_back_to_existing_values() {
        let existing = local_task();
        let task = map_api_task(api_task("archived", "urgent", None), Some(&existing));
        assert_eq!(task.status, TaskStatus::InReview);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.category, Category::Study);
        assert_eq!(task.tags, existing.tags);
    }

    #[rstest]
    fn test_map_api_task_falls_back_to_defaults() {
        let task = map_api_task(api_task("??", "??", Some("??")), None);
        assert_eq!(task.status, TaskStatus::Backlog);
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.category, Category::Other);
    }

    #[rstest]
    fn test_map_api_task_drops_unparseable_deadline() {
        let mut api = api_task("BACKLOG", "LOW", None);
        api.due_at = Some("not a date".to_string());
        assert!(map_api_task(api, None).deadline.is_none());
    }

    #[rstest]
    fn test_create_payload_never_carries_identity() {
        let json = serde_json::to_value(build_create_payload(&local_task())).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("id"));
        assert!(!object.contains_key("userId"));
        assert!(!object.contains_key("completed"));
        assert!(!object.contains_key("tags"));
        assert_eq!(json["status"], "in_review");
        assert_eq!(json["dueAt"], serde_json::Value::Null);
    }

    #[rstest]
    fn test_update_payload_only_carries_changed_fields() {
        let changes = TaskChanges::new().title("New title");
        let merged = local_task().apply_changes(&changes).unwrap();
        let json = serde_json::to_value(build_update_payload(&changes, &merged)).unwrap();
        assert_eq!(json, serde_json::json!({ "title": "New title" }));
    }

    #[rstest]
    fn test_update_payload_sends_status_for_completed_flag() {
        let changes = TaskChanges::new().completed(true);
        let merged = local_task().apply_changes(&changes).unwrap();
        let payload = build_update_payload(&changes, &merged);
        assert_eq!(payload.status, Some(TaskStatus::Completed));
    }

    #[rstest]
    fn test_update_payload_serializes_explicit_null() {
        let changes = TaskChanges::new().deadline(None).description(None);
        let merged = local_task().apply_changes(&changes).unwrap();
        let json = serde_json::to_value(build_update_payload(&changes, &merged)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "description": null, "dueAt": null })
        );
    }

    #[rstest]
    fn test_update_payload_deserializes_absent_and_null_differently() {
        let absent: UpdateTaskPayload = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(absent.due_at, None);
        let cleared: UpdateTaskPayload = serde_json::from_str(r#"{"dueAt":null}"#).unwrap();
        assert_eq!(cleared.due_at, Some(None));
        assert!(!cleared.is_empty());
    }

    #[rstest]
    fn test_api_task_round_trips_camel_case() {
        let json = r#"{"id":"1","userId":"u","title":"t","description":null,
            "status":"BACKLOG","priority":"MEDIUM","category":"work","dueAt":null}"#;
        let task: ApiTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.user_id, UserId::new("u"));
        assert_eq!(task.category.as_deref(), Some("work"));
    }
}
