//! In-memory reference backend.
//!
//! This is the persistence layer behind the reference server and the
//! in-process [`TaskApi`] used by tests. It keeps tasks per owner and subtask
//! collections per task.
//!
//! # Features
//!
//! - Thread-safe with `Arc<RwLock<...>>`
//! - Tasks are scoped to their owner: foreign ids behave as absent
//! - Subtask collections are kept sorted by position and reordered with the
//!   same engine the client uses
//! - Optional demo seed matching the dashboard's sample workspace

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::remote::{
    ApiTask, CreateTaskPayload, RemoteError, RemoteResult, SubtaskPatch, TaskApi,
    UpdateTaskPayload,
};
use crate::domain::{
    Category, Priority, Subtask, SubtaskId, TaskId, TaskStatus, Timestamp, UserId, next_order,
    reorder, sort_by_order,
};

/// Owner of the demo workspace.
pub const DEMO_USER: &str = "demo";

// =============================================================================
// Stored Records
// =============================================================================

/// A task row as the backend stores it.
#[derive(Debug, Clone)]
struct StoredTask {
    id: TaskId,
    user_id: UserId,
    title: String,
    description: Option<String>,
    status: TaskStatus,
    priority: Priority,
    category: Option<Category>,
    due_at: Option<Timestamp>,
    /// Insertion counter; listing is newest first.
    sequence: u64,
}

impl StoredTask {
    /// Renders the row the way the production database echoes it: upper-case
    /// status and priority, lower-case category.
    fn to_api(&self) -> ApiTask {
        ApiTask {
            id: self.id.clone(),
            user_id: self.user_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            status: self.status.as_str().to_uppercase(),
            priority: self.priority.as_str().to_uppercase(),
            category: self.category.map(|category| category.as_str().to_string()),
            due_at: self.due_at.map(|due_at| due_at.to_iso_string()),
        }
    }
}

#[derive(Debug, Default)]
struct BackendState {
    tasks: Vec<StoredTask>,
    subtasks: HashMap<TaskId, Vec<Subtask>>,
    next_sequence: u64,
}

impl BackendState {
    fn owned_task_mut(&mut self, user_id: &UserId, id: &TaskId) -> Result<&mut StoredTask, RemoteError> {
        self.tasks
            .iter_mut()
            .find(|task| &task.id == id && &task.user_id == user_id)
            .ok_or_else(|| RemoteError::NotFound(format!("task {id}")))
    }

    fn insert_task(&mut self, task: StoredTask) -> ApiTask {
        let api = task.to_api();
        self.tasks.push(task);
        api
    }

    fn allocate_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    fn subtasks_of(&self, task_id: &TaskId) -> Vec<Subtask> {
        self.subtasks.get(task_id).cloned().unwrap_or_default()
    }
}

fn validated_title(title: &str) -> Result<String, RemoteError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        Err(RemoteError::Validation("Title is required".to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// Shared in-memory store for tasks and subtasks.
///
/// Cloning is cheap and every clone sees the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<RwLock<BackendState>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding the demo workspace: four tasks owned by
    /// [`DEMO_USER`] and checklists for tasks `"1"` and `"3"`.
    #[must_use]
    pub fn with_demo_data() -> Self {
        let mut state = BackendState::default();
        for task in demo_tasks() {
            let sequence = state.allocate_sequence();
            state.tasks.push(StoredTask { sequence, ..task });
        }
        for (task_id, subtasks) in demo_subtasks() {
            state.subtasks.insert(task_id, subtasks);
        }
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Returns a [`TaskApi`] acting as `user_id`.
    #[must_use]
    pub fn client(&self, user_id: UserId) -> InMemoryTaskApi {
        InMemoryTaskApi {
            backend: self.clone(),
            principal: Some(user_id),
        }
    }

    /// Returns a [`TaskApi`] without a principal; task calls are rejected.
    #[must_use]
    pub fn anonymous_client(&self) -> InMemoryTaskApi {
        InMemoryTaskApi {
            backend: self.clone(),
            principal: None,
        }
    }

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    /// Lists the user's tasks, newest first.
    pub async fn list_tasks(&self, user_id: &UserId) -> Vec<ApiTask> {
        let state = self.state.read().await;
        let mut owned: Vec<&StoredTask> = state
            .tasks
            .iter()
            .filter(|task| &task.user_id == user_id)
            .collect();
        owned.sort_by(|left, right| right.sequence.cmp(&left.sequence));
        owned.into_iter().map(StoredTask::to_api).collect()
    }

    /// Looks up one of the user's tasks.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the task is absent or foreign.
    pub async fn get_task(&self, user_id: &UserId, id: &TaskId) -> Result<ApiTask, RemoteError> {
        let state = self.state.read().await;
        state
            .tasks
            .iter()
            .find(|task| &task.id == id && &task.user_id == user_id)
            .map(StoredTask::to_api)
            .ok_or_else(|| RemoteError::NotFound(format!("task {id}")))
    }

    /// Creates a task owned by `user_id`.
    ///
    /// Missing status and priority default to backlog and medium.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Validation` for a blank title.
    pub async fn create_task(
        &self,
        user_id: &UserId,
        payload: CreateTaskPayload,
    ) -> Result<ApiTask, RemoteError> {
        let title = validated_title(&payload.title)?;
        let mut state = self.state.write().await;
        let sequence = state.allocate_sequence();
        let task = StoredTask {
            id: TaskId::generate(),
            user_id: user_id.clone(),
            title,
            description: payload.description,
            status: payload.status.unwrap_or_default(),
            priority: payload.priority.unwrap_or_default(),
            category: payload.category,
            due_at: payload.due_at,
            sequence,
        };
        tracing::debug!(task_id = %task.id, user_id = %user_id, "Task created");
        Ok(state.insert_task(task))
    }

    /// Applies a partial update to one of the user's tasks.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the task is absent or foreign, and
    /// `RemoteError::Validation` for a blank title.
    pub async fn update_task(
        &self,
        user_id: &UserId,
        id: &TaskId,
        payload: UpdateTaskPayload,
    ) -> Result<ApiTask, RemoteError> {
        let title = payload.title.as_deref().map(validated_title).transpose()?;
        let mut state = self.state.write().await;
        let task = state.owned_task_mut(user_id, id)?;

        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = payload.description {
            task.description = description;
        }
        if let Some(status) = payload.status {
            task.status = status;
        }
        if let Some(priority) = payload.priority {
            task.priority = priority;
        }
        if let Some(category) = payload.category {
            task.category = Some(category);
        }
        if let Some(due_at) = payload.due_at {
            task.due_at = due_at;
        }
        tracing::debug!(task_id = %id, user_id = %user_id, "Task updated");
        Ok(task.to_api())
    }

    /// Deletes one of the user's tasks together with its subtasks.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` if the task is absent or foreign.
    pub async fn delete_task(&self, user_id: &UserId, id: &TaskId) -> Result<(), RemoteError> {
        let mut state = self.state.write().await;
        let position = state
            .tasks
            .iter()
            .position(|task| &task.id == id && &task.user_id == user_id)
            .ok_or_else(|| RemoteError::NotFound(format!("task {id}")))?;
        state.tasks.remove(position);
        state.subtasks.remove(id);
        tracing::debug!(task_id = %id, user_id = %user_id, "Task deleted");
        Ok(())
    }

    /// Stores a task with a caller-chosen id, replacing any task with that id.
    ///
    /// Used to prepare fixtures.
    pub async fn seed_task(&self, api: ApiTask) {
        let mut state = self.state.write().await;
        state.tasks.retain(|task| task.id != api.id);
        let sequence = state.allocate_sequence();
        let task = StoredTask {
            id: api.id,
            user_id: api.user_id,
            title: api.title,
            description: api.description,
            status: api.status.parse().unwrap_or_default(),
            priority: api.priority.parse().unwrap_or_default(),
            category: api.category.and_then(|category| category.parse().ok()),
            due_at: api.due_at.as_deref().and_then(Timestamp::parse),
            sequence,
        };
        state.tasks.push(task);
    }

    // -------------------------------------------------------------------------
    // Subtasks
    // -------------------------------------------------------------------------

    /// Lists a task's subtasks in position order.
    pub async fn list_subtasks(&self, task_id: &TaskId) -> Vec<Subtask> {
        self.state.read().await.subtasks_of(task_id)
    }

    /// Replaces a task's subtask collection.
    pub async fn seed_subtasks(&self, task_id: TaskId, mut subtasks: Vec<Subtask>) {
        sort_by_order(&mut subtasks);
        self.state.write().await.subtasks.insert(task_id, subtasks);
    }

    /// Appends a subtask at the next free position.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Validation` for a blank title.
    pub async fn create_subtask(
        &self,
        task_id: &TaskId,
        title: &str,
        done: bool,
    ) -> Result<Subtask, RemoteError> {
        let title = validated_title(title)?;
        let mut state = self.state.write().await;
        let collection = state.subtasks.entry(task_id.clone()).or_default();
        let subtask = Subtask::new(
            SubtaskId::generate(),
            task_id.clone(),
            title,
            next_order(collection),
        )
        .with_done(done);
        collection.push(subtask.clone());
        sort_by_order(collection);
        tracing::debug!(task_id = %task_id, subtask_id = %subtask.id, "Subtask created");
        Ok(subtask)
    }

    /// Updates a subtask's title or completion.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::NotFound` when the subtask is absent and
    /// `RemoteError::Validation` for a blank title.
    pub async fn update_subtask(
        &self,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
        patch: SubtaskPatch,
    ) -> Result<Subtask, RemoteError> {
        let title = patch.title.as_deref().map(validated_title).transpose()?;
        let mut state = self.state.write().await;
        let subtask = state
            .subtasks
            .get_mut(task_id)
            .and_then(|collection| collection.iter_mut().find(|item| &item.id == subtask_id))
            .ok_or_else(|| RemoteError::NotFound("Subtask not found".to_string()))?;

        if let Some(title) = title {
            subtask.title = title;
        }
        if let Some(done) = patch.done {
            subtask.done = done;
        }
        Ok(subtask.clone())
    }

    /// Removes a subtask and returns the remaining collection.
    ///
    /// Deleting an absent subtask is not an error.
    pub async fn delete_subtask(&self, task_id: &TaskId, subtask_id: &SubtaskId) -> Vec<Subtask> {
        let mut state = self.state.write().await;
        if let Some(collection) = state.subtasks.get_mut(task_id) {
            collection.retain(|item| &item.id != subtask_id);
        }
        state.subtasks_of(task_id)
    }

    /// Reorders a task's subtasks and returns the new collection.
    pub async fn reorder_subtasks(&self, task_id: &TaskId, ordered_ids: &[SubtaskId]) -> Vec<Subtask> {
        let mut state = self.state.write().await;
        let reordered = reorder(&state.subtasks_of(task_id), ordered_ids);
        if !reordered.is_empty() {
            state.subtasks.insert(task_id.clone(), reordered.clone());
        }
        tracing::debug!(task_id = %task_id, count = reordered.len(), "Subtasks reordered");
        reordered
    }
}

// =============================================================================
// In-Process Client
// =============================================================================

/// [`TaskApi`] over an [`InMemoryBackend`], bound to a principal.
#[derive(Debug, Clone)]
pub struct InMemoryTaskApi {
    backend: InMemoryBackend,
    principal: Option<UserId>,
}

impl InMemoryTaskApi {
    fn principal(&self) -> Result<UserId, RemoteError> {
        self.principal.clone().ok_or(RemoteError::Unauthorized)
    }

    /// The backend this client talks to.
    #[must_use]
    pub const fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }
}

impl TaskApi for InMemoryTaskApi {
    fn list_tasks(&self) -> RemoteResult<'_, Vec<ApiTask>> {
        Box::pin(async move {
            let user_id = self.principal()?;
            Ok(self.backend.list_tasks(&user_id).await)
        })
    }

    fn create_task(&self, payload: CreateTaskPayload) -> RemoteResult<'_, ApiTask> {
        Box::pin(async move {
            let user_id = self.principal()?;
            self.backend.create_task(&user_id, payload).await
        })
    }

    fn update_task(&self, id: TaskId, payload: UpdateTaskPayload) -> RemoteResult<'_, ApiTask> {
        Box::pin(async move {
            let user_id = self.principal()?;
            self.backend.update_task(&user_id, &id, payload).await
        })
    }

    fn delete_task(&self, id: TaskId) -> RemoteResult<'_, ()> {
        Box::pin(async move {
            let user_id = self.principal()?;
            self.backend.delete_task(&user_id, &id).await
        })
    }

    fn list_subtasks(&self, task_id: TaskId) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move { Ok(self.backend.list_subtasks(&task_id).await) })
    }

    fn create_subtask(&self, task_id: TaskId, title: String) -> RemoteResult<'_, Subtask> {
        Box::pin(async move { self.backend.create_subtask(&task_id, &title, false).await })
    }

    fn update_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
        patch: SubtaskPatch,
    ) -> RemoteResult<'_, Subtask> {
        Box::pin(async move {
            self.backend
                .update_subtask(&task_id, &subtask_id, patch)
                .await
        })
    }

    fn delete_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move { Ok(self.backend.delete_subtask(&task_id, &subtask_id).await) })
    }

    fn reorder_subtasks(
        &self,
        task_id: TaskId,
        ordered_ids: Vec<SubtaskId>,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move { Ok(self.backend.reorder_subtasks(&task_id, &ordered_ids).await) })
    }
}

// =============================================================================
// Demo Workspace
// =============================================================================

fn demo_task(
    id: &str,
    title: &str,
    description: &str,
    category: Category,
    priority: Priority,
    due_at: &str,
    status: TaskStatus,
) -> StoredTask {
    StoredTask {
        id: TaskId::new(id),
        user_id: UserId::new(DEMO_USER),
        title: title.to_string(),
        description: Some(description.to_string()),
        status,
        priority,
        category: Some(category),
        due_at: Timestamp::parse(due_at),
        sequence: 0,
    }
}

fn demo_tasks() -> Vec<StoredTask> {
    vec![
        demo_task(
            "1",
            "Design onboarding flow",
            "Map out wireframes and define happy path for new users.",
            Category::Work,
            Priority::High,
            "2024-05-18T17:00:00.000Z",
            TaskStatus::InProgress,
        ),
        demo_task(
            "2",
            "Study for data structures exam",
            "Review graphs and dynamic programming problems.",
            Category::Study,
            Priority::Medium,
            "2024-05-21T15:00:00.000Z",
            TaskStatus::Backlog,
        ),
        demo_task(
            "3",
            "Weekly meal prep",
            "Plan balanced meals and buy groceries for the week.",
            Category::Personal,
            Priority::Low,
            "2024-05-19T19:30:00.000Z",
            TaskStatus::InReview,
        ),
        demo_task(
            "4",
            "Yoga session",
            "45-minute restorative flow to wind down.",
            Category::Wellness,
            Priority::Low,
            "2024-05-19T12:00:00.000Z",
            TaskStatus::Completed,
        ),
    ]
}

fn demo_subtasks() -> Vec<(TaskId, Vec<Subtask>)> {
    let item = |task: &str, id: &str, title: &str, done: bool, order: u32| {
        Subtask::new(SubtaskId::new(id), TaskId::new(task), title, order).with_done(done)
    };
    vec![
        (
            TaskId::new("1"),
            vec![
                item("1", "1-1", "Draft user journey", true, 0),
                item("1", "1-2", "Review with PM", false, 1),
                item("1", "1-3", "Prepare mockups", false, 2),
            ],
        ),
        (
            TaskId::new("3"),
            vec![
                item("3", "3-1", "Plan recipes", true, 0),
                item("3", "3-2", "Create shopping list", false, 1),
            ],
        ),
    ]
}

// =============================================================================
// Tests
// =============================================================================
