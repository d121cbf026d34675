//! Task mutations against the local store and the persistence API.
//!
//! Each operation has two branches. Without a signed-in user the change is
//! committed to the local store and nothing leaves the process. With one, the
//! change goes through [`OptimisticMutation`]: applied locally, sent, then
//! replaced with the server's record or rolled back.

use std::collections::HashMap;
use std::sync::Arc;

use super::error::SyncError;
use super::optimistic::{Fence, OptimisticMutation, SupersedeToken};
use super::session::Session;
use super::subtask_store::LocalSubtaskStore;
use super::task_store::{LocalTaskStore, TaskSlot};
use crate::domain::{Task, TaskChanges, TaskDraft, TaskId, TaskStatus, UserId};
use crate::infrastructure::{TaskApi, build_create_payload, build_update_payload, map_api_task};

/// Runs task mutations for one client.
pub struct SyncCoordinator {
    store: Arc<LocalTaskStore>,
    api: Arc<dyn TaskApi>,
    session: Arc<dyn Session>,
    fence: Fence,
    subtasks: Option<Arc<LocalSubtaskStore>>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncCoordinator")
            .field("store", &self.store)
            .field("authenticated", &self.session.is_authenticated())
            .field("fence", &self.fence)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(
        store: Arc<LocalTaskStore>,
        api: Arc<dyn TaskApi>,
        session: Arc<dyn Session>,
        fence: Fence,
    ) -> Self {
        Self {
            store,
            api,
            session,
            fence,
            subtasks: None,
        }
    }

    /// Attaches the subtask store whose cache a task delete clears.
    #[must_use]
    pub fn with_subtasks(self, subtasks: Arc<LocalSubtaskStore>) -> Self {
        Self {
            subtasks: Some(subtasks),
            ..self
        }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<LocalTaskStore> {
        &self.store
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates a task.
    ///
    /// Offline, the task gets a generated id, belongs to the `local` user and
    /// is committed at once. Online, it is inserted when the server answers,
    /// keeping the draft's tags since the API does not store them.
    ///
    /// # Errors
    ///
    /// - `SyncError::Validation` for a blank title; nothing is changed
    /// - `SyncError::Remote` when the server rejects the task
    pub async fn create(&self, draft: TaskDraft) -> Result<Task, SyncError> {
        draft.validate()?;

        let Some(user_id) = self.session.user_id() else {
            let task = draft.into_task(TaskId::generate(), UserId::local())?;
            self.store.insert(task.clone());
            tracing::info!(task_id = %task.id, "Task created locally");
            return Ok(task);
        };

        let local = draft.into_task(TaskId::generate(), user_id)?;
        let payload = build_create_payload(&local);
        let slot = TaskSlot::new(&self.store, local.id.clone());

        let task = OptimisticMutation::begin(slot, &self.fence, |_| {})
            .settle(self.api.create_task(payload), |slot, created| {
                let task = map_api_task(created, Some(&local));
                slot.store().insert(task.clone());
                task
            })
            .await?;

        tracing::info!(task_id = %task.id, "Task created");
        Ok(task)
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Applies `changes` to a task.
    ///
    /// Only the wire fields named in `changes` are sent. A change that touches
    /// no wire field (tags only) stays local.
    ///
    /// # Errors
    ///
    /// - `SyncError::TaskNotFound` if the task is not in the local store
    /// - `SyncError::Validation` if the merged task is invalid
    /// - `SyncError::Remote` after reverting to the pre-update record
    pub async fn update(&self, id: &TaskId, changes: TaskChanges) -> Result<Task, SyncError> {
        let current = self
            .store
            .get(id)
            .ok_or_else(|| SyncError::TaskNotFound(id.clone()))?;
        let merged = current.apply_changes(&changes)?;

        let payload = build_update_payload(&changes, &merged);
        if !self.session.is_authenticated() || payload.is_empty() {
            self.store.replace(merged.clone());
            tracing::debug!(task_id = %id, "Task updated locally");
            return Ok(merged);
        }

        let mutation = OptimisticMutation::begin(
            TaskSlot::new(&self.store, id.clone()),
            &self.fence,
            |slot| slot.store().replace(merged.clone()),
        );

        mutation
            .settle(self.api.update_task(id.clone(), payload), |slot, updated| {
                let held = slot.store().get(id);
                let task = map_api_task(updated, held.as_ref().or(Some(&merged)));
                slot.store().replace(task.clone());
                task
            })
            .await
    }

    /// Moves a task to `status`. `completed` follows.
    ///
    /// # Errors
    ///
    /// As [`update`](Self::update).
    pub async fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task, SyncError> {
        self.update(id, TaskChanges::new().status(status)).await
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Removes a task. Once the removal commits, the attached subtask store
    /// forgets the task's collection.
    ///
    /// # Errors
    ///
    /// - `SyncError::TaskNotFound` if the task is not in the local store
    /// - `SyncError::Remote` after putting the task back at its old index
    pub async fn delete(&self, id: &TaskId) -> Result<(), SyncError> {
        if self.store.position(id).is_none() {
            return Err(SyncError::TaskNotFound(id.clone()));
        }

        if !self.session.is_authenticated() {
            self.store.remove(id);
            self.forget_subtasks(id);
            tracing::info!(task_id = %id, "Task deleted locally");
            return Ok(());
        }

        let mutation = OptimisticMutation::begin(
            TaskSlot::new(&self.store, id.clone()),
            &self.fence,
            |slot| {
                slot.store().remove(id);
            },
        );

        mutation
            .settle(self.api.delete_task(id.clone()), |_, ()| ())
            .await?;
        self.forget_subtasks(id);
        tracing::info!(task_id = %id, "Task deleted");
        Ok(())
    }

    fn forget_subtasks(&self, id: &TaskId) {
        if let Some(subtasks) = &self.subtasks {
            subtasks.forget(id);
        }
    }

    // =========================================================================
    // Load
    // =========================================================================

    /// Replaces the local list with the server's.
    ///
    /// Each wire task is mapped against the record currently held for its id,
    /// so local tags survive. Offline this is a no-op returning the local
    /// list.
    ///
    /// # Errors
    ///
    /// - `SyncError::Remote` when the read fails; the store is untouched
    /// - `SyncError::Superseded` when `token` was superseded in the meantime
    pub async fn load_all(&self, token: &SupersedeToken) -> Result<Arc<Vec<Task>>, SyncError> {
        if !self.session.is_authenticated() {
            return Ok(self.store.tasks());
        }

        let fetched = self.api.list_tasks().await.map_err(|error| {
            tracing::warn!(%error, "Failed to load tasks");
            SyncError::from(error)
        })?;

        if token.is_superseded() {
            tracing::debug!("Discarding superseded task load");
            return Err(SyncError::Superseded);
        }

        let held = self.store.tasks();
        let by_id: HashMap<&TaskId, &Task> = held.iter().map(|task| (&task.id, task)).collect();
        let tasks: Vec<Task> = fetched
            .into_iter()
            .map(|api| {
                let existing = by_id.get(&api.id).copied();
                map_api_task(api, existing)
            })
            .collect();

        tracing::info!(count = tasks.len(), "Tasks loaded");
        self.store.set_all(tasks);
        Ok(self.store.tasks())
    }
}

// =============================================================================
// Tests
// =============================================================================
