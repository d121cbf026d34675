//! Local subtask store.
//!
//! Subtasks are loaded lazily per task and cached. Each collection is kept
//! sorted by position. Mutations are optimistic: the collection changes
//! immediately, and if the remote call fails the whole collection of that
//! task is restored to what it was before the mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use super::error::SyncError;
use super::optimistic::{Fence, OptimisticMutation, Rollback, SupersedeToken};
use crate::domain::{Subtask, SubtaskId, TaskId, next_order, reorder, sorted_by_order};
use crate::infrastructure::{SubtaskPatch, TaskApi};

#[derive(Debug, Default)]
struct SubtaskState {
    collections: HashMap<TaskId, Arc<Vec<Subtask>>>,
    loading: HashSet<TaskId>,
    loaded: HashSet<TaskId>,
}

/// Per-task subtask collections with loading flags.
pub struct LocalSubtaskStore {
    api: Arc<dyn TaskApi>,
    state: RwLock<SubtaskState>,
    fence: Fence,
    revision: watch::Sender<u64>,
}

impl std::fmt::Debug for LocalSubtaskStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LocalSubtaskStore")
            .field("state", &self.state)
            .field("fence", &self.fence)
            .finish_non_exhaustive()
    }
}

impl LocalSubtaskStore {
    #[must_use]
    pub fn new(api: Arc<dyn TaskApi>, fence: Fence) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            api,
            state: RwLock::new(SubtaskState::default()),
            fence,
            revision,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns the cached collection of a task, empty if never loaded.
    #[must_use]
    pub fn subtasks(&self, task_id: &TaskId) -> Arc<Vec<Subtask>> {
        self.state
            .read()
            .collections
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_loading(&self, task_id: &TaskId) -> bool {
        self.state.read().loading.contains(task_id)
    }

    #[must_use]
    pub fn is_loaded(&self, task_id: &TaskId) -> bool {
        self.state.read().loaded.contains(task_id)
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Stores a collection without a remote call and marks it loaded.
    pub fn seed(&self, task_id: TaskId, subtasks: Vec<Subtask>) {
        {
            let mut state = self.state.write();
            state
                .collections
                .insert(task_id.clone(), Arc::new(sorted_by_order(&subtasks)));
            state.loaded.insert(task_id);
        }
        self.bump();
    }

    /// Drops everything held for a task: its collection and both flags.
    pub fn forget(&self, task_id: &TaskId) {
        let removed = {
            let mut state = self.state.write();
            let collection = state.collections.remove(task_id).is_some();
            let loaded = state.loaded.remove(task_id);
            let loading = state.loading.remove(task_id);
            collection || loaded || loading
        };
        if removed {
            tracing::debug!(task_id = %task_id, "Forgot subtasks");
            self.bump();
        }
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    /// Loads the subtasks of a task.
    ///
    /// Served from cache when already loaded, unless `force` is set.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` when the read fails. The cached collection
    /// and the loaded flag are left untouched in that case.
    pub async fn fetch(&self, task_id: &TaskId, force: bool) -> Result<Arc<Vec<Subtask>>, SyncError> {
        self.fetch_guarded(task_id, force, &SupersedeToken::new())
            .await
    }

    /// Like [`fetch`](Self::fetch), but drops the response if `token` was
    /// superseded while the read was in flight.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Superseded` for a dropped response, otherwise as
    /// [`fetch`](Self::fetch).
    pub async fn fetch_guarded(
        &self,
        task_id: &TaskId,
        force: bool,
        token: &SupersedeToken,
    ) -> Result<Arc<Vec<Subtask>>, SyncError> {
        if !force && self.is_loaded(task_id) {
            return Ok(self.subtasks(task_id));
        }

        self.state.write().loading.insert(task_id.clone());
        self.bump();

        let outcome = self.api.list_subtasks(task_id.clone()).await;

        let result = {
            let mut state = self.state.write();
            state.loading.remove(task_id);
            match outcome {
                Ok(_) if token.is_superseded() => {
                    tracing::debug!(task_id = %task_id, "Discarding superseded subtask fetch");
                    Err(SyncError::Superseded)
                }
                Ok(subtasks) => {
                    let subtasks = Arc::new(sorted_by_order(&subtasks));
                    state.collections.insert(task_id.clone(), Arc::clone(&subtasks));
                    state.loaded.insert(task_id.clone());
                    Ok(subtasks)
                }
                Err(error) => {
                    tracing::warn!(task_id = %task_id, %error, "Failed to fetch subtasks");
                    Err(error.into())
                }
            }
        };
        self.bump();
        result
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Appends a subtask.
    ///
    /// A blank title is ignored and yields `Ok(None)`. The subtask appears at
    /// once under a provisional `temp-` id; on success that record is
    /// replaced by the server's.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` after restoring the collection.
    pub async fn add(&self, task_id: &TaskId, title: &str) -> Result<Option<Subtask>, SyncError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(None);
        }

        let provisional_id = SubtaskId::provisional();
        let slot = SubtaskSlot::new(self, task_id.clone(), format!("subtask:{provisional_id}"));
        let mutation = OptimisticMutation::begin(slot, &self.fence, |slot| {
            slot.store.update_collection(task_id, true, |subtasks| {
                let order = next_order(subtasks);
                let mut next = subtasks.to_vec();
                next.push(Subtask::new(
                    provisional_id.clone(),
                    task_id.clone(),
                    title,
                    order,
                ));
                next
            });
        });

        let created = mutation
            .settle(
                self.api.create_subtask(task_id.clone(), title.to_string()),
                |slot, created| {
                    slot.store.update_collection(task_id, true, |subtasks| {
                        let mut next: Vec<Subtask> = subtasks
                            .iter()
                            .filter(|subtask| subtask.id != provisional_id && subtask.id != created.id)
                            .cloned()
                            .collect();
                        next.push(created.clone());
                        sorted_by_order(&next)
                    });
                    created
                },
            )
            .await?;

        tracing::debug!(task_id = %task_id, subtask_id = %created.id, "Subtask added");
        Ok(Some(created))
    }

    /// Marks a subtask done or open.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` after restoring the collection.
    pub async fn toggle_done(
        &self,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
        done: bool,
    ) -> Result<Subtask, SyncError> {
        let slot = SubtaskSlot::new(self, task_id.clone(), format!("subtask:{subtask_id}"));
        let mutation = OptimisticMutation::begin(slot, &self.fence, |slot| {
            slot.store.update_collection(task_id, false, |subtasks| {
                subtasks
                    .iter()
                    .map(|subtask| {
                        if &subtask.id == subtask_id {
                            subtask.clone().with_done(done)
                        } else {
                            subtask.clone()
                        }
                    })
                    .collect()
            });
        });

        mutation
            .settle(
                self.api.update_subtask(
                    task_id.clone(),
                    subtask_id.clone(),
                    SubtaskPatch::done(done),
                ),
                |slot, updated| {
                    slot.store.update_collection(task_id, false, |subtasks| {
                        let next: Vec<Subtask> = subtasks
                            .iter()
                            .map(|subtask| {
                                if subtask.id == updated.id {
                                    updated.clone()
                                } else {
                                    subtask.clone()
                                }
                            })
                            .collect();
                        sorted_by_order(&next)
                    });
                    updated
                },
            )
            .await
    }

    /// Deletes a subtask and adopts the server's remaining collection.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` after restoring the collection.
    pub async fn delete(
        &self,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
    ) -> Result<Arc<Vec<Subtask>>, SyncError> {
        let slot = SubtaskSlot::new(self, task_id.clone(), format!("subtask:{subtask_id}"));
        let mutation = OptimisticMutation::begin(slot, &self.fence, |slot| {
            slot.store.update_collection(task_id, false, |subtasks| {
                subtasks
                    .iter()
                    .filter(|subtask| &subtask.id != subtask_id)
                    .cloned()
                    .collect()
            });
        });

        mutation
            .settle(
                self.api.delete_subtask(task_id.clone(), subtask_id.clone()),
                |slot, remaining| slot.store.adopt(task_id, &remaining),
            )
            .await
    }

    /// Moves subtasks into the order given by `ordered_ids`.
    ///
    /// The local collection is rearranged with [`reorder`], so ids the task
    /// does not have are ignored and unlisted subtasks move to the end.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` after restoring the collection.
    pub async fn reorder(
        &self,
        task_id: &TaskId,
        ordered_ids: &[SubtaskId],
    ) -> Result<Arc<Vec<Subtask>>, SyncError> {
        let slot = SubtaskSlot::new(self, task_id.clone(), format!("subtasks:{task_id}"));
        let mutation = OptimisticMutation::begin(slot, &self.fence, |slot| {
            slot.store
                .update_collection(task_id, false, |subtasks| reorder(subtasks, ordered_ids));
        });

        mutation
            .settle(
                self.api
                    .reorder_subtasks(task_id.clone(), ordered_ids.to_vec()),
                |slot, reordered| slot.store.adopt(task_id, &reordered),
            )
            .await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn update_collection(
        &self,
        task_id: &TaskId,
        mark_loaded: bool,
        change: impl FnOnce(&[Subtask]) -> Vec<Subtask>,
    ) {
        {
            let mut state = self.state.write();
            let current = state.collections.get(task_id).cloned().unwrap_or_default();
            state
                .collections
                .insert(task_id.clone(), Arc::new(change(&current)));
            if mark_loaded {
                state.loaded.insert(task_id.clone());
            }
        }
        self.bump();
    }

    fn adopt(&self, task_id: &TaskId, subtasks: &[Subtask]) -> Arc<Vec<Subtask>> {
        let sorted = Arc::new(sorted_by_order(subtasks));
        {
            let mut state = self.state.write();
            state.collections.insert(task_id.clone(), Arc::clone(&sorted));
            state.loaded.insert(task_id.clone());
        }
        self.bump();
        sorted
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

// =============================================================================
// Rollback Slot
// =============================================================================

/// The collection of one task. The fence key names the entity the mutation
/// targets: a single subtask, or the whole collection for a reorder.
struct SubtaskSlot<'a> {
    store: &'a LocalSubtaskStore,
    task_id: TaskId,
    key: String,
}

impl<'a> SubtaskSlot<'a> {
    const fn new(store: &'a LocalSubtaskStore, task_id: TaskId, key: String) -> Self {
        Self {
            store,
            task_id,
            key,
        }
    }
}

impl Rollback for SubtaskSlot<'_> {
    type Snapshot = Option<Arc<Vec<Subtask>>>;

    fn fence_key(&self) -> String {
        self.key.clone()
    }

    fn capture(&self) -> Self::Snapshot {
        self.store
            .state
            .read()
            .collections
            .get(&self.task_id)
            .cloned()
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        {
            let mut state = self.store.state.write();
            match snapshot {
                Some(subtasks) => {
                    state.collections.insert(self.task_id.clone(), subtasks);
                }
                None => {
                    state.collections.remove(&self.task_id);
                }
            }
        }
        self.store.bump();
    }
}

// =============================================================================
// Tests
// =============================================================================
