//! Local task store.
//!
//! Holds the ordered task list the UI renders. Every mutation swaps in a new
//! list, so readers get a cheap immutable snapshot and never observe a
//! half-applied change.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;

use super::error::StoreError;
use super::optimistic::Rollback;
use crate::domain::{Task, TaskId};

/// Ordered, in-memory list of tasks.
#[derive(Debug)]
pub struct LocalTaskStore {
    tasks: ArcSwap<Vec<Task>>,
    revision: watch::Sender<u64>,
}

impl Default for LocalTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    /// Creates a store holding `tasks`.
    #[must_use]
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            tasks: ArcSwap::from_pointee(tasks),
            revision,
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns a snapshot of the current list.
    #[must_use]
    pub fn tasks(&self) -> Arc<Vec<Task>> {
        self.tasks.load_full()
    }

    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.load().iter().find(|task| &task.id == id).cloned()
    }

    /// Index of the task in the list.
    #[must_use]
    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.tasks.load().iter().position(|task| &task.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.load().is_empty()
    }

    /// Subscribes to changes. The value is a revision counter bumped on every
    /// mutation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Replaces the whole list.
    pub fn set_all(&self, tasks: Vec<Task>) {
        self.tasks.store(Arc::new(tasks));
        self.bump();
    }

    /// Appends a task. Ids are not checked for uniqueness.
    pub fn insert(&self, task: Task) {
        self.update(|tasks| {
            let mut next = tasks.to_vec();
            next.push(task.clone());
            next
        });
    }

    /// Inserts a task at `index`, or appends it when `index` is past the end.
    pub fn insert_at(&self, index: usize, task: Task) {
        self.update(|tasks| {
            let mut next = tasks.to_vec();
            next.insert(index.min(next.len()), task.clone());
            next
        });
    }

    /// Replaces the task with the same id. No-op when absent.
    pub fn replace(&self, task: Task) {
        if self.position(&task.id).is_none() {
            return;
        }
        self.update(|tasks| {
            tasks
                .iter()
                .map(|existing| {
                    if existing.id == task.id {
                        task.clone()
                    } else {
                        existing.clone()
                    }
                })
                .collect()
        });
    }

    /// Removes the task with `id`, returning it. No-op when absent.
    pub fn remove(&self, id: &TaskId) -> Option<Task> {
        let removed = self.get(id)?;
        self.update(|tasks| tasks.iter().filter(|task| &task.id != id).cloned().collect());
        Some(removed)
    }

    fn update(&self, change: impl Fn(&[Task]) -> Vec<Task>) {
        self.tasks.rcu(|current| change(current));
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Writes the current list to `path` as JSON.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if serialization or the write fails.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(self.tasks.load().as_ref())?;
        std::fs::write(path.as_ref(), json)?;
        tracing::debug!(path = %path.as_ref().display(), "Saved task store");
        Ok(())
    }

    /// Replaces the list with the one stored at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be read or does not hold a
    /// task list. The store is left untouched on error.
    pub fn load_from(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let bytes = std::fs::read(path.as_ref())?;
        let tasks: Vec<Task> = serde_json::from_slice(&bytes)?;
        let count = tasks.len();
        self.set_all(tasks);
        tracing::debug!(path = %path.as_ref().display(), count, "Loaded task store");
        Ok(count)
    }
}

// =============================================================================
// Rollback Slot
// =============================================================================

/// One task of a [`LocalTaskStore`], as seen by an optimistic mutation.
///
/// The snapshot records the task together with its index so a removed task
/// comes back where it was.
#[derive(Debug)]
pub struct TaskSlot<'a> {
    store: &'a LocalTaskStore,
    id: TaskId,
}

impl<'a> TaskSlot<'a> {
    #[must_use]
    pub const fn new(store: &'a LocalTaskStore, id: TaskId) -> Self {
        Self { store, id }
    }

    #[must_use]
    pub const fn store(&self) -> &'a LocalTaskStore {
        self.store
    }
}

impl Rollback for TaskSlot<'_> {
    type Snapshot = Option<(usize, Task)>;

    fn fence_key(&self) -> String {
        format!("task:{}", self.id)
    }

    fn capture(&self) -> Self::Snapshot {
        let tasks = self.store.tasks();
        tasks
            .iter()
            .position(|task| task.id == self.id)
            .map(|index| (index, tasks[index].clone()))
    }

    fn restore(&self, snapshot: Self::Snapshot) {
        match snapshot {
            Some((_, task)) if self.store.position(&task.id).is_some() => self.store.replace(task),
            Some((index, task)) => self.store.insert_at(index, task),
            None => {
                self.store.remove(&self.id);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
