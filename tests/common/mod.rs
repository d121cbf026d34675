//! Common test helpers for integration tests.
//!
//! This module provides fixtures for building sync clients against the
//! in-memory backend, and [`GatedApi`], a `TaskApi` decorator whose calls
//! resolve only when the test opens their gate.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate, and not every file uses every
//! helper.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use flowtask_sync::domain::{Subtask, SubtaskId, TaskId, UserId};
use flowtask_sync::infrastructure::{
    ApiTask, CreateTaskPayload, InMemoryBackend, InMemoryTaskApi, RemoteError, RemoteResult,
    SubtaskPatch, TaskApi, UpdateTaskPayload,
};
use flowtask_sync::sync::{
    Fence, FencingMode, LocalSubtaskStore, LocalTaskStore, StaticSession, SyncCoordinator,
};

pub const ALICE: &str = "alice";

pub fn alice() -> UserId {
    UserId::new(ALICE)
}

// =============================================================================
// Gated API
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Gate {
    Pass,
    Fail,
}

/// Holds every call until the test releases or fails it.
///
/// Calls are numbered in the order they are issued, starting at 0. A released
/// call is forwarded to the inner API; a failed one never reaches it.
pub struct GatedApi<A> {
    inner: A,
    gates: Mutex<Vec<Option<oneshot::Sender<Gate>>>>,
    settled: Mutex<usize>,
}

impl<A: TaskApi> GatedApi<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            gates: Mutex::new(Vec::new()),
            settled: Mutex::new(0),
        }
    }

    /// Number of calls issued so far.
    pub fn calls(&self) -> usize {
        self.gates.lock().len()
    }

    /// Number of calls that have produced their result.
    pub fn settled(&self) -> usize {
        *self.settled.lock()
    }

    pub fn release(&self, call: usize) {
        self.open(call, Gate::Pass);
    }

    pub fn fail(&self, call: usize) {
        self.open(call, Gate::Fail);
    }

    fn open(&self, call: usize, gate: Gate) {
        let sender = self.gates.lock().get_mut(call).and_then(Option::take);
        if let Some(sender) = sender {
            let _ = sender.send(gate);
        }
    }

    fn gate(&self) -> oneshot::Receiver<Gate> {
        let (sender, receiver) = oneshot::channel();
        self.gates.lock().push(Some(sender));
        receiver
    }

    fn gated<'a, T: Send + 'a>(
        &'a self,
        call: impl Future<Output = Result<T, RemoteError>> + Send + 'a,
    ) -> RemoteResult<'a, T> {
        let gate = self.gate();
        Box::pin(async move {
            let result = match gate.await {
                Ok(Gate::Pass) => call.await,
                Ok(Gate::Fail) | Err(_) => Err(RemoteError::Transport("gate failed".to_string())),
            };
            *self.settled.lock() += 1;
            result
        })
    }
}

impl<A: TaskApi> TaskApi for GatedApi<A> {
    fn list_tasks(&self) -> RemoteResult<'_, Vec<ApiTask>> {
        self.gated(self.inner.list_tasks())
    }

    fn create_task(&self, payload: CreateTaskPayload) -> RemoteResult<'_, ApiTask> {
        self.gated(self.inner.create_task(payload))
    }

    fn update_task(&self, id: TaskId, payload: UpdateTaskPayload) -> RemoteResult<'_, ApiTask> {
        self.gated(self.inner.update_task(id, payload))
    }

    fn delete_task(&self, id: TaskId) -> RemoteResult<'_, ()> {
        self.gated(self.inner.delete_task(id))
    }

    fn list_subtasks(&self, task_id: TaskId) -> RemoteResult<'_, Vec<Subtask>> {
        self.gated(self.inner.list_subtasks(task_id))
    }

    fn create_subtask(&self, task_id: TaskId, title: String) -> RemoteResult<'_, Subtask> {
        self.gated(self.inner.create_subtask(task_id, title))
    }

    fn update_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
        patch: SubtaskPatch,
    ) -> RemoteResult<'_, Subtask> {
        self.gated(self.inner.update_subtask(task_id, subtask_id, patch))
    }

    fn delete_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        self.gated(self.inner.delete_subtask(task_id, subtask_id))
    }

    fn reorder_subtasks(
        &self,
        task_id: TaskId,
        ordered_ids: Vec<SubtaskId>,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        self.gated(self.inner.reorder_subtasks(task_id, ordered_ids))
    }
}

/// Yields until `api` has seen `count` calls.
pub async fn wait_for_calls<A: TaskApi>(api: &GatedApi<A>, count: usize) {
    while api.calls() < count {
        tokio::task::yield_now().await;
    }
}

/// Yields until `count` calls of `api` have produced their result.
pub async fn wait_for_settled<A: TaskApi>(api: &GatedApi<A>, count: usize) {
    while api.settled() < count {
        tokio::task::yield_now().await;
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A coordinator for `alice` over `api`.
pub fn online_coordinator(api: Arc<dyn TaskApi>, mode: FencingMode) -> SyncCoordinator {
    SyncCoordinator::new(
        Arc::new(LocalTaskStore::new()),
        api,
        Arc::new(StaticSession::authenticated(alice())),
        Fence::new(mode),
    )
}

/// A coordinator without a signed-in user.
pub fn offline_coordinator(api: Arc<dyn TaskApi>) -> SyncCoordinator {
    SyncCoordinator::new(
        Arc::new(LocalTaskStore::new()),
        api,
        Arc::new(StaticSession::anonymous()),
        Fence::default(),
    )
}

/// Subtasks `ids` of `task_id` at positions `0..n`.
pub fn subtasks(task_id: &str, ids: &[&str]) -> Vec<Subtask> {
    ids.iter()
        .zip(0_u32..)
        .map(|(id, order)| {
            Subtask::new(
                SubtaskId::new(*id),
                TaskId::new(task_id),
                format!("Subtask {id}"),
                order,
            )
        })
        .collect()
}

/// A gated client for `alice` over a fresh backend, plus that backend.
pub fn gated_backend() -> (InMemoryBackend, Arc<GatedApi<InMemoryTaskApi>>) {
    let backend = InMemoryBackend::new();
    let api = Arc::new(GatedApi::new(backend.client(alice())));
    (backend, api)
}

/// A subtask store over `api` seeded, locally and remotely, with `items`.
pub async fn seeded_subtask_store(
    backend: &InMemoryBackend,
    api: Arc<dyn TaskApi>,
    mode: FencingMode,
    task_id: &str,
    items: Vec<Subtask>,
) -> LocalSubtaskStore {
    backend
        .seed_subtasks(TaskId::new(task_id), items.clone())
        .await;
    let store = LocalSubtaskStore::new(api, Fence::new(mode));
    store.seed(TaskId::new(task_id), items);
    store
}
