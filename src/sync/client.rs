//! A ready-to-use bundle of both stores and the coordinator.

use std::sync::Arc;

use super::coordinator::SyncCoordinator;
use super::optimistic::{Fence, FencingMode};
use super::session::{Session, StaticSession};
use super::subtask_store::LocalSubtaskStore;
use super::task_store::LocalTaskStore;
use crate::infrastructure::{ClientConfig, HttpTaskApi, TaskApi};

/// Everything a front end needs to read and mutate tasks and subtasks.
///
/// Both stores share one [`Fence`], so the fencing mode applies to every
/// mutation made through this client.
#[derive(Debug)]
pub struct SyncClient {
    coordinator: SyncCoordinator,
    subtasks: Arc<LocalSubtaskStore>,
}

impl SyncClient {
    #[must_use]
    pub fn new(api: Arc<dyn TaskApi>, session: Arc<dyn Session>, fencing: FencingMode) -> Self {
        let fence = Fence::new(fencing);
        let tasks = Arc::new(LocalTaskStore::new());
        let subtasks = Arc::new(LocalSubtaskStore::new(Arc::clone(&api), fence.clone()));
        Self {
            coordinator: SyncCoordinator::new(tasks, api, session, fence)
                .with_subtasks(Arc::clone(&subtasks)),
            subtasks,
        }
    }

    /// Builds an HTTP-backed client. The configured user, if any, is the
    /// session for the client's whole lifetime.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        let session = config
            .user_id
            .clone()
            .map_or_else(StaticSession::anonymous, StaticSession::authenticated);
        tracing::info!(
            base_url = %config.base_url,
            authenticated = session.is_authenticated(),
            fencing = %config.fencing,
            "Sync client configured"
        );
        Self::new(
            Arc::new(HttpTaskApi::from_config(config)),
            Arc::new(session),
            config.fencing,
        )
    }

    #[must_use]
    pub const fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    #[must_use]
    pub const fn tasks(&self) -> &Arc<LocalTaskStore> {
        self.coordinator.store()
    }

    #[must_use]
    pub const fn subtasks(&self) -> &Arc<LocalSubtaskStore> {
        &self.subtasks
    }
}
