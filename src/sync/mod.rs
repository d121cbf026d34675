//! The optimistic sync layer.
//!
//! This module keeps the local task and subtask stores in step with the
//! persistence API. Every mutation is applied locally first, then confirmed
//! with the server's record or rolled back.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod optimistic;
pub mod session;
pub mod subtask_store;
pub mod task_store;

pub use client::SyncClient;
pub use coordinator::SyncCoordinator;
pub use error::{StoreError, SyncError};
pub use optimistic::{Fence, FencingMode, OptimisticMutation, Rollback, SupersedeToken, Ticket};
pub use session::{Session, SharedSession, StaticSession};
pub use subtask_store::LocalSubtaskStore;
pub use task_store::{LocalTaskStore, TaskSlot};
