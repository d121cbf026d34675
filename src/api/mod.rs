//! API module for HTTP handlers.
//!
//! This module contains the reference server's route table and handlers.

pub mod dto;
pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::{get, patch, put};

pub use dto::{
    CreateSubtaskRequest, HealthResponse, ReorderRequest, SubtaskListResponse, SuccessResponse,
};
pub use error::{ApiError, ApiErrorResponse};
pub use handlers::{
    AppState, Principal, create_subtask, create_task, delete_subtask, delete_task, get_task,
    health_check, list_subtasks, list_tasks, reorder_subtasks, update_subtask, update_task,
};

/// Builds the application router.
///
/// Layers (tracing, CORS) are left to the caller.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Tasks
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{task_id}",
            get(get_task).patch(update_task).delete(delete_task),
        )
        // Subtasks
        .route(
            "/api/tasks/{task_id}/subtasks",
            get(list_subtasks).post(create_subtask),
        )
        .route(
            "/api/tasks/{task_id}/subtasks/reorder",
            put(reorder_subtasks),
        )
        .route(
            "/api/tasks/{task_id}/subtasks/{subtask_id}",
            patch(update_subtask).delete(delete_subtask),
        )
        .with_state(state)
}
