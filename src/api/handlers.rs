//! HTTP handlers for the persistence API.
//!
//! Task routes act on behalf of the user named in the `x-user-id` header and
//! answer 401 without it. Subtask routes are keyed by task id alone.

use axum::{
    Json,
    extract::{FromRequestParts, Path, State},
    http::{StatusCode, request::Parts},
};

use super::dto::{
    CreateSubtaskRequest, HealthResponse, ReorderRequest, SubtaskListResponse, SuccessResponse,
};
use super::error::ApiErrorResponse;
use crate::domain::{Subtask, SubtaskId, TaskId, UserId};
use crate::infrastructure::{
    ApiTask, CreateTaskPayload, InMemoryBackend, ServerConfig, SubtaskPatch, USER_HEADER,
    UpdateTaskPayload,
};

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub backend: InMemoryBackend,
}

impl AppState {
    #[must_use]
    pub const fn new(backend: InMemoryBackend) -> Self {
        Self { backend }
    }

    /// Creates the state described by `config`, seeding the demo workspace
    /// when asked to.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        if config.seed_demo_data {
            tracing::info!("Seeding demo data");
            Self::new(InMemoryBackend::with_demo_data())
        } else {
            Self::default()
        }
    }
}

// =============================================================================
// Principal
// =============================================================================

/// The user a request acts for, taken from the `x-user-id` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(UserId::new(value)))
            .ok_or_else(ApiErrorResponse::unauthorized)
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check endpoint.
///
/// ```json
/// { "status": "healthy", "version": "0.1.0" }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Task Handlers
// =============================================================================

/// `GET /api/tasks`: the caller's tasks, newest first.
pub async fn list_tasks(
    State(state): State<AppState>,
    Principal(user_id): Principal,
) -> Json<Vec<ApiTask>> {
    Json(state.backend.list_tasks(&user_id).await)
}

/// `POST /api/tasks`
///
/// # Errors
///
/// 400 for a blank title.
pub async fn create_task(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<ApiTask>), ApiErrorResponse> {
    let task = state.backend.create_task(&user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// `GET /api/tasks/{task_id}`
///
/// # Errors
///
/// 404 if the task is absent or belongs to someone else.
pub async fn get_task(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(task_id): Path<String>,
) -> Result<Json<ApiTask>, ApiErrorResponse> {
    let task = state
        .backend
        .get_task(&user_id, &TaskId::new(task_id))
        .await?;
    Ok(Json(task))
}

/// `PATCH /api/tasks/{task_id}`
///
/// # Errors
///
/// 404 if the task is absent or foreign, 400 for a blank title.
pub async fn update_task(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(task_id): Path<String>,
    Json(payload): Json<UpdateTaskPayload>,
) -> Result<Json<ApiTask>, ApiErrorResponse> {
    let task = state
        .backend
        .update_task(&user_id, &TaskId::new(task_id), payload)
        .await?;
    Ok(Json(task))
}

/// `DELETE /api/tasks/{task_id}`
///
/// # Errors
///
/// 404 if the task is absent or foreign.
pub async fn delete_task(
    State(state): State<AppState>,
    Principal(user_id): Principal,
    Path(task_id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiErrorResponse> {
    state
        .backend
        .delete_task(&user_id, &TaskId::new(task_id))
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

// =============================================================================
// Subtask Handlers
// =============================================================================

/// `GET /api/tasks/{task_id}/subtasks`
pub async fn list_subtasks(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Json<SubtaskListResponse> {
    Json(
        state
            .backend
            .list_subtasks(&TaskId::new(task_id))
            .await
            .into(),
    )
}

/// `POST /api/tasks/{task_id}/subtasks`
///
/// # Errors
///
/// 400 for a blank title.
pub async fn create_subtask(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<CreateSubtaskRequest>,
) -> Result<(StatusCode, Json<Subtask>), ApiErrorResponse> {
    let subtask = state
        .backend
        .create_subtask(&TaskId::new(task_id), &request.title, request.done)
        .await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

/// `PATCH /api/tasks/{task_id}/subtasks/{subtask_id}`
///
/// # Errors
///
/// 404 if the subtask is absent, 400 for a blank title.
pub async fn update_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(String, String)>,
    Json(patch): Json<SubtaskPatch>,
) -> Result<Json<Subtask>, ApiErrorResponse> {
    let subtask = state
        .backend
        .update_subtask(&TaskId::new(task_id), &SubtaskId::new(subtask_id), patch)
        .await?;
    Ok(Json(subtask))
}

/// `DELETE /api/tasks/{task_id}/subtasks/{subtask_id}`: the remaining
/// subtasks. Deleting an absent subtask succeeds.
pub async fn delete_subtask(
    State(state): State<AppState>,
    Path((task_id, subtask_id)): Path<(String, String)>,
) -> Json<SubtaskListResponse> {
    Json(
        state
            .backend
            .delete_subtask(&TaskId::new(task_id), &SubtaskId::new(subtask_id))
            .await
            .into(),
    )
}

/// `PUT /api/tasks/{task_id}/subtasks/reorder`
pub async fn reorder_subtasks(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Json<SubtaskListResponse> {
    Json(
        state
            .backend
            .reorder_subtasks(&TaskId::new(task_id), &request.order)
            .await
            .into(),
    )
}

// =============================================================================
// Tests
// =============================================================================
