//! Request and response bodies that have no counterpart in the persistence
//! API records.
//!
//! Task bodies are the wire records themselves ([`ApiTask`],
//! [`CreateTaskPayload`], [`UpdateTaskPayload`]).
//!
//! [`ApiTask`]: crate::infrastructure::ApiTask
//! [`CreateTaskPayload`]: crate::infrastructure::CreateTaskPayload
//! [`UpdateTaskPayload`]: crate::infrastructure::UpdateTaskPayload

use serde::{Deserialize, Serialize};

use crate::domain::{Subtask, SubtaskId};

/// Health check response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of a successful delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// A task's subtasks in position order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskListResponse {
    pub subtasks: Vec<Subtask>,
}

impl From<Vec<Subtask>> for SubtaskListResponse {
    fn from(subtasks: Vec<Subtask>) -> Self {
        Self { subtasks }
    }
}

/// Request DTO for creating a subtask.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubtaskRequest {
    pub title: String,
    #[serde(default)]
    pub done: bool,
}

/// Request DTO for reordering a task's subtasks.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    /// Subtask ids in their new order.
    pub order: Vec<SubtaskId>,
}
