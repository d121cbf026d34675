//! HTTP client for the persistence API.
//!
//! Talks to the reference server (or anything speaking the same routes). The
//! signed-in user travels in the `x-user-id` header; without one the server
//! answers task routes with 401.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::config::ClientConfig;
use super::remote::{
    ApiTask, CreateTaskPayload, RemoteError, RemoteResult, SubtaskPatch, TaskApi,
    UpdateTaskPayload,
};
use crate::domain::{Subtask, SubtaskId, TaskId, UserId};

/// Header carrying the caller's identity.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Deserialize)]
struct SubtaskList {
    subtasks: Vec<Subtask>,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// [`TaskApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: reqwest::Client,
    base_url: String,
    user_id: Option<UserId>,
    timeout: Option<Duration>,
}

impl HttpTaskApi {
    /// Creates a client for `base_url` acting as `user_id`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, user_id: Option<UserId>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id,
            timeout: None,
        }
    }

    /// Creates a client from a [`ClientConfig`].
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        let api = Self::new(config.base_url.clone(), config.user_id.clone());
        match config.timeout_ms {
            Some(timeout_ms) => api.with_timeout(Duration::from_millis(timeout_ms)),
            None => api,
        }
    }

    /// Sets a per-request timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Joins `segments` onto the base URL, percent-encoding each one so an
    /// id holding `/` or `?` stays a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let invalid = || RemoteError::Transport(format!("Invalid base URL: {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, RemoteError> {
        let builder = self.client.request(method, self.url(segments)?);
        let builder = match &self.user_id {
            Some(user_id) => builder.header(USER_HEADER, user_id.as_str()),
            None => builder,
        };
        Ok(match self.timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        })
    }

    #[allow(clippy::cast_possible_truncation)] // Timeout in ms will not exceed u64
    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let timeout_ms = self.timeout.map_or(0, |timeout| timeout.as_millis() as u64);
        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                RemoteError::Timeout(timeout_ms)
            } else {
                RemoteError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.message)
            .unwrap_or(body);
        tracing::debug!(status = status.as_u16(), %message, "Request rejected");

        Err(match status {
            StatusCode::NOT_FOUND => RemoteError::NotFound(message),
            StatusCode::UNAUTHORIZED => RemoteError::Unauthorized,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                RemoteError::Validation(message)
            }
            other => RemoteError::Status {
                status: other.as_u16(),
                message,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RemoteError> {
        self.send(builder)
            .await?
            .json()
            .await
            .map_err(|error| RemoteError::Decode(error.to_string()))
    }

    async fn send_subtask_list(&self, builder: RequestBuilder) -> Result<Vec<Subtask>, RemoteError> {
        let list: SubtaskList = self.send_json(builder).await?;
        Ok(list.subtasks)
    }
}

impl TaskApi for HttpTaskApi {
    fn list_tasks(&self) -> RemoteResult<'_, Vec<ApiTask>> {
        Box::pin(async move {
            let builder = self.request(Method::GET, &["api", "tasks"])?;
            self.send_json(builder).await
        })
    }

    fn create_task(&self, payload: CreateTaskPayload) -> RemoteResult<'_, ApiTask> {
        Box::pin(async move {
            let builder = self
                .request(Method::POST, &["api", "tasks"])?
                .json(&payload);
            self.send_json(builder).await
        })
    }

    fn update_task(&self, id: TaskId, payload: UpdateTaskPayload) -> RemoteResult<'_, ApiTask> {
        Box::pin(async move {
            let builder = self
                .request(Method::PATCH, &["api", "tasks", id.as_str()])?
                .json(&payload);
            self.send_json(builder).await
        })
    }

    fn delete_task(&self, id: TaskId) -> RemoteResult<'_, ()> {
        Box::pin(async move {
            let builder = self.request(Method::DELETE, &["api", "tasks", id.as_str()])?;
            self.send(builder).await.map(|_| ())
        })
    }

    fn list_subtasks(&self, task_id: TaskId) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move {
            let builder =
                self.request(Method::GET, &["api", "tasks", task_id.as_str(), "subtasks"])?;
            self.send_subtask_list(builder).await
        })
    }

    fn create_subtask(&self, task_id: TaskId, title: String) -> RemoteResult<'_, Subtask> {
        Box::pin(async move {
            let builder = self
                .request(Method::POST, &["api", "tasks", task_id.as_str(), "subtasks"])?
                .json(&serde_json::json!({ "title": title }));
            self.send_json(builder).await
        })
    }

    fn update_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
        patch: SubtaskPatch,
    ) -> RemoteResult<'_, Subtask> {
        Box::pin(async move {
            let builder = self
                .request(
                    Method::PATCH,
                    &["api", "tasks", task_id.as_str(), "subtasks", subtask_id.as_str()],
                )?
                .json(&patch);
            self.send_json(builder).await
        })
    }

    fn delete_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move {
            let builder = self.request(
                Method::DELETE,
                &["api", "tasks", task_id.as_str(), "subtasks", subtask_id.as_str()],
            )?;
            self.send_subtask_list(builder).await
        })
    }

    fn reorder_subtasks(
        &self,
        task_id: TaskId,
        ordered_ids: Vec<SubtaskId>,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move {
            let builder = self
                .request(
                    Method::PUT,
                    &["api", "tasks", task_id.as_str(), "subtasks", "reorder"],
                )?
                .json(&serde_json::json!({ "order": ordered_ids }));
            self.send_subtask_list(builder).await
        })
    }
}
