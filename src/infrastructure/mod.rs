//! Infrastructure module for the persistence API.
//!
//! This module contains the `TaskApi` seam and its implementations (the
//! in-memory reference backend, the HTTP client, the fail-injecting
//! decorator), plus environment configuration.

pub mod config;
pub mod fail_injection;
pub mod http;
pub mod in_memory;
pub mod remote;

pub use config::{ClientConfig, ConfigError, ServerConfig};
pub use fail_injection::{FailInjectingApi, FailInjectionConfig, RngProvider};
pub use http::{HttpTaskApi, USER_HEADER};
pub use in_memory::{DEMO_USER, InMemoryBackend, InMemoryTaskApi};
pub use remote::{
    ApiTask, CreateTaskPayload, RemoteError, RemoteResult, SubtaskPatch, TaskApi,
    UpdateTaskPayload, build_create_payload, build_update_payload, map_api_task,
};
