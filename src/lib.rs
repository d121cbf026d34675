//! Optimistic sync for a task dashboard.
//!
//! This library keeps a client's local task and subtask state in step with a
//! remote persistence API. Mutations are applied locally first and then
//! confirmed or rolled back. It also ships the pieces around that core:
//!
//! - `domain`: tasks, subtasks, the ordering engine, tags, views and stats
//! - `infrastructure`: the `TaskApi` seam with in-memory, HTTP and
//!   fail-injecting implementations, plus configuration
//! - `sync`: the local stores, the coordinator and the optimistic mutation
//!   primitive
//! - `api`: the reference HTTP server's router

pub mod api;
pub mod domain;
pub mod infrastructure;
pub mod sync;
