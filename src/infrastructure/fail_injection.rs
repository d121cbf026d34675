//! Fail injection for the persistence API.
//!
//! [`FailInjectingApi`] wraps any [`TaskApi`] and, after the inner call
//! succeeds, may delay the response, replace it with an injected failure, or
//! simulate a timeout. This exercises the rollback paths of the sync layer
//! against a real backend.
//!
//! - **Post-I/O application**: the inner call always runs first, so the
//!   backend may have committed a change whose response the client then loses
//! - **External RNG injection**: randomness comes from an [`RngProvider`];
//!   a seeded provider makes every run reproducible
//! - **Runtime reconfiguration**: the active configuration can be swapped
//!   between calls

use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use siphasher::sip::SipHasher24;

use super::config::{ConfigError, lookup_trimmed, parse_number};
use super::remote::{
    ApiTask, CreateTaskPayload, RemoteError, RemoteResult, SubtaskPatch, TaskApi,
    UpdateTaskPayload,
};
use crate::domain::{Subtask, SubtaskId, TaskId};

// =============================================================================
// Fail Injection Config
// =============================================================================

/// Configuration for fail injection.
#[derive(Debug, Clone, PartialEq)]
pub struct FailInjectionConfig {
    /// Probability of injecting a failure (0.0 - 1.0).
    pub failure_rate: f64,
    /// Minimum delay in milliseconds.
    pub delay_min_ms: u64,
    /// Maximum delay in milliseconds.
    pub delay_max_ms: u64,
    /// Probability of simulating a timeout (0.0 - 1.0).
    pub timeout_rate: f64,
    /// Timeout value in milliseconds (reported in the Timeout error).
    pub timeout_ms: u64,
}

impl Default for FailInjectionConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.0,
            delay_min_ms: 0,
            delay_max_ms: 0,
            timeout_rate: 0.0,
            timeout_ms: 5000,
        }
    }
}

impl FailInjectionConfig {
    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `{prefix}_FAILURE_RATE`: Failure rate (0.0 - 1.0)
    /// - `{prefix}_DELAY_MIN_MS`: Minimum delay in milliseconds
    /// - `{prefix}_DELAY_MAX_MS`: Maximum delay in milliseconds
    /// - `{prefix}_TIMEOUT_RATE`: Timeout rate (0.0 - 1.0)
    /// - `API_TIMEOUT_MS`: Timeout value (shared with the HTTP client)
    ///
    /// # Errors
    ///
    /// Returns an error if any variable contains an invalid value, or if the
    /// configuration fails validation. Missing variables use default values.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Same as [`FailInjectionConfig::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable contains an invalid value, or if the
    /// configuration fails validation.
    pub fn from_lookup(
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            failure_rate: parse_number(&lookup, &format!("{prefix}_FAILURE_RATE"), 0.0)?,
            delay_min_ms: parse_number(&lookup, &format!("{prefix}_DELAY_MIN_MS"), 0)?,
            delay_max_ms: parse_number(&lookup, &format!("{prefix}_DELAY_MAX_MS"), 0)?,
            timeout_rate: parse_number(&lookup, &format!("{prefix}_TIMEOUT_RATE"), 0.0)?,
            timeout_ms: parse_number(&lookup, "API_TIMEOUT_MS", defaults.timeout_ms)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Creates a deterministic configuration for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn deterministic(
        failure_rate: f64,
        delay_ms: u64,
        timeout_rate: f64,
        timeout_ms: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            failure_rate,
            delay_min_ms: delay_ms,
            delay_max_ms: delay_ms,
            timeout_rate,
            timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    /// A configuration that fails every call.
    #[must_use]
    pub fn always_fail() -> Self {
        Self {
            failure_rate: 1.0,
            ..Self::default()
        }
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `failure_rate` is not in range `0.0..=1.0`
    /// - `timeout_rate` is not in range `0.0..=1.0`
    /// - `delay_min_ms > delay_max_ms`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ConfigError::InvalidFailureRate(self.failure_rate));
        }
        if !(0.0..=1.0).contains(&self.timeout_rate) {
            return Err(ConfigError::InvalidTimeoutRate(self.timeout_rate));
        }
        if self.delay_min_ms > self.delay_max_ms {
            return Err(ConfigError::InvalidDelayRange {
                min: self.delay_min_ms,
                max: self.delay_max_ms,
            });
        }
        Ok(())
    }

    /// Returns whether fail injection is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.failure_rate > 0.0 || self.delay_max_ms > 0 || self.timeout_rate > 0.0
    }
}

// =============================================================================
// RNG Provider
// =============================================================================

/// RNG provider for deterministic/random behavior.
///
/// In seeded mode, each operation gets its own RNG whose seed is derived with
/// `SipHash-2-4` (fixed zero key) from the parent seed and the scope:
///
/// ```text
/// child_seed = SipHash24(parent_seed.to_le_bytes() ++ request_key ++ ":" ++ source ++ ":" ++ operation)
/// ```
///
/// The same scope always yields the same sequence, independent of how
/// concurrent operations interleave.
#[derive(Debug, Clone, Copy)]
pub struct RngProvider {
    /// Parent seed for child RNG generation. None = random mode.
    parent_seed: Option<u64>,
}

impl RngProvider {
    /// Creates a provider drawing fresh entropy for every operation.
    #[must_use]
    pub const fn new_random() -> Self {
        Self { parent_seed: None }
    }

    /// Creates a provider with reproducible per-operation sequences.
    #[must_use]
    pub const fn new_seeded(seed: u64) -> Self {
        Self {
            parent_seed: Some(seed),
        }
    }

    /// Reads `RNG_SEED`: seeded mode when set, random mode otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if `RNG_SEED` is set but is not a `u64`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`RngProvider::from_env`] with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `RNG_SEED` is set but is not a `u64`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        match lookup_trimmed(&lookup, "RNG_SEED") {
            Some(value) => {
                let seed: u64 = value.parse().map_err(|error: std::num::ParseIntError| {
                    ConfigError::InvalidRngSeed {
                        message: error.to_string(),
                        value,
                    }
                })?;
                tracing::info!(seed = seed, "Using deterministic RNG");
                Ok(Self::new_seeded(seed))
            }
            None => Ok(Self::new_random()),
        }
    }

    /// Returns `true` in seeded mode.
    #[must_use]
    pub const fn is_seeded(&self) -> bool {
        self.parent_seed.is_some()
    }

    /// Creates a scoped RNG for one operation.
    ///
    /// Different `(request_key, source_name, operation)` triples produce
    /// different sequences; the same triple reproduces the same sequence.
    #[must_use]
    pub fn for_operation(&self, request_key: &str, source_name: &str, operation: &str) -> ScopedRng {
        self.parent_seed.map_or_else(
            || ScopedRng(StdRng::from_os_rng()),
            |parent_seed| {
                let mut hasher = SipHasher24::new_with_key(&[0u8; 16]);
                hasher.write(&parent_seed.to_le_bytes());
                hasher.write(request_key.as_bytes());
                hasher.write(b":");
                hasher.write(source_name.as_bytes());
                hasher.write(b":");
                hasher.write(operation.as_bytes());
                ScopedRng(StdRng::seed_from_u64(hasher.finish()))
            },
        )
    }
}

// =============================================================================
// Scoped RNG
// =============================================================================

/// Operation-scoped RNG. `Send`, so it can live across await points.
pub struct ScopedRng(StdRng);

impl ScopedRng {
    /// Generates a random f64 in range [0.0, 1.0).
    pub fn random_f64(&mut self) -> f64 {
        self.0.random()
    }

    /// Generates a random u64 in range [min, max].
    pub fn random_range(&mut self, min: u64, max: u64) -> u64 {
        self.0.random_range(min..=max)
    }
}

// =============================================================================
// Post-Injection Application
// =============================================================================

/// Applies fail injection after a successful call.
///
/// In order: delay, failure (by `failure_rate`), timeout (by `timeout_rate`).
///
/// # Errors
///
/// Returns `RemoteError::InjectedFailure` or `RemoteError::Timeout` when the
/// dice say so.
pub async fn apply_post_injection(
    config: &FailInjectionConfig,
    rng: &mut ScopedRng,
) -> Result<(), RemoteError> {
    let delay_ms = compute_delay(config, rng);
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    if rng.random_f64() < config.failure_rate {
        return Err(RemoteError::InjectedFailure(
            "Random failure injection".to_string(),
        ));
    }

    if rng.random_f64() < config.timeout_rate {
        return Err(RemoteError::Timeout(config.timeout_ms));
    }

    Ok(())
}

fn compute_delay(config: &FailInjectionConfig, rng: &mut ScopedRng) -> u64 {
    if config.delay_max_ms == 0 {
        0
    } else if config.delay_min_ms == config.delay_max_ms {
        config.delay_min_ms
    } else {
        rng.random_range(config.delay_min_ms, config.delay_max_ms)
    }
}

// =============================================================================
// Fail-Injecting Decorator
// =============================================================================

/// Decorator applying [`apply_post_injection`] to every call of `A`.
pub struct FailInjectingApi<A> {
    inner: A,
    config: RwLock<FailInjectionConfig>,
    rng_provider: RngProvider,
    /// Distinguishes successive calls so seeded runs do not repeat one outcome.
    calls: AtomicU64,
}

impl<A: TaskApi> FailInjectingApi<A> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: A, config: FailInjectionConfig, rng_provider: RngProvider) -> Self {
        Self {
            inner,
            config: RwLock::new(config),
            rng_provider,
            calls: AtomicU64::new(0),
        }
    }

    /// Wraps `inner` with injection disabled.
    #[must_use]
    pub fn passthrough(inner: A) -> Self {
        Self::new(inner, FailInjectionConfig::default(), RngProvider::new_random())
    }

    /// Replaces the active configuration; in-flight calls keep the old one.
    pub fn set_config(&self, config: FailInjectionConfig) {
        *self.config.write() = config;
    }

    /// Makes every following call fail.
    pub fn fail_all(&self) {
        self.set_config(FailInjectionConfig::always_fail());
    }

    /// Disables injection.
    pub fn heal(&self) {
        self.set_config(FailInjectionConfig::default());
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> FailInjectionConfig {
        self.config.read().clone()
    }

    /// The wrapped API.
    #[must_use]
    pub const fn inner(&self) -> &A {
        &self.inner
    }

    async fn inject<T>(
        &self,
        operation: &'static str,
        result: Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let value = result?;
        let config = self.config();
        if !config.is_enabled() {
            return Ok(value);
        }
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut rng = self
            .rng_provider
            .for_operation(&call.to_string(), "task_api", operation);
        if let Err(error) = apply_post_injection(&config, &mut rng).await {
            tracing::debug!(operation, %error, "Injected failure after successful call");
            return Err(error);
        }
        Ok(value)
    }
}

impl<A: TaskApi> TaskApi for FailInjectingApi<A> {
    fn list_tasks(&self) -> RemoteResult<'_, Vec<ApiTask>> {
        Box::pin(async move {
            let result = self.inner.list_tasks().await;
            self.inject("list_tasks", result).await
        })
    }

    fn create_task(&self, payload: CreateTaskPayload) -> RemoteResult<'_, ApiTask> {
        Box::pin(async move {
            let result = self.inner.create_task(payload).await;
            self.inject("create_task", result).await
        })
    }

    fn update_task(&self, id: TaskId, payload: UpdateTaskPayload) -> RemoteResult<'_, ApiTask> {
        Box::pin(async move {
            let result = self.inner.update_task(id, payload).await;
            self.inject("update_task", result).await
        })
    }

    fn delete_task(&self, id: TaskId) -> RemoteResult<'_, ()> {
        Box::pin(async move {
            let result = self.inner.delete_task(id).await;
            self.inject("delete_task", result).await
        })
    }

    fn list_subtasks(&self, task_id: TaskId) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move {
            let result = self.inner.list_subtasks(task_id).await;
            self.inject("list_subtasks", result).await
        })
    }

    fn create_subtask(&self, task_id: TaskId, title: String) -> RemoteResult<'_, Subtask> {
        Box::pin(async move {
            let result = self.inner.create_subtask(task_id, title).await;
            self.inject("create_subtask", result).await
        })
    }

    fn update_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
        patch: SubtaskPatch,
    ) -> RemoteResult<'_, Subtask> {
        Box::pin(async move {
            let result = self.inner.update_subtask(task_id, subtask_id, patch).await;
            self.inject("update_subtask", result).await
        })
    }

    fn delete_subtask(
        &self,
        task_id: TaskId,
        subtask_id: SubtaskId,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move {
            let result = self.inner.delete_subtask(task_id, subtask_id).await;
            self.inject("delete_subtask", result).await
        })
    }

    fn reorder_subtasks(
        &self,
        task_id: TaskId,
        ordered_ids: Vec<SubtaskId>,
    ) -> RemoteResult<'_, Vec<Subtask>> {
        Box::pin(async move {
            let result = self.inner.reorder_subtasks(task_id, ordered_ids).await;
            self.inject("reorder_subtasks", result).await
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryBackend;
    use crate::domain::UserId;
    use rstest::rstest;
    use std::collections::HashMap;

    // -------------------------------------------------------------------------
    // FailInjectionConfig Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_fail_injection_config_default() {
        let config = FailInjectionConfig::default();
        assert!((config.failure_rate - 0.0).abs() < f64::EPSILON);
        assert_eq!(config.delay_min_ms, 0);
        assert_eq!(config.delay_max_ms, 0);
        assert_eq!(config.timeout_ms, 5000);
        assert!(!config.is_enabled());
    }

    #[rstest]
    fn test_fail_injection_config_deterministic() {
        let config = FailInjectionConfig::deterministic(0.5, 100, 0.1, 3000).unwrap();
        assert!((config.failure_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.delay_min_ms, 100);
        assert_eq!(config.delay_max_ms, 100);
        assert_eq!(config.timeout_ms, 3000);
        assert!(config.is_enabled());
    }

    #[rstest]
    #[case(FailInjectionConfig { failure_rate: 1.5, ..Default::default() })]
    #[case(FailInjectionConfig { failure_rate: -0.1, ..Default::default() })]
    #[case(FailInjectionConfig { timeout_rate: 2.0, ..Default::default() })]
    #[case(FailInjectionConfig { delay_min_ms: 200, delay_max_ms: 100, ..Default::default() })]
    fn test_fail_injection_config_validate_rejects(#[case] config: FailInjectionConfig) {
        assert!(config.validate().is_err());
    }

    #[rstest]
    fn test_fail_injection_config_from_lookup() {
        let values: HashMap<&str, &str> = [
            ("API_FAILURE_RATE", "0.25"),
            ("API_DELAY_MIN_MS", "5"),
            ("API_DELAY_MAX_MS", "10"),
            ("API_TIMEOUT_MS", "750"),
        ]
        .into_iter()
        .collect();
        let config =
            FailInjectionConfig::from_lookup("API", |name| values.get(name).map(|v| (*v).to_string()))
                .unwrap();
        assert!((config.failure_rate - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.delay_min_ms, 5);
        assert_eq!(config.delay_max_ms, 10);
        assert_eq!(config.timeout_ms, 750);
    }

    #[rstest]
    fn test_fail_injection_config_from_lookup_rejects_garbage() {
        let result = FailInjectionConfig::from_lookup("API", |name| {
            (name == "API_FAILURE_RATE").then(|| "often".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidNumber { .. })));
    }

    // -------------------------------------------------------------------------
    // RngProvider Tests
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_rng_provider_seeded_same_scope_same_sequence() {
        let provider = RngProvider::new_seeded(42);
        let mut first = provider.for_operation("1", "task_api", "create_task");
        let mut second = provider.for_operation("1", "task_api", "create_task");
        for _ in 0..8 {
            assert!((first.random_f64() - second.random_f64()).abs() < f64::EPSILON);
        }
    }

    #[rstest]
    fn test_rng_provider_seeded_different_scopes_differ() {
        let provider = RngProvider::new_seeded(42);
        let mut first = provider.for_operation("1", "task_api", "create_task");
        let mut second = provider.for_operation("2", "task_api", "create_task");
        let left: Vec<f64> = (0..4).map(|_| first.random_f64()).collect();
        let right: Vec<f64> = (0..4).map(|_| second.random_f64()).collect();
        assert_ne!(left, right);
    }

    #[rstest]
    fn test_rng_provider_from_lookup() {
        assert!(RngProvider::from_lookup(|_| None).map(|p| !p.is_seeded()).unwrap());
        assert!(
            RngProvider::from_lookup(|_| Some("7".to_string()))
                .map(|p| p.is_seeded())
                .unwrap()
        );
        assert!(matches!(
            RngProvider::from_lookup(|_| Some("x".to_string())),
            Err(ConfigError::InvalidRngSeed { .. })
        ));
    }

    #[rstest]
    fn test_scoped_rng_random_range_is_inclusive() {
        let mut rng = RngProvider::new_seeded(1).for_operation("a", "b", "c");
        for _ in 0..32 {
            let value = rng.random_range(3, 4);
            assert!((3..=4).contains(&value));
        }
    }

    // -------------------------------------------------------------------------
    // apply_post_injection Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_apply_post_injection_disabled_passes() {
        let mut rng = RngProvider::new_seeded(1).for_operation("a", "b", "c");
        assert!(
            apply_post_injection(&FailInjectionConfig::default(), &mut rng)
                .await
                .is_ok()
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_apply_post_injection_always_fails() {
        let mut rng = RngProvider::new_seeded(1).for_operation("a", "b", "c");
        let result = apply_post_injection(&FailInjectionConfig::always_fail(), &mut rng).await;
        assert!(matches!(result, Err(RemoteError::InjectedFailure(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn test_apply_post_injection_always_times_out() {
        let config = FailInjectionConfig::deterministic(0.0, 0, 1.0, 1234).unwrap();
        let mut rng = RngProvider::new_seeded(1).for_operation("a", "b", "c");
        let result = apply_post_injection(&config, &mut rng).await;
        assert_eq!(result, Err(RemoteError::Timeout(1234)));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn test_apply_post_injection_delays() {
        let config = FailInjectionConfig::deterministic(0.0, 250, 0.0, 0).unwrap();
        let mut rng = RngProvider::new_seeded(1).for_operation("a", "b", "c");
        let started = tokio::time::Instant::now();
        apply_post_injection(&config, &mut rng).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    // -------------------------------------------------------------------------
    // FailInjectingApi Tests
    // -------------------------------------------------------------------------

    #[rstest]
    #[tokio::test]
    async fn test_decorator_fails_after_inner_call_runs() {
        let backend = InMemoryBackend::with_demo_data();
        let api = FailInjectingApi::passthrough(backend.client(UserId::new("demo")));
        api.fail_all();

        let result = api
            .create_subtask(TaskId::new("2"), "Outline chapters".to_string())
            .await;
        assert!(matches!(result, Err(RemoteError::InjectedFailure(_))));
        // The backend committed before the response was dropped.
        assert_eq!(backend.list_subtasks(&TaskId::new("2")).await.len(), 1);

        api.heal();
        assert!(api.list_subtasks(TaskId::new("2")).await.is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn test_decorator_passes_inner_errors_through() {
        let backend = InMemoryBackend::new();
        let api = FailInjectingApi::passthrough(backend.anonymous_client());
        assert_eq!(api.list_tasks().await, Err(RemoteError::Unauthorized));
    }
}
