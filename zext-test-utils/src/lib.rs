//! ZExt Test Utilities
//!
//! Shared test infrastructure for the ZExt workspace:
//! - Proptest generators for keys, tags and values
//! - Fixtures for commonly composed stacks
//! - A backend that fails every call
//! - Assertions over `CacheResult`

pub use zext_cache::{
    CacheBackend, CacheProfiler, CacheStack, Factory, JsonSerializer, MemoryBackend,
    Profileable, Taggable, TaggableBackend, Wrapper,
};
pub use zext_core::{
    BackendError, CacheConfig, CacheError, CacheResult, ConfigError, Lifetime,
    SerializationError, ValidationError,
};

use async_trait::async_trait;
use serde_json::Value;

// ============================================================================
// MOCK BACKENDS
// ============================================================================

/// Backend whose every operation fails with `BackendError::Unavailable`.
#[derive(Debug, Clone, Default)]
pub struct FailingBackend {
    reason: String,
}

impl FailingBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn fail<T>(&self) -> CacheResult<T> {
        Err(BackendError::Unavailable {
            backend: "failing".to_string(),
            reason: self.reason.clone(),
        }
        .into())
    }
}

#[async_trait]
impl CacheBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get(&self, _id: &str) -> CacheResult<Option<Value>> {
        self.fail()
    }

    async fn set(&self, _id: &str, _value: Value, _lifetime: Lifetime) -> CacheResult<()> {
        self.fail()
    }

    async fn remove(&self, _id: &str) -> CacheResult<bool> {
        self.fail()
    }

    async fn inc(&self, _id: &str, _step: i64) -> CacheResult<Option<i64>> {
        self.fail()
    }

    async fn flush(&self) -> CacheResult<()> {
        self.fail()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use proptest::collection::{btree_set, vec};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    use super::Lifetime;

    /// A non-empty application key.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_.:-]{0,15}"
    }

    /// A non-empty tag name.
    pub fn arb_tag() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,7}"
    }

    /// Between `min` and `max` distinct keys, in sorted order.
    pub fn arb_keys(min: usize, max: usize) -> impl Strategy<Value = Vec<String>> {
        btree_set(arb_key(), min..=max).prop_map(|keys| keys.into_iter().collect())
    }

    /// One to four distinct tags.
    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        btree_set(arb_tag(), 1..=4).prop_map(|tags| tags.into_iter().collect())
    }

    /// Tags drawn from a small fixed pool, so tag sets overlap often.
    pub fn arb_pooled_tags() -> impl Strategy<Value = Vec<String>> {
        btree_set(prop::sample::select(vec!["red", "green", "blue", "cyan"]), 1..=3)
            .prop_map(|tags| tags.into_iter().map(str::to_string).collect())
    }

    /// A JSON scalar.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-4000i32..4000).prop_map(|n| json!(f64::from(n) / 4.0)),
            "[ -~]{0,24}".prop_map(Value::String),
        ]
    }

    /// A JSON value nested at most three levels deep.
    pub fn arb_value() -> impl Strategy<Value = Value> {
        arb_scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                vec(inner.clone(), 0..4).prop_map(Value::Array),
                vec(("[a-z]{1,6}", inner), 0..4)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    pub fn arb_lifetime() -> impl Strategy<Value = Lifetime> {
        prop_oneof![
            Just(Lifetime::Forever),
            (60u64..86_400).prop_map(Lifetime::Seconds),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stacks for common testing scenarios.

    use std::sync::Arc;

    use super::*;

    /// Plain in-memory frontend with no tag support.
    pub fn memory_wrapper() -> Wrapper {
        Wrapper::new(Arc::new(MemoryBackend::new()))
    }

    /// Taggable frontend over a raw memory backend, which is also returned
    /// so tests can inspect stored keys.
    pub fn tagged_memory() -> (Arc<MemoryBackend>, Wrapper) {
        let raw = Arc::new(MemoryBackend::new());
        let data: Arc<dyn CacheBackend> = raw.clone();
        (raw, Wrapper::taggable(Arc::new(Taggable::new(data))))
    }

    /// Default config with profiling turned on.
    pub fn profiled_config() -> CacheConfig {
        CacheConfig::default()
            .with_profiling(true)
            .with_profile_history(64)
    }

    /// Factory over the default in-memory stack.
    pub fn memory_factory() -> Factory {
        Factory::new(CacheConfig::default()).unwrap_or_else(|e| panic!("default config: {}", e))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache results.

    use super::*;

    /// Assert that a CacheResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a CacheResult is a validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is a backend error.
    #[track_caller]
    pub fn assert_backend_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Backend(_)) => {}
            other => panic!("Expected Backend error, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is a config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a tag operation was refused by an untagged stack.
    #[track_caller]
    pub fn assert_tagging_unsupported<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::TaggingUnsupported) => {}
            other => panic!("Expected TaggingUnsupported, got: {:?}", other),
        }
    }
}
