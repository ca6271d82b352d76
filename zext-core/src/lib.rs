//! ZExt Core - Shared Cache Types
//!
//! Error taxonomy, entry lifetimes and stack configuration. Every other
//! crate in the workspace depends on this one; it holds no cache logic.

pub mod config;
pub mod error;
pub mod lifetime;

pub use config::{BackendKind, CacheConfig, SerializerKind, ENV_PREFIX};
pub use error::{
    ensure_key, ensure_tags, BackendError, CacheError, CacheResult, ConfigError,
    SerializationError, ValidationError,
};
pub use lifetime::Lifetime;

/// Structured cache value.
pub type Value = serde_json::Value;
