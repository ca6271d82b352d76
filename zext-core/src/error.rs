//! Error types for ZExt cache operations

use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend {backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("Transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

/// Value encoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SerializationError {
    #[error("Failed to encode value: {reason}")]
    Encode { reason: String },

    #[error("Failed to decode value stored under {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Argument and stored-value validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Cache key must not be empty")]
    EmptyKey,

    #[error("Tag must not be empty")]
    EmptyTag,

    #[error("Value stored under {key} is not an integer")]
    NotNumeric { key: String },

    #[error("Integer overflow while updating {key}")]
    Overflow { key: String },

    #[error("Key {key} uses the reserved tag prefix {prefix}")]
    ReservedKey { key: String, prefix: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Backend not supported: {name}")]
    UnsupportedBackend { name: String },
}

/// Master error type for all cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tag operations are not enabled on this cache stack")]
    TaggingUnsupported,
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Reject empty cache keys.
pub fn ensure_key(id: &str) -> CacheResult<()> {
    if id.is_empty() {
        return Err(ValidationError::EmptyKey.into());
    }
    Ok(())
}

/// Reject empty tags.
pub fn ensure_tags<S: AsRef<str>>(tags: &[S]) -> CacheResult<()> {
    if tags.iter().any(|t| t.as_ref().is_empty()) {
        return Err(ValidationError::EmptyTag.into());
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
