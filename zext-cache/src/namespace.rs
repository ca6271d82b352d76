//! Namespaced cache keys.
//!
//! A [`Namespace`] maps application keys to stored keys of the form
//! `"{name}{separator}{key}"`. A namespace name may not contain its
//! separator, so two distinct namespaces can never produce the same stored
//! key.

use zext_core::{CacheResult, ConfigError};

/// Default separator between namespace and key.
pub const DEFAULT_SEPARATOR: &str = ":";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Stored-key prefix, including the separator. Empty for the root namespace.
    prefix: String,
    name: Option<String>,
}

impl Namespace {
    /// The root namespace: keys are stored unchanged.
    pub fn root() -> Self {
        Self {
            prefix: String::new(),
            name: None,
        }
    }

    /// Create a namespace. An empty name yields the root namespace.
    pub fn new(name: &str, separator: &str) -> CacheResult<Self> {
        if name.is_empty() {
            return Ok(Self::root());
        }
        if separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "namespace_separator".to_string(),
                value: String::new(),
                reason: "must not be empty when a namespace is set".to_string(),
            }
            .into());
        }
        if name.contains(separator) {
            return Err(ConfigError::InvalidValue {
                field: "namespace".to_string(),
                value: name.to_string(),
                reason: format!("must not contain the separator {:?}", separator),
            }
            .into());
        }
        Ok(Self {
            prefix: format!("{}{}", name, separator),
            name: Some(name.to_string()),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn is_root(&self) -> bool {
        self.name.is_none()
    }

    /// Stored key for an application key.
    pub fn apply(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    pub fn apply_all<S: AsRef<str>>(&self, keys: &[S]) -> Vec<String> {
        keys.iter().map(|k| self.apply(k.as_ref())).collect()
    }

    /// Application key for a stored key, or None when the stored key
    /// belongs to another namespace.
    pub fn strip<'a>(&self, stored: &'a str) -> Option<&'a str> {
        stored.strip_prefix(self.prefix.as_str())
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::root()
    }
}
