//! Cache stack configuration.
//!
//! Configuration can be built in code, parsed from TOML, or loaded from
//! `ZEXT_CACHE_*` environment variables. Every field has a default so a
//! partial document is enough.

use crate::error::{CacheResult, ConfigError};
use crate::lifetime::Lifetime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix shared by every environment variable read by [`CacheConfig::from_env`].
pub const ENV_PREFIX: &str = "ZEXT_CACHE_";

/// Which leaf backend stores the data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process concurrent map
    #[default]
    Memory,
    /// LMDB environment on disk
    Lmdb { path: PathBuf, max_size_mb: usize },
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Lmdb { .. } => "lmdb",
        }
    }
}

/// How values are encoded before reaching the leaf backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// Store values as-is
    None,
    /// Encode structured values to JSON text
    #[default]
    Json,
}

/// Configuration for a composed cache stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: BackendKind,
    /// Namespace applied by frontends that don't name their own.
    pub namespace: Option<String>,
    pub namespace_separator: String,
    /// Lifetime used by `Wrapper::set` when none is given.
    pub default_lifetime: Lifetime,
    pub serializer: SerializerKind,
    pub tagging: bool,
    /// Key prefix for tag member lists in the tag holder.
    pub tag_prefix: String,
    /// Keep tag lists in a dedicated in-memory holder instead of the data backend.
    pub separate_tag_holder: bool,
    pub profiling: bool,
    /// Maximum number of profile events retained.
    pub profile_history: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            namespace: None,
            namespace_separator: ":".to_string(),
            default_lifetime: Lifetime::Forever,
            serializer: SerializerKind::Json,
            tagging: true,
            tag_prefix: "__tag__".to_string(),
            separate_tag_holder: false,
            profiling: false,
            profile_history: 1000,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.namespace_separator = separator.into();
        self
    }

    pub fn with_default_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    pub fn with_serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_tagging(mut self, enabled: bool) -> Self {
        self.tagging = enabled;
        self
    }

    pub fn with_tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    pub fn with_separate_tag_holder(mut self, enabled: bool) -> Self {
        self.separate_tag_holder = enabled;
        self
    }

    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn with_profile_history(mut self, capacity: usize) -> Self {
        self.profile_history = capacity;
        self
    }

    /// Parse a TOML document.
    ///
    /// ```toml
    /// namespace = "app"
    /// default_lifetime = 300
    ///
    /// [backend]
    /// kind = "lmdb"
    /// path = "/var/cache/app"
    /// max_size_mb = 64
    /// ```
    pub fn from_toml_str(source: &str) -> CacheResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `ZEXT_CACHE_BACKEND`: "memory" or "lmdb" (default: memory)
    /// - `ZEXT_CACHE_LMDB_PATH`: LMDB directory (required for lmdb)
    /// - `ZEXT_CACHE_LMDB_MAX_SIZE_MB`: LMDB map size (default: 64)
    /// - `ZEXT_CACHE_NAMESPACE`: Default frontend namespace (default: none)
    /// - `ZEXT_CACHE_NAMESPACE_SEPARATOR`: (default: ":")
    /// - `ZEXT_CACHE_DEFAULT_LIFETIME_SECS`: 0 = forever (default: 0)
    /// - `ZEXT_CACHE_SERIALIZER`: "json" or "none" (default: json)
    /// - `ZEXT_CACHE_TAGGING`: "true" or "false" (default: true)
    /// - `ZEXT_CACHE_TAG_PREFIX`: (default: "__tag__")
    /// - `ZEXT_CACHE_SEPARATE_TAG_HOLDER`: "true" or "false" (default: false)
    /// - `ZEXT_CACHE_PROFILING`: "true" or "false" (default: false)
    /// - `ZEXT_CACHE_PROFILE_HISTORY`: retained events (default: 1000)
    pub fn from_env() -> CacheResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> CacheResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, suffix))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let backend = match var("BACKEND").map(|s| s.to_lowercase()).as_deref() {
            None | Some("memory") => BackendKind::Memory,
            Some("lmdb") => {
                let path = var("LMDB_PATH").ok_or_else(|| ConfigError::MissingRequired {
                    field: format!("{}LMDB_PATH", ENV_PREFIX),
                })?;
                let max_size_mb = parse_var(&var, "LMDB_MAX_SIZE_MB")?.unwrap_or(64);
                BackendKind::Lmdb {
                    path: PathBuf::from(path),
                    max_size_mb,
                }
            }
            Some(other) => {
                return Err(ConfigError::UnsupportedBackend {
                    name: other.to_string(),
                }
                .into())
            }
        };

        let serializer = match var("SERIALIZER").map(|s| s.to_lowercase()).as_deref() {
            None | Some("json") => SerializerKind::Json,
            Some("none") => SerializerKind::None,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: format!("{}SERIALIZER", ENV_PREFIX),
                    value: other.to_string(),
                    reason: "expected json or none".to_string(),
                }
                .into())
            }
        };

        let config = Self {
            backend,
            namespace: var("NAMESPACE"),
            namespace_separator: var("NAMESPACE_SEPARATOR")
                .unwrap_or(defaults.namespace_separator),
            default_lifetime: parse_var::<u64, _>(&var, "DEFAULT_LIFETIME_SECS")?
                .map(Lifetime::from_secs)
                .unwrap_or(defaults.default_lifetime),
            serializer,
            tagging: parse_bool(&var, "TAGGING")?.unwrap_or(defaults.tagging),
            tag_prefix: var("TAG_PREFIX").unwrap_or(defaults.tag_prefix),
            separate_tag_holder: parse_bool(&var, "SEPARATE_TAG_HOLDER")?
                .unwrap_or(defaults.separate_tag_holder),
            profiling: parse_bool(&var, "PROFILING")?.unwrap_or(defaults.profiling),
            profile_history: parse_var(&var, "PROFILE_HISTORY")?
                .unwrap_or(defaults.profile_history),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> CacheResult<()> {
        if self.tagging && self.tag_prefix.is_empty() {
            return Err(invalid("tag_prefix", "", "must not be empty").into());
        }
        let namespaced = self.namespace.as_deref().is_some_and(|ns| !ns.is_empty());
        if namespaced && self.namespace_separator.is_empty() {
            return Err(invalid(
                "namespace_separator",
                "",
                "must not be empty when a namespace is set",
            )
            .into());
        }
        if let Some(ns) = self.namespace.as_deref() {
            if namespaced && ns.contains(self.namespace_separator.as_str()) {
                return Err(invalid("namespace", ns, "must not contain the separator").into());
            }
        }
        if let BackendKind::Lmdb { path, max_size_mb } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "backend.path".to_string(),
                }
                .into());
            }
            if *max_size_mb == 0 {
                return Err(invalid("backend.max_size_mb", "0", "must be positive").into());
            }
        }
        if self.profiling && self.profile_history == 0 {
            return Err(invalid("profile_history", "0", "must be positive when profiling").into());
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_var<T, F>(var: &F, suffix: &str) -> CacheResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(suffix) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| {
            invalid(&format!("{}{}", ENV_PREFIX, suffix), &raw, &e.to_string()).into()
        }),
    }
}

fn parse_bool<F>(var: &F, suffix: &str) -> CacheResult<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match var(suffix).map(|s| s.to_lowercase()).as_deref() {
        None => Ok(None),
        Some("true") | Some("1") | Some("yes") | Some("on") => Ok(Some(true)),
        Some("false") | Some("0") | Some("no") | Some("off") => Ok(Some(false)),
        Some(other) => Err(invalid(
            &format!("{}{}", ENV_PREFIX, suffix),
            other,
            "expected a boolean",
        )
        .into()),
    }
}
