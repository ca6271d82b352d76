//! Stack composition from configuration.
//!
//! The factory builds the leaf backend named by the config and wraps it in
//! the enabled decorators, innermost first:
//!
//! ```text
//! leaf -> JsonSerializer -> Taggable -> Profileable -> Wrapper
//! ```

use std::sync::Arc;

use tracing::info;
use zext_core::{BackendKind, CacheConfig, CacheResult, SerializerKind};

use crate::backend::{CacheBackend, TaggableBackend};
use crate::backends::{LmdbBackend, MemoryBackend};
use crate::decorators::{JsonSerializer, Profileable, Taggable};
use crate::profiler::CacheProfiler;
use crate::wrapper::Wrapper;

/// A composed stack. `backend` and `taggable` point at the same outermost
/// decorator when tagging is enabled.
#[derive(Clone)]
pub struct CacheStack {
    pub backend: Arc<dyn CacheBackend>,
    pub taggable: Option<Arc<dyn TaggableBackend>>,
    pub profiler: Option<Arc<CacheProfiler>>,
}

impl CacheStack {
    fn plain(backend: Arc<dyn CacheBackend>, profiler: Option<Arc<CacheProfiler>>) -> Self {
        Self {
            backend,
            taggable: None,
            profiler,
        }
    }

    fn tagged<T: TaggableBackend + 'static>(top: Arc<T>, profiler: Option<Arc<CacheProfiler>>) -> Self {
        Self {
            backend: top.clone(),
            taggable: Some(top),
            profiler,
        }
    }
}

impl std::fmt::Debug for CacheStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStack")
            .field("backend", &self.backend.name())
            .field("tagging", &self.taggable.is_some())
            .field("profiling", &self.profiler.is_some())
            .finish()
    }
}

/// Builds backends, stacks and frontends from one [`CacheConfig`].
#[derive(Debug)]
pub struct Factory {
    config: CacheConfig,
    stack: CacheStack,
}

impl Factory {
    /// Validate `config` and compose the stack shared by every frontend.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let stack = Self::compose(&config)?;
        Ok(Self { config, stack })
    }

    /// Build from `ZEXT_CACHE_*` environment variables.
    pub fn from_env() -> CacheResult<Self> {
        Self::new(CacheConfig::from_env()?)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The shared stack.
    pub fn stack(&self) -> &CacheStack {
        &self.stack
    }

    /// A new leaf backend, undecorated.
    ///
    /// An LMDB leaf opens the configured path again, so it reads and writes
    /// the same records as the shared stack.
    pub fn create_backend(&self) -> CacheResult<Arc<dyn CacheBackend>> {
        Self::leaf(&self.config)
    }

    /// A new stack over a new leaf backend, with its own decorators.
    ///
    /// For a memory backend the stack is independent of the shared one. For
    /// an LMDB backend both stacks store into the same environment, so they
    /// see the same entries and tag lists, but tag list updates are only
    /// serialized within each stack. Tag through a single stack, usually
    /// [`Factory::stack`], when several writers run concurrently.
    pub fn create_stack(&self) -> CacheResult<CacheStack> {
        Self::compose(&self.config)
    }

    /// A frontend over the shared stack. `None` falls back to the configured
    /// namespace.
    pub fn create_frontend(&self, namespace: Option<&str>) -> CacheResult<Wrapper> {
        let namespace = namespace
            .or(self.config.namespace.as_deref())
            .unwrap_or_default();
        Wrapper::from_parts(
            Arc::clone(&self.stack.backend),
            self.stack.taggable.clone(),
            self.stack.profiler.clone(),
        )
        .with_default_lifetime(self.config.default_lifetime)
        .in_namespace(namespace, &self.config.namespace_separator)
    }

    fn leaf(config: &CacheConfig) -> CacheResult<Arc<dyn CacheBackend>> {
        let leaf: Arc<dyn CacheBackend> = match &config.backend {
            BackendKind::Memory => Arc::new(MemoryBackend::new()),
            BackendKind::Lmdb { path, max_size_mb } => {
                Arc::new(LmdbBackend::new(path, *max_size_mb)?)
            }
        };
        Ok(leaf)
    }

    fn compose(config: &CacheConfig) -> CacheResult<CacheStack> {
        let mut backend = Self::leaf(config)?;
        if config.serializer == SerializerKind::Json {
            backend = Arc::new(JsonSerializer::new(backend));
        }

        let profiler = config
            .profiling
            .then(|| Arc::new(CacheProfiler::new(config.profile_history)));

        let stack = if config.tagging {
            let tagged = if config.separate_tag_holder {
                Taggable::with_tag_holder(backend, Arc::new(MemoryBackend::new()))
            } else {
                Taggable::new(backend)
            };
            let tagged = Arc::new(tagged.with_prefix(config.tag_prefix.clone()));
            match &profiler {
                Some(p) => CacheStack::tagged(
                    Arc::new(Profileable::new(tagged, Arc::clone(p))),
                    profiler.clone(),
                ),
                None => CacheStack::tagged(tagged, None),
            }
        } else {
            match &profiler {
                Some(p) => CacheStack::plain(
                    Arc::new(Profileable::new(backend, Arc::clone(p))),
                    profiler.clone(),
                ),
                None => CacheStack::plain(backend, None),
            }
        };

        info!(
            backend = config.backend.name(),
            serializer = ?config.serializer,
            tagging = config.tagging,
            separate_tag_holder = config.separate_tag_holder,
            profiling = config.profiling,
            "Cache stack composed"
        );
        Ok(stack)
    }
}
