//! Namespaced cache frontend.
//!
//! [`Wrapper`] is what applications hold. It prefixes keys and tags with its
//! namespace, applies a default lifetime, strips the namespace from keys it
//! hands back, and offers typed helpers over the JSON value model.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use zext_core::{ensure_key, CacheError, CacheResult, Lifetime, SerializationError};

use crate::backend::{CacheBackend, TaggableBackend};
use crate::namespace::Namespace;
use crate::profiler::CacheProfiler;

/// Application-facing cache handle. Cloning is cheap and clones share the stack.
#[derive(Clone)]
pub struct Wrapper {
    backend: Arc<dyn CacheBackend>,
    taggable: Option<Arc<dyn TaggableBackend>>,
    profiler: Option<Arc<CacheProfiler>>,
    namespace: Namespace,
    separator: String,
    default_lifetime: Lifetime,
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wrapper")
            .field("backend", &self.backend.name())
            .field("tagging", &self.taggable.is_some())
            .field("profiling", &self.profiler.is_some())
            .field("namespace", &self.namespace.name())
            .field("default_lifetime", &self.default_lifetime)
            .finish()
    }
}

impl Wrapper {
    /// Frontend over a plain backend; tag operations are unavailable.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            taggable: None,
            profiler: None,
            namespace: Namespace::root(),
            separator: crate::namespace::DEFAULT_SEPARATOR.to_string(),
            default_lifetime: Lifetime::Forever,
        }
    }

    /// Frontend over a taggable backend.
    pub fn taggable<T: TaggableBackend + 'static>(backend: Arc<T>) -> Self {
        let mut wrapper = Self::new(backend.clone());
        wrapper.taggable = Some(backend);
        wrapper
    }

    pub(crate) fn from_parts(
        backend: Arc<dyn CacheBackend>,
        taggable: Option<Arc<dyn TaggableBackend>>,
        profiler: Option<Arc<CacheProfiler>>,
    ) -> Self {
        let mut wrapper = Self::new(backend);
        wrapper.taggable = taggable;
        wrapper.profiler = profiler;
        wrapper
    }

    /// Use `name` as namespace, joined to keys with `separator`.
    pub fn in_namespace(mut self, name: &str, separator: &str) -> CacheResult<Self> {
        self.namespace = Namespace::new(name, separator)?;
        self.separator = separator.to_string();
        Ok(self)
    }

    /// A frontend over the same stack in another namespace.
    pub fn with_namespace(&self, name: &str) -> CacheResult<Self> {
        let separator = self.separator.clone();
        self.clone().in_namespace(name, &separator)
    }

    pub fn with_default_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.default_lifetime = lifetime;
        self
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.name()
    }

    pub fn default_lifetime(&self) -> Lifetime {
        self.default_lifetime
    }

    pub fn supports_tags(&self) -> bool {
        self.taggable.is_some()
    }

    pub fn profiler(&self) -> Option<&Arc<CacheProfiler>> {
        self.profiler.as_ref()
    }

    pub fn backend(&self) -> &dyn CacheBackend {
        self.backend.as_ref()
    }

    fn tagged(&self) -> CacheResult<&dyn TaggableBackend> {
        self.taggable.as_deref().ok_or(CacheError::TaggingUnsupported)
    }

    fn key(&self, id: &str) -> CacheResult<String> {
        ensure_key(id)?;
        Ok(self.namespace.apply(id))
    }

    fn keys<S: AsRef<str>>(&self, ids: &[S]) -> CacheResult<Vec<String>> {
        ids.iter().map(|id| self.key(id.as_ref())).collect()
    }

    fn entries(&self, entries: Vec<(String, Value)>) -> CacheResult<Vec<(String, Value)>> {
        entries
            .into_iter()
            .map(|(id, value)| self.key(&id).map(|key| (key, value)))
            .collect()
    }

    fn tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        // Empty tags stay empty so the tag layer rejects them.
        tags.iter()
            .map(|t| match t.as_ref() {
                "" => String::new(),
                tag => self.namespace.apply(tag),
            })
            .collect()
    }

    /// Map stored keys back to application keys, dropping foreign ones.
    fn unscoped(&self, found: HashMap<String, Value>) -> HashMap<String, Value> {
        found
            .into_iter()
            .filter_map(|(stored, value)| {
                self.namespace
                    .strip(&stored)
                    .map(|id| (id.to_string(), value))
            })
            .collect()
    }

    pub async fn get(&self, id: &str) -> CacheResult<Option<Value>> {
        self.backend.get(&self.key(id)?).await
    }

    pub async fn get_many<S: AsRef<str>>(&self, ids: &[S]) -> CacheResult<HashMap<String, Value>> {
        let keys = self.keys(ids)?;
        let found = self.backend.get_many(&keys).await?;
        Ok(self.unscoped(found))
    }

    /// Store with the frontend's default lifetime.
    pub async fn set(&self, id: &str, value: impl Into<Value>) -> CacheResult<()> {
        self.set_with_lifetime(id, value, self.default_lifetime).await
    }

    pub async fn set_with_lifetime(
        &self,
        id: &str,
        value: impl Into<Value>,
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        self.backend.set(&self.key(id)?, value.into(), lifetime).await
    }

    pub async fn set_many(&self, entries: Vec<(String, Value)>) -> CacheResult<()> {
        self.set_many_with_lifetime(entries, self.default_lifetime).await
    }

    pub async fn set_many_with_lifetime(
        &self,
        entries: Vec<(String, Value)>,
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        let entries = self.entries(entries)?;
        self.backend.set_many(entries, lifetime).await
    }

    pub async fn has(&self, id: &str) -> CacheResult<bool> {
        self.backend.has(&self.key(id)?).await
    }

    pub async fn remove(&self, id: &str) -> CacheResult<bool> {
        self.backend.remove(&self.key(id)?).await
    }

    pub async fn remove_many<S: AsRef<str>>(&self, ids: &[S]) -> CacheResult<u64> {
        let keys = self.keys(ids)?;
        self.backend.remove_many(&keys).await
    }

    pub async fn inc(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.backend.inc(&self.key(id)?, step).await
    }

    pub async fn dec(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.backend.dec(&self.key(id)?, step).await
    }

    /// Clear the whole underlying store, every namespace included.
    pub async fn flush(&self) -> CacheResult<()> {
        self.backend.flush().await
    }

    /// Read and deserialize a value.
    pub async fn get_as<T: DeserializeOwned>(&self, id: &str) -> CacheResult<Option<T>> {
        match self.get(id).await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                SerializationError::Decode {
                    key: id.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
        }
    }

    /// Serialize and store a value with the default lifetime.
    pub async fn set_as<T: Serialize + ?Sized>(&self, id: &str, value: &T) -> CacheResult<()> {
        let value = serde_json::to_value(value).map_err(|e| SerializationError::Encode {
            reason: e.to_string(),
        })?;
        self.set(id, value).await
    }

    /// Return the cached value, or produce, store and return it.
    pub async fn remember<F, Fut>(
        &self,
        id: &str,
        lifetime: Lifetime,
        producer: F,
    ) -> CacheResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CacheResult<Value>>,
    {
        if let Some(value) = self.get(id).await? {
            return Ok(value);
        }
        let value = producer().await?;
        self.set_with_lifetime(id, value.clone(), lifetime).await?;
        Ok(value)
    }

    pub async fn set_tagged<S: AsRef<str>>(
        &self,
        id: &str,
        value: impl Into<Value>,
        tags: &[S],
    ) -> CacheResult<()> {
        self.set_tagged_with_lifetime(id, value, tags, self.default_lifetime)
            .await
    }

    pub async fn set_tagged_with_lifetime<S: AsRef<str>>(
        &self,
        id: &str,
        value: impl Into<Value>,
        tags: &[S],
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        let backend = self.tagged()?;
        let key = self.key(id)?;
        backend
            .set_tagged(&key, value.into(), &self.tags(tags), lifetime)
            .await
    }

    pub async fn set_many_tagged<S: AsRef<str>>(
        &self,
        entries: Vec<(String, Value)>,
        tags: &[S],
    ) -> CacheResult<()> {
        let backend = self.tagged()?;
        let entries = self.entries(entries)?;
        backend
            .set_many_tagged(entries, &self.tags(tags), self.default_lifetime)
            .await
    }

    /// Application keys carrying any (or, with `intersect`, every) tag.
    pub async fn keys_by_tag<S: AsRef<str>>(
        &self,
        tags: &[S],
        intersect: bool,
    ) -> CacheResult<Vec<String>> {
        let backend = self.tagged()?;
        let keys = backend.keys_by_tag(&self.tags(tags), intersect).await?;
        Ok(keys
            .iter()
            .filter_map(|stored| self.namespace.strip(stored).map(str::to_string))
            .collect())
    }

    pub async fn get_by_tag<S: AsRef<str>>(
        &self,
        tags: &[S],
        intersect: bool,
    ) -> CacheResult<HashMap<String, Value>> {
        let backend = self.tagged()?;
        let found = backend.get_by_tag(&self.tags(tags), intersect).await?;
        Ok(self.unscoped(found))
    }

    pub async fn remove_by_tag<S: AsRef<str>>(&self, tags: &[S], intersect: bool) -> CacheResult<u64> {
        let backend = self.tagged()?;
        backend.remove_by_tag(&self.tags(tags), intersect).await
    }

    /// Drop stale members from a tag's list in this namespace.
    pub async fn prune_tag(&self, tag: &str) -> CacheResult<u64> {
        let backend = self.tagged()?;
        let tag = self.tags(&[tag]).remove(0);
        backend.prune_tag(&tag).await
    }
}
