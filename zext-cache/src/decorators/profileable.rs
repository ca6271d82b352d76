//! Profiling decorator.
//!
//! Times every call on the wrapped backend, records a [`ProfileEvent`] in the
//! shared [`CacheProfiler`] and emits a matching `tracing` debug event. Tag
//! operations are forwarded (and profiled) when the inner backend is taggable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use zext_core::{CacheResult, Lifetime};

use crate::backend::{CacheBackend, TaggableBackend};
use crate::profiler::{CacheProfiler, Outcome, ProfileEvent};

pub struct Profileable<B: ?Sized> {
    inner: Arc<B>,
    profiler: Arc<CacheProfiler>,
}

impl<B: CacheBackend + ?Sized> Profileable<B> {
    pub fn new(inner: Arc<B>, profiler: Arc<CacheProfiler>) -> Self {
        Self { inner, profiler }
    }

    pub fn profiler(&self) -> &Arc<CacheProfiler> {
        &self.profiler
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn observe<T, F, C>(
        &self,
        operation: &'static str,
        keys: Vec<String>,
        call: F,
        classify: C,
    ) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
        C: FnOnce(&T) -> Outcome,
    {
        let started = Instant::now();
        let result = call.await;
        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(value) => classify(value),
            Err(_) => Outcome::Error,
        };

        debug!(
            backend = self.inner.name(),
            operation,
            keys = ?keys,
            outcome = ?outcome,
            elapsed_us = elapsed.as_micros() as u64,
            "cache call"
        );
        self.profiler.record(ProfileEvent {
            operation,
            keys,
            elapsed,
            outcome,
            at: Utc::now(),
        });
        result
    }
}

fn hit_or_miss(found: bool) -> Outcome {
    if found {
        Outcome::Hit
    } else {
        Outcome::Miss
    }
}

#[async_trait]
impl<B: CacheBackend + ?Sized> CacheBackend for Profileable<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, id: &str) -> CacheResult<Option<Value>> {
        self.observe("get", vec![id.to_string()], self.inner.get(id), |v| {
            hit_or_miss(v.is_some())
        })
        .await
    }

    async fn get_many(&self, ids: &[String]) -> CacheResult<HashMap<String, Value>> {
        let wanted = ids.len();
        self.observe("get_many", ids.to_vec(), self.inner.get_many(ids), |found| {
            hit_or_miss(found.len() == wanted)
        })
        .await
    }

    async fn set(&self, id: &str, value: Value, lifetime: Lifetime) -> CacheResult<()> {
        self.observe(
            "set",
            vec![id.to_string()],
            self.inner.set(id, value, lifetime),
            |_| Outcome::Write,
        )
        .await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>, lifetime: Lifetime) -> CacheResult<()> {
        let keys = entries.iter().map(|(id, _)| id.clone()).collect();
        self.observe(
            "set_many",
            keys,
            self.inner.set_many(entries, lifetime),
            |_| Outcome::Write,
        )
        .await
    }

    async fn has(&self, id: &str) -> CacheResult<bool> {
        self.observe("has", vec![id.to_string()], self.inner.has(id), |found| {
            hit_or_miss(*found)
        })
        .await
    }

    async fn remove(&self, id: &str) -> CacheResult<bool> {
        self.observe("remove", vec![id.to_string()], self.inner.remove(id), |_| {
            Outcome::Delete
        })
        .await
    }

    async fn remove_many(&self, ids: &[String]) -> CacheResult<u64> {
        self.observe("remove_many", ids.to_vec(), self.inner.remove_many(ids), |_| {
            Outcome::Delete
        })
        .await
    }

    async fn inc(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.observe("inc", vec![id.to_string()], self.inner.inc(id, step), |v| {
            if v.is_some() {
                Outcome::Write
            } else {
                Outcome::Miss
            }
        })
        .await
    }

    async fn dec(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.observe("dec", vec![id.to_string()], self.inner.dec(id, step), |v| {
            if v.is_some() {
                Outcome::Write
            } else {
                Outcome::Miss
            }
        })
        .await
    }

    async fn flush(&self) -> CacheResult<()> {
        self.observe("flush", Vec::new(), self.inner.flush(), |_| Outcome::Delete)
            .await
    }
}

#[async_trait]
impl<B: TaggableBackend + ?Sized> TaggableBackend for Profileable<B> {
    async fn set_tagged(
        &self,
        id: &str,
        value: Value,
        tags: &[String],
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        self.observe(
            "set_tagged",
            vec![id.to_string()],
            self.inner.set_tagged(id, value, tags, lifetime),
            |_| Outcome::Write,
        )
        .await
    }

    async fn set_many_tagged(
        &self,
        entries: Vec<(String, Value)>,
        tags: &[String],
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        let keys = entries.iter().map(|(id, _)| id.clone()).collect();
        self.observe(
            "set_many_tagged",
            keys,
            self.inner.set_many_tagged(entries, tags, lifetime),
            |_| Outcome::Write,
        )
        .await
    }

    async fn keys_by_tag(&self, tags: &[String], intersect: bool) -> CacheResult<Vec<String>> {
        self.observe(
            "keys_by_tag",
            tags.to_vec(),
            self.inner.keys_by_tag(tags, intersect),
            |keys| hit_or_miss(!keys.is_empty()),
        )
        .await
    }

    async fn get_by_tag(
        &self,
        tags: &[String],
        intersect: bool,
    ) -> CacheResult<HashMap<String, Value>> {
        self.observe(
            "get_by_tag",
            tags.to_vec(),
            self.inner.get_by_tag(tags, intersect),
            |found| hit_or_miss(!found.is_empty()),
        )
        .await
    }

    async fn remove_by_tag(&self, tags: &[String], intersect: bool) -> CacheResult<u64> {
        self.observe(
            "remove_by_tag",
            tags.to_vec(),
            self.inner.remove_by_tag(tags, intersect),
            |_| Outcome::Delete,
        )
        .await
    }

    async fn prune_tag(&self, tag: &str) -> CacheResult<u64> {
        self.observe(
            "prune_tag",
            vec![tag.to_string()],
            self.inner.prune_tag(tag),
            |_| Outcome::Delete,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryBackend;
    use crate::decorators::Taggable;
    use serde_json::json;
    use zext_core::{CacheError, ValidationError};

    fn profiled() -> Profileable<MemoryBackend> {
        Profileable::new(Arc::new(MemoryBackend::new()), Arc::new(CacheProfiler::new(100)))
    }

    #[tokio::test]
    async fn test_records_hits_misses_and_writes() {
        let cache = profiled();
        cache.get("k").await.unwrap();
        cache.set("k", json!(1), Lifetime::Forever).await.unwrap();
        cache.get("k").await.unwrap();
        cache.get("k").await.unwrap();

        let stats = cache.profiler().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.writes, 1);

        let ops: Vec<&str> = cache.profiler().events().iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec!["get", "set", "get", "get"]);
    }

    #[tokio::test]
    async fn test_errors_are_recorded_and_propagated() {
        let cache = profiled();
        let err = cache.set("", json!(1), Lifetime::Forever).await.unwrap_err();
        assert_eq!(err, CacheError::Validation(ValidationError::EmptyKey));
        assert_eq!(cache.profiler().stats().errors, 1);
    }

    #[tokio::test]
    async fn test_get_many_partial_is_miss() {
        let cache = profiled();
        cache.set("a", json!(1), Lifetime::Forever).await.unwrap();
        cache
            .get_many(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        let events = cache.profiler().events();
        let last = events.last().unwrap();
        assert_eq!(last.operation, "get_many");
        assert_eq!(last.outcome, Outcome::Miss);
        assert_eq!(last.keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_forwards_tag_operations() {
        let data: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new());
        let profiler = Arc::new(CacheProfiler::new(100));
        let cache = Profileable::new(Arc::new(Taggable::new(data)), Arc::clone(&profiler));

        cache
            .set_tagged("k", json!("v"), &["t".to_string()], Lifetime::Forever)
            .await
            .unwrap();
        let found = cache.get_by_tag(&["t".to_string()], false).await.unwrap();
        assert_eq!(found["k"], json!("v"));
        assert_eq!(cache.remove_by_tag(&["t".to_string()], false).await.unwrap(), 1);

        let ops: Vec<&str> = profiler.events().iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec!["set_tagged", "get_by_tag", "remove_by_tag"]);
        assert_eq!(profiler.stats().hits, 1);
    }
}
