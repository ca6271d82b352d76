//! Tag-indexing decorator.
//!
//! Wraps a data backend and a tag holder backend. Every tag owns a member
//! list (a JSON array of keys) stored in the holder under
//! `"{tag_prefix}{tag}"`. Writes append to member lists; tag reads and
//! deletes resolve lists to keys and delegate to the data backend.
//!
//! Member lists may reference keys that were removed or expired since they
//! were tagged. Such stale members are skipped at read time and can be
//! compacted with [`TaggableBackend::prune_tag`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zext_core::{ensure_key, ensure_tags, CacheResult, Lifetime, ValidationError};

use crate::backend::{CacheBackend, TaggableBackend};

/// Default key prefix for tag member lists.
pub const DEFAULT_TAG_PREFIX: &str = "__tag__";

/// Decorator adding tag → member keys indexing to any backend.
pub struct Taggable {
    backend: Arc<dyn CacheBackend>,
    holder: Arc<dyn CacheBackend>,
    tag_prefix: String,
    shared_holder: bool,
    /// Serializes read-modify-write cycles on member lists.
    index_lock: Mutex<()>,
}

impl Taggable {
    /// Tag lists live in the data backend itself.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            holder: Arc::clone(&backend),
            backend,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            shared_holder: true,
            index_lock: Mutex::new(()),
        }
    }

    /// Tag lists live in a dedicated holder backend.
    pub fn with_tag_holder(backend: Arc<dyn CacheBackend>, holder: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            holder,
            tag_prefix: DEFAULT_TAG_PREFIX.to_string(),
            shared_holder: false,
            index_lock: Mutex::new(()),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    pub fn tag_prefix(&self) -> &str {
        &self.tag_prefix
    }

    pub fn backend(&self) -> &dyn CacheBackend {
        self.backend.as_ref()
    }

    pub fn holder(&self) -> &dyn CacheBackend {
        self.holder.as_ref()
    }

    fn tag_key(&self, tag: &str) -> String {
        format!("{}{}", self.tag_prefix, tag)
    }

    /// With a shared holder, data keys under the tag prefix would overwrite
    /// member lists.
    fn ensure_data_key(&self, id: &str) -> CacheResult<()> {
        ensure_key(id)?;
        if self.shared_holder && id.starts_with(self.tag_prefix.as_str()) {
            return Err(ValidationError::ReservedKey {
                key: id.to_string(),
                prefix: self.tag_prefix.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Load the member list of a tag; unknown tags have no members.
    async fn members(&self, tag: &str) -> CacheResult<Vec<String>> {
        let stored = self.holder.get(&self.tag_key(tag)).await?;
        Ok(match stored {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(id) => Some(id),
                    _ => None,
                })
                .collect(),
            Some(other) => {
                warn!(tag, kind = ?other, "ignoring malformed tag member list");
                Vec::new()
            }
        })
    }

    async fn store_members(&self, tag: &str, members: Vec<String>) -> CacheResult<()> {
        let key = self.tag_key(tag);
        if members.is_empty() {
            self.holder.remove(&key).await?;
            return Ok(());
        }
        let list = Value::Array(members.into_iter().map(Value::String).collect());
        self.holder.set(&key, list, Lifetime::Forever).await
    }

    /// Append keys to every tag's list, keeping first-insertion order.
    async fn append_members(&self, ids: &[String], tags: &[String]) -> CacheResult<()> {
        let _guard = self.index_lock.lock().await;
        for tag in distinct(tags) {
            let mut members = self.members(tag).await?;
            let mut seen: HashSet<String> = members.iter().cloned().collect();
            let before = members.len();
            for id in ids {
                if seen.insert(id.clone()) {
                    members.push(id.clone());
                }
            }
            if members.len() != before {
                self.store_members(tag, members).await?;
            }
        }
        Ok(())
    }

    async fn resolve(&self, tags: &[String], intersect: bool) -> CacheResult<Vec<String>> {
        let tags = distinct(tags);
        let Some((first, rest)) = tags.split_first() else {
            return Ok(Vec::new());
        };

        let first_members = self.members(first).await?;
        if !intersect {
            let mut seen: HashSet<String> = first_members.iter().cloned().collect();
            let mut keys = first_members;
            for tag in rest {
                for id in self.members(tag).await? {
                    if seen.insert(id.clone()) {
                        keys.push(id);
                    }
                }
            }
            return Ok(keys);
        }

        let mut keys = dedup(first_members);
        for tag in rest {
            if keys.is_empty() {
                break;
            }
            let members: HashSet<String> = self.members(tag).await?.into_iter().collect();
            keys.retain(|id| members.contains(id));
        }
        Ok(keys)
    }
}

/// Tags in first-occurrence order without duplicates.
fn distinct(tags: &[String]) -> Vec<&String> {
    let mut seen = HashSet::new();
    tags.iter().filter(|t| seen.insert(t.as_str())).collect()
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[async_trait]
impl CacheBackend for Taggable {
    fn name(&self) -> &str {
        self.backend.name()
    }

    async fn get(&self, id: &str) -> CacheResult<Option<Value>> {
        self.backend.get(id).await
    }

    async fn get_many(&self, ids: &[String]) -> CacheResult<HashMap<String, Value>> {
        self.backend.get_many(ids).await
    }

    async fn set(&self, id: &str, value: Value, lifetime: Lifetime) -> CacheResult<()> {
        self.ensure_data_key(id)?;
        self.backend.set(id, value, lifetime).await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>, lifetime: Lifetime) -> CacheResult<()> {
        for (id, _) in &entries {
            self.ensure_data_key(id)?;
        }
        self.backend.set_many(entries, lifetime).await
    }

    async fn has(&self, id: &str) -> CacheResult<bool> {
        self.backend.has(id).await
    }

    async fn remove(&self, id: &str) -> CacheResult<bool> {
        self.backend.remove(id).await
    }

    async fn remove_many(&self, ids: &[String]) -> CacheResult<u64> {
        self.backend.remove_many(ids).await
    }

    async fn inc(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.backend.inc(id, step).await
    }

    async fn dec(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.backend.dec(id, step).await
    }

    async fn flush(&self) -> CacheResult<()> {
        self.backend.flush().await?;
        if !self.shared_holder {
            self.holder.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaggableBackend for Taggable {
    async fn set_tagged(
        &self,
        id: &str,
        value: Value,
        tags: &[String],
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        self.ensure_data_key(id)?;
        ensure_tags(tags)?;
        self.backend.set(id, value, lifetime).await?;
        self.append_members(&[id.to_string()], tags).await
    }

    async fn set_many_tagged(
        &self,
        entries: Vec<(String, Value)>,
        tags: &[String],
        lifetime: Lifetime,
    ) -> CacheResult<()> {
        ensure_tags(tags)?;
        for (id, _) in &entries {
            self.ensure_data_key(id)?;
        }
        let ids: Vec<String> = entries.iter().map(|(id, _)| id.clone()).collect();
        self.backend.set_many(entries, lifetime).await?;
        self.append_members(&ids, tags).await
    }

    async fn keys_by_tag(&self, tags: &[String], intersect: bool) -> CacheResult<Vec<String>> {
        ensure_tags(tags)?;
        self.resolve(tags, intersect).await
    }

    async fn get_by_tag(
        &self,
        tags: &[String],
        intersect: bool,
    ) -> CacheResult<HashMap<String, Value>> {
        ensure_tags(tags)?;
        let keys = self.resolve(tags, intersect).await?;
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        self.backend.get_many(&keys).await
    }

    async fn remove_by_tag(&self, tags: &[String], intersect: bool) -> CacheResult<u64> {
        ensure_tags(tags)?;
        let _guard = self.index_lock.lock().await;
        let keys = self.resolve(tags, intersect).await?;
        let removed = if keys.is_empty() {
            0
        } else {
            self.backend.remove_many(&keys).await?
        };

        if intersect {
            let gone: HashSet<&String> = keys.iter().collect();
            for tag in distinct(tags) {
                let members = self.members(tag).await?;
                let before = members.len();
                let kept: Vec<String> = members.into_iter().filter(|id| !gone.contains(id)).collect();
                if kept.len() != before {
                    self.store_members(tag, kept).await?;
                }
            }
        } else {
            let tag_keys: Vec<String> = distinct(tags).into_iter().map(|t| self.tag_key(t)).collect();
            self.holder.remove_many(&tag_keys).await?;
        }

        debug!(?tags, intersect, removed, "removed entries by tag");
        Ok(removed)
    }

    async fn prune_tag(&self, tag: &str) -> CacheResult<u64> {
        ensure_tags(&[tag])?;
        let _guard = self.index_lock.lock().await;
        let members = self.members(tag).await?;
        if members.is_empty() {
            return Ok(0);
        }
        let live = self.backend.get_many(&members).await?;
        let before = members.len();
        let kept: Vec<String> = members.into_iter().filter(|id| live.contains_key(id)).collect();
        let dropped = (before - kept.len()) as u64;
        if dropped > 0 {
            self.store_members(tag, kept).await?;
        }
        debug!(tag, dropped, "pruned tag member list");
        Ok(dropped)
    }
}
