//! In-process backend over a concurrent hash map.
//!
//! Entries carry an optional deadline. Expired entries are dropped lazily
//! when touched and eagerly by [`MemoryBackend::purge_expired`].

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use zext_core::{ensure_key, CacheResult, Lifetime};

use crate::backend::{apply_step, CacheBackend};

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Array-style backend living in process memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Entry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    fn evict_if_expired(&self, id: &str, now: Instant) {
        self.entries.remove_if(id, |_, entry| entry.is_expired(now));
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, id: &str) -> CacheResult<Option<Value>> {
        let now = Instant::now();
        match self.entries.get(id) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        self.evict_if_expired(id, now);
        Ok(None)
    }

    async fn get_many(&self, ids: &[String]) -> CacheResult<HashMap<String, Value>> {
        let now = Instant::now();
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.entries.get(id.as_str()) {
                if !entry.is_expired(now) {
                    found.insert(id.clone(), entry.value.clone());
                }
            }
        }
        Ok(found)
    }

    async fn set(&self, id: &str, value: Value, lifetime: Lifetime) -> CacheResult<()> {
        ensure_key(id)?;
        let entry = Entry {
            value,
            expires_at: lifetime.expires_at(Instant::now()),
        };
        self.entries.insert(id.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, id: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(id)
            .map(|(_, entry)| !entry.is_expired(now))
            .unwrap_or(false))
    }

    async fn inc(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        let now = Instant::now();
        match self.entries.get_mut(id) {
            None => return Ok(None),
            Some(mut entry) if !entry.is_expired(now) => {
                let (next, stored) = apply_step(id, &entry.value, step)?;
                entry.value = stored;
                return Ok(Some(next));
            }
            // Evicted below, once the shard guard is released.
            Some(_) => {}
        }
        self.evict_if_expired(id, now);
        Ok(None)
    }

    async fn flush(&self) -> CacheResult<()> {
        self.entries.clear();
        Ok(())
    }
}
