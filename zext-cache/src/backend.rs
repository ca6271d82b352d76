//! Cache backend traits.
//!
//! [`CacheBackend`] is the contract every store and every decorator honours.
//! [`TaggableBackend`] extends it with tag-indexed writes, reads and bulk
//! invalidation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use zext_core::{CacheResult, Lifetime, ValidationError};

/// Key/value store with per-entry lifetimes.
///
/// The trait is object-safe so stacks can be composed at runtime behind
/// `Arc<dyn CacheBackend>`. Implementations must be thread-safe.
///
/// # Expiry
///
/// An entry whose lifetime has elapsed must behave exactly like a missing
/// entry for every operation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend name used in logs and profile events.
    fn name(&self) -> &str;

    /// Get a value, or None if it is missing or expired.
    async fn get(&self, id: &str) -> CacheResult<Option<Value>>;

    /// Get several values at once. Missing keys are omitted from the result.
    async fn get_many(&self, ids: &[String]) -> CacheResult<HashMap<String, Value>> {
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(value) = self.get(id).await? {
                found.insert(id.clone(), value);
            }
        }
        Ok(found)
    }

    /// Store a value, replacing any previous one.
    async fn set(&self, id: &str, value: Value, lifetime: Lifetime) -> CacheResult<()>;

    /// Store several values with a shared lifetime.
    async fn set_many(&self, entries: Vec<(String, Value)>, lifetime: Lifetime) -> CacheResult<()> {
        for (id, value) in entries {
            self.set(&id, value, lifetime).await?;
        }
        Ok(())
    }

    /// Check whether a live entry exists.
    async fn has(&self, id: &str) -> CacheResult<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Remove an entry. Returns true when a live entry was removed.
    async fn remove(&self, id: &str) -> CacheResult<bool>;

    /// Remove several entries, returning how many were actually removed.
    async fn remove_many(&self, ids: &[String]) -> CacheResult<u64> {
        let mut removed = 0u64;
        for id in ids {
            if self.remove(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Add `step` to an integer entry and return the new value.
    ///
    /// Returns None when the entry is missing; the entry is never created.
    /// The entry keeps its original lifetime.
    async fn inc(&self, id: &str, step: i64) -> CacheResult<Option<i64>>;

    /// Subtract `step` from an integer entry.
    async fn dec(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        let negated = step.checked_neg().ok_or_else(|| ValidationError::Overflow {
            key: id.to_string(),
        })?;
        self.inc(id, negated).await
    }

    /// Remove every entry.
    async fn flush(&self) -> CacheResult<()>;
}

/// Backend that maintains a tag → member keys index next to the data.
#[async_trait]
pub trait TaggableBackend: CacheBackend {
    /// Store a value and register it under every tag.
    async fn set_tagged(
        &self,
        id: &str,
        value: Value,
        tags: &[String],
        lifetime: Lifetime,
    ) -> CacheResult<()>;

    /// Store several values and register all of them under every tag.
    async fn set_many_tagged(
        &self,
        entries: Vec<(String, Value)>,
        tags: &[String],
        lifetime: Lifetime,
    ) -> CacheResult<()>;

    /// Resolve tags to member keys.
    ///
    /// With `intersect` false the result is the union of the members of all
    /// tags; with `intersect` true only keys carrying every tag are kept.
    async fn keys_by_tag(&self, tags: &[String], intersect: bool) -> CacheResult<Vec<String>>;

    /// Fetch the live entries of the resolved keys.
    async fn get_by_tag(
        &self,
        tags: &[String],
        intersect: bool,
    ) -> CacheResult<HashMap<String, Value>>;

    /// Remove the entries of the resolved keys, returning how many were removed.
    async fn remove_by_tag(&self, tags: &[String], intersect: bool) -> CacheResult<u64>;

    /// Drop members of `tag` whose entries were removed or expired, returning
    /// how many were dropped. A list left empty is deleted.
    async fn prune_tag(&self, tag: &str) -> CacheResult<u64>;
}

/// Add `step` to a stored integer.
///
/// Integers and integer-valued strings are accepted; the result keeps the
/// representation of the stored value.
pub(crate) fn apply_step(id: &str, current: &Value, step: i64) -> CacheResult<(i64, Value)> {
    let not_numeric = || ValidationError::NotNumeric { key: id.to_string() };
    let overflow = || ValidationError::Overflow { key: id.to_string() };

    match current {
        Value::Number(n) => {
            let base = n.as_i64().ok_or_else(not_numeric)?;
            let next = base.checked_add(step).ok_or_else(overflow)?;
            Ok((next, Value::from(next)))
        }
        Value::String(s) => {
            let base: i64 = s.trim().parse().map_err(|_| not_numeric())?;
            let next = base.checked_add(step).ok_or_else(overflow)?;
            Ok((next, Value::String(next.to_string())))
        }
        _ => Err(not_numeric().into()),
    }
}
