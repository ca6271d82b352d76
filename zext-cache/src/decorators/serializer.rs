//! JSON serialization decorator.
//!
//! Structured values are stored as JSON text so that stores which only keep
//! scalars see plain strings. Integers pass through untouched, which keeps
//! `inc`/`dec` working on the underlying store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use zext_core::{CacheResult, Lifetime, SerializationError};

use crate::backend::CacheBackend;

/// Decorator that encodes values to JSON text on write and decodes on read.
pub struct JsonSerializer<B: ?Sized> {
    inner: Arc<B>,
}

impl<B: CacheBackend + ?Sized> JsonSerializer<B> {
    pub fn new(inner: Arc<B>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

fn encode(value: Value) -> CacheResult<Value> {
    if is_integer(&value) {
        return Ok(value);
    }
    let text = serde_json::to_string(&value).map_err(|e| SerializationError::Encode {
        reason: e.to_string(),
    })?;
    Ok(Value::String(text))
}

fn decode(id: &str, stored: Value) -> CacheResult<Value> {
    match stored {
        Value::String(text) => {
            serde_json::from_str(&text).map_err(|e| {
                SerializationError::Decode {
                    key: id.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
        }
        other => Ok(other),
    }
}

#[async_trait]
impl<B: CacheBackend + ?Sized> CacheBackend for JsonSerializer<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, id: &str) -> CacheResult<Option<Value>> {
        match self.inner.get(id).await? {
            Some(stored) => decode(id, stored).map(Some),
            None => Ok(None),
        }
    }

    async fn get_many(&self, ids: &[String]) -> CacheResult<HashMap<String, Value>> {
        self.inner
            .get_many(ids)
            .await?
            .into_iter()
            .map(|(id, stored)| decode(&id, stored).map(|value| (id, value)))
            .collect()
    }

    async fn set(&self, id: &str, value: Value, lifetime: Lifetime) -> CacheResult<()> {
        self.inner.set(id, encode(value)?, lifetime).await
    }

    async fn set_many(&self, entries: Vec<(String, Value)>, lifetime: Lifetime) -> CacheResult<()> {
        let encoded = entries
            .into_iter()
            .map(|(id, value)| encode(value).map(|v| (id, v)))
            .collect::<CacheResult<Vec<_>>>()?;
        self.inner.set_many(encoded, lifetime).await
    }

    async fn has(&self, id: &str) -> CacheResult<bool> {
        self.inner.has(id).await
    }

    async fn remove(&self, id: &str) -> CacheResult<bool> {
        self.inner.remove(id).await
    }

    async fn remove_many(&self, ids: &[String]) -> CacheResult<u64> {
        self.inner.remove_many(ids).await
    }

    async fn inc(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.inner.inc(id, step).await
    }

    async fn dec(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        self.inner.dec(id, step).await
    }

    async fn flush(&self) -> CacheResult<()> {
        self.inner.flush().await
    }
}
