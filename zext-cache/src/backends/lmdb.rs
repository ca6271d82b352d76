//! LMDB-backed cache backend.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a persistent,
//! memory-mapped key-value store. Keys are stored as their UTF-8 bytes.
//!
//! # Record Format
//!
//! `[expires_at: 8 bytes, i64 LE unix millis, 0 = never][json value]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, `remove`, `inc` and `flush`
//! - `inc` reads and writes inside a single write transaction, so concurrent
//!   increments never lose updates

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use serde_json::Value;
use tracing::warn;
use zext_core::{ensure_key, BackendError, CacheError, CacheResult, Lifetime, SerializationError};

use crate::backend::{apply_step, CacheBackend};

const HEADER_LEN: usize = 8;

/// Error type for LMDB backend operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbError to CacheError.
impl From<LmdbError> for CacheError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::EnvOpen(reason) | LmdbError::DbOpen(reason) => {
                CacheError::Backend(BackendError::Unavailable {
                    backend: "lmdb".to_string(),
                    reason,
                })
            }
            LmdbError::Transaction(reason) => {
                CacheError::Backend(BackendError::Transaction { reason })
            }
            LmdbError::Serialization(reason) => {
                CacheError::Serialization(SerializationError::Encode { reason })
            }
            LmdbError::Io(err) => CacheError::Backend(BackendError::Io {
                reason: err.to_string(),
            }),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbError {
    LmdbError::Transaction(e.to_string())
}

/// A decoded record.
struct Record {
    value: Value,
    expires_at_millis: i64,
}

impl Record {
    fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at_millis != 0 && self.expires_at_millis <= now_millis
    }

    fn encode(value: &Value, expires_at_millis: i64) -> Result<Vec<u8>, LmdbError> {
        let value_bytes =
            serde_json::to_vec(value).map_err(|e| LmdbError::Serialization(e.to_string()))?;
        let mut bytes = Vec::with_capacity(HEADER_LEN + value_bytes.len());
        bytes.extend_from_slice(&expires_at_millis.to_le_bytes());
        bytes.extend_from_slice(&value_bytes);
        Ok(bytes)
    }

    /// Returns None for truncated records.
    fn decode(id: &str, bytes: &[u8]) -> CacheResult<Option<Self>> {
        if bytes.len() < HEADER_LEN {
            warn!(key = id, len = bytes.len(), "dropping truncated lmdb record");
            return Ok(None);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&bytes[..HEADER_LEN]);
        let value = serde_json::from_slice(&bytes[HEADER_LEN..]).map_err(|e| {
            SerializationError::Decode {
                key: id.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some(Self {
            value,
            expires_at_millis: i64::from_le_bytes(header),
        }))
    }
}

fn deadline_millis(lifetime: Lifetime) -> i64 {
    match lifetime.as_duration() {
        None => 0,
        Some(d) => Utc::now()
            .timestamp_millis()
            .saturating_add(i64::try_from(d.as_millis()).unwrap_or(i64::MAX)),
    }
}

/// Persistent backend on an LMDB environment.
///
/// # Example
///
/// ```ignore
/// use zext_cache::backends::LmdbBackend;
///
/// let backend = LmdbBackend::new("/var/cache/app", 64)?;
/// backend.set("greeting", json!("hello"), Lifetime::Seconds(60)).await?;
/// ```
pub struct LmdbBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbBackend {
    /// Open (or create) an LMDB backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, db })
    }

    /// Number of records, including ones that expired but were not yet touched.
    pub fn record_count(&self) -> CacheResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.db.len(&rtxn).map_err(txn_err)?)
    }

    /// Delete every expired record, returning how many were removed.
    pub fn purge_expired(&self) -> CacheResult<u64> {
        let now = Utc::now().timestamp_millis();
        let expired: Vec<Vec<u8>> = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            let mut keys = Vec::new();
            for item in self.db.iter(&rtxn).map_err(txn_err)? {
                let (key, bytes) = item.map_err(txn_err)?;
                let stamp = bytes
                    .get(..HEADER_LEN)
                    .and_then(|h| <[u8; HEADER_LEN]>::try_from(h).ok())
                    .map(i64::from_le_bytes);
                if let Some(stamp) = stamp {
                    if stamp != 0 && stamp <= now {
                        keys.push(key.to_vec());
                    }
                }
            }
            keys
        };

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut removed = 0u64;
        for key in &expired {
            if self.db.delete(&mut wtxn, key).map_err(txn_err)? {
                removed += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(removed)
    }

    fn delete_expired(&self, id: &str) -> CacheResult<()> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        // Re-check inside the write txn: a writer may have refreshed the key.
        let still_expired = match self.db.get(&wtxn, id.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Record::decode(id, bytes)?.map_or(true, |r| r.is_expired(now)),
            None => false,
        };
        if still_expired {
            self.db.delete(&mut wtxn, id.as_bytes()).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for LmdbBackend {
    fn name(&self) -> &str {
        "lmdb"
    }

    async fn get(&self, id: &str) -> CacheResult<Option<Value>> {
        let now = Utc::now().timestamp_millis();
        let record = {
            let rtxn = self.env.read_txn().map_err(txn_err)?;
            match self.db.get(&rtxn, id.as_bytes()).map_err(txn_err)? {
                Some(bytes) => Record::decode(id, bytes)?,
                None => return Ok(None),
            }
        };

        match record {
            Some(record) if !record.is_expired(now) => Ok(Some(record.value)),
            _ => {
                self.delete_expired(id)?;
                Ok(None)
            }
        }
    }

    async fn get_many(&self, ids: &[String]) -> CacheResult<HashMap<String, Value>> {
        let now = Utc::now().timestamp_millis();
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut found = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = self.db.get(&rtxn, id.as_bytes()).map_err(txn_err)? {
                if let Some(record) = Record::decode(id, bytes)? {
                    if !record.is_expired(now) {
                        found.insert(id.clone(), record.value);
                    }
                }
            }
        }
        Ok(found)
    }

    async fn set(&self, id: &str, value: Value, lifetime: Lifetime) -> CacheResult<()> {
        ensure_key(id)?;
        let bytes = Record::encode(&value, deadline_millis(lifetime))?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db
            .put(&mut wtxn, id.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(String, Value)>, lifetime: Lifetime) -> CacheResult<()> {
        let deadline = deadline_millis(lifetime);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        for (id, value) in &entries {
            ensure_key(id)?;
            let bytes = Record::encode(value, deadline)?;
            self.db
                .put(&mut wtxn, id.as_bytes(), &bytes)
                .map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> CacheResult<bool> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let live = match self.db.get(&wtxn, id.as_bytes()).map_err(txn_err)? {
            // Undecodable records still count as removed.
            Some(bytes) => match Record::decode(id, bytes) {
                Ok(Some(record)) => !record.is_expired(now),
                Ok(None) | Err(_) => true,
            },
            None => return Ok(false),
        };
        self.db.delete(&mut wtxn, id.as_bytes()).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(live)
    }

    async fn inc(&self, id: &str, step: i64) -> CacheResult<Option<i64>> {
        let now = Utc::now().timestamp_millis();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let record = match self.db.get(&wtxn, id.as_bytes()).map_err(txn_err)? {
            Some(bytes) => Record::decode(id, bytes)?,
            None => return Ok(None),
        };
        let record = match record {
            Some(record) if !record.is_expired(now) => record,
            _ => {
                self.db.delete(&mut wtxn, id.as_bytes()).map_err(txn_err)?;
                wtxn.commit().map_err(txn_err)?;
                return Ok(None);
            }
        };

        let (next, stored) = apply_step(id, &record.value, step)?;
        let bytes = Record::encode(&stored, record.expires_at_millis)?;
        self.db
            .put(&mut wtxn, id.as_bytes(), &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(Some(next))
    }

    async fn flush(&self) -> CacheResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.db.clear(&mut wtxn).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;
    use zext_core::ValidationError;

    fn create_test_backend() -> (LmdbBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend = LmdbBackend::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    fn put_raw(backend: &LmdbBackend, id: &str, bytes: &[u8]) {
        let mut wtxn = backend.env.write_txn().unwrap();
        backend.db.put(&mut wtxn, id.as_bytes(), bytes).unwrap();
        wtxn.commit().unwrap();
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (backend, _temp_dir) = create_test_backend();

        backend
            .set("post:1", json!({"title": "Hello", "tags": ["a", "b"]}), Lifetime::Forever)
            .await
            .expect("set should succeed");

        let cached = backend.get("post:1").await.expect("get should succeed");
        assert_eq!(cached, Some(json!({"title": "Hello", "tags": ["a", "b"]})));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (backend, _temp_dir) = create_test_backend();
        assert!(backend.get("nope").await.unwrap().is_none());
        assert!(!backend.has("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (backend, _temp_dir) = create_test_backend();
        backend.set("k", json!("v1"), Lifetime::Forever).await.unwrap();
        backend.set("k", json!("v2"), Lifetime::Forever).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(json!("v2")));
        assert_eq!(backend.record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_missing_and_deleted() {
        let (backend, _temp_dir) = create_test_backend();
        let past = Utc::now().timestamp_millis() - 1_000;
        put_raw(&backend, "old", &Record::encode(&json!(1), past).unwrap());

        assert!(backend.get("old").await.unwrap().is_none());
        assert_eq!(backend.record_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (backend, _temp_dir) = create_test_backend();
        let past = Utc::now().timestamp_millis() - 1_000;
        put_raw(&backend, "a", &Record::encode(&json!(1), past).unwrap());
        put_raw(&backend, "b", &Record::encode(&json!(2), past).unwrap());
        backend.set("c", json!(3), Lifetime::Seconds(600)).await.unwrap();

        assert_eq!(backend.purge_expired().unwrap(), 2);
        assert_eq!(backend.record_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_truncated_record_is_missing() {
        let (backend, _temp_dir) = create_test_backend();
        put_raw(&backend, "short", &[1, 2, 3]);
        assert!(backend.get("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_record_reports_key() {
        let (backend, _temp_dir) = create_test_backend();
        let mut bytes = 0i64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{not json");
        put_raw(&backend, "bad", &bytes);

        let err = backend.get("bad").await.unwrap_err();
        assert!(matches!(
            err,
            CacheError::Serialization(SerializationError::Decode { ref key, .. }) if key == "bad"
        ));
    }

    #[tokio::test]
    async fn test_set_many_and_get_many() {
        let (backend, _temp_dir) = create_test_backend();
        backend
            .set_many(
                vec![("a".to_string(), json!(1)), ("b".to_string(), json!([2]))],
                Lifetime::Seconds(60),
            )
            .await
            .unwrap();

        let found = backend
            .get_many(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["b"], json!([2]));
    }

    #[tokio::test]
    async fn test_set_many_rejects_empty_key_atomically() {
        let (backend, _temp_dir) = create_test_backend();
        let err = backend
            .set_many(
                vec![("a".to_string(), json!(1)), (String::new(), json!(2))],
                Lifetime::Forever,
            )
            .await
            .unwrap_err();
        assert_eq!(err, CacheError::Validation(ValidationError::EmptyKey));
        assert!(backend.get("a").await.unwrap().is_none(), "aborted txn writes nothing");
    }

    #[tokio::test]
    async fn test_remove() {
        let (backend, _temp_dir) = create_test_backend();
        backend.set("a", json!(1), Lifetime::Forever).await.unwrap();
        assert!(backend.remove("a").await.unwrap());
        assert!(!backend.remove("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_inc_dec() {
        let (backend, _temp_dir) = create_test_backend();
        backend.set("n", json!(5), Lifetime::Seconds(600)).await.unwrap();
        assert_eq!(backend.inc("n", 2).await.unwrap(), Some(7));
        assert_eq!(backend.dec("n", 10).await.unwrap(), Some(-3));
        assert_eq!(backend.inc("missing", 1).await.unwrap(), None);
        assert!(backend.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inc_preserves_expiry() {
        let (backend, _temp_dir) = create_test_backend();
        let future = Utc::now().timestamp_millis() + 60_000;
        put_raw(&backend, "n", &Record::encode(&json!(1), future).unwrap());

        backend.inc("n", 1).await.unwrap();

        let rtxn = backend.env.read_txn().unwrap();
        let bytes = backend.db.get(&rtxn, b"n".as_slice()).unwrap().unwrap();
        let record = Record::decode("n", bytes).unwrap().unwrap();
        assert_eq!(record.expires_at_millis, future);
        assert_eq!(record.value, json!(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inc() {
        let (backend, _temp_dir) = create_test_backend();
        let backend = Arc::new(backend);
        backend.set("counter", json!(0), Lifetime::Forever).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    backend.inc("counter", 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(backend.get("counter").await.unwrap(), Some(json!(200)));
    }

    #[tokio::test]
    async fn test_flush() {
        let (backend, _temp_dir) = create_test_backend();
        for i in 0..5 {
            backend
                .set(&format!("k{}", i), json!(i), Lifetime::Forever)
                .await
                .unwrap();
        }
        backend.flush().await.unwrap();
        assert_eq!(backend.record_count().unwrap(), 0);
    }
}
