//! Dedup cache client: tracks the lifecycle state of every discovered entity id.

use crate::errors::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Tri-valued lifecycle marker for an entity id. `Absent` is the implicit
/// default (no key in the store); the wire-level store only ever holds
/// `BATCHED` or `WRITTEN` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    Absent,
    Batched,
    Written,
}

const BATCHED: &str = "BATCHED";
const WRITTEN: &str = "WRITTEN";

impl CacheState {
    fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(BATCHED) => CacheState::Batched,
            Some(WRITTEN) => CacheState::Written,
            _ => CacheState::Absent,
        }
    }
}

/// Abstraction over the external key-value store backing the dedup cache.
/// All writes are serialized through a single lock at the call site so test
/// doubles can use non-concurrent backends.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
    async fn flushall(&self) -> Result<(), CacheError>;
}

/// Thin wrapper exposing the three-state dedup protocol on top of any
/// [`CacheStore`]. Holds a trait object so the orchestrator and dispatch
/// layer can be written against a single concrete type regardless of which
/// backend (Redis or the in-memory test double) is in use.
pub struct DedupCache {
    store: std::sync::Arc<dyn CacheStore>,
}

impl DedupCache {
    pub fn new(store: std::sync::Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Read the lifecycle state of `id`.
    pub async fn state(&self, id: &str) -> Result<CacheState, CacheError> {
        let value = self.store.get(id).await?;
        Ok(CacheState::from_value(value.as_deref()))
    }

    /// Mark `id` as `BATCHED`. I3: callers must only do this from `Absent`.
    pub async fn mark_batched(&self, id: &str) -> Result<(), CacheError> {
        self.store.set(id, BATCHED).await
    }

    /// Mark `id` (or any marker key: genre/album/playlist/category) as
    /// `WRITTEN`. I2/I3: monotonic, terminal state.
    pub async fn mark_written(&self, id: &str) -> Result<(), CacheError> {
        self.store.set(id, WRITTEN).await
    }

    /// Cheap existence check for marker keys that only ever reach `WRITTEN`
    /// (genres, album ids, playlist ids, category ids) — used to suppress
    /// re-enqueuing already-expanded discovery targets.
    pub async fn already_written(&self, key: &str) -> Result<bool, CacheError> {
        self.store.exists(key).await
    }

    pub async fn flushall(&self) -> Result<(), CacheError> {
        self.store.flushall().await
    }
}

/// Redis-backed production implementation, using an async multiplexed
/// connection so the single `Mutex` below only ever serializes command
/// issuance, not the underlying TCP round trip.
pub struct RedisCache {
    conn: Mutex<redis::aio::ConnectionManager>,
}

impl RedisCache {
    /// Connect to `redis://host:port/db`. Fails fast if the server is
    /// unreachable — the crawler cannot make progress without the cache.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(CacheError::from)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(CacheError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.lock().await;
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::from)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.lock().await;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::from)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.lock().await;
        let exists: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::from)?;
        Ok(exists != 0)
    }

    async fn flushall(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.lock().await;
        redis::cmd("FLUSHALL")
            .query_async(&mut *conn)
            .await
            .map_err(CacheError::from)
    }
}

/// In-memory test double, used throughout the crawler's unit and
/// integration tests in place of a live Redis server.
#[derive(Default)]
pub struct MemoryCache {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.inner.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.inner
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.inner.lock().await.contains_key(key))
    }

    async fn flushall(&self) -> Result<(), CacheError> {
        self.inner.lock().await.clear();
        Ok(())
    }
}
