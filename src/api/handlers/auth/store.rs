//! Credential store contract and its Redis / in-memory implementations.
//!
//! The session layer only needs a TTL'd key-value store with a set
//! primitive. Redis is the production backend; [`MemoryStore`] backs tests
//! and local development without a Redis instance. Both are driven through
//! an injected [`Clock`] so expiry behavior is testable with simulated time.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info_span, Instrument};

/// Failures surfaced by the credential store.
///
/// `Unavailable` maps to an internal error at the HTTP boundary; it is never
/// shown to the client in detail.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store unavailable: {0}")]
    Unavailable(String),
    #[error("malformed record in credential store: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Wall-clock abstraction in unix seconds.
///
/// Session expiry math runs on second resolution; injecting the clock lets
/// tests advance time without sleeping.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Production clock backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }
}

/// Generic TTL-keyed store with a set-collection primitive.
///
/// Any key-value store with native per-key expiry satisfies this contract;
/// atomicity is only assumed per individual operation.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Write `value` under `key` with a TTL in seconds.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: i64)
        -> Result<(), StoreError>;

    /// Read the value under `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Delete a single key. Deleting a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete several keys at once.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Add `member` to the set at `key` and refresh the set's TTL.
    async fn set_add(&self, key: &str, member: &str, ttl_seconds: i64) -> Result<(), StoreError>;

    /// Remove `member` from the set at `key`.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Enumerate the members of the set at `key`; empty when absent.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Connectivity check for health reporting.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis-backed credential store sharing one multiplexed connection
/// manager across all requests.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and build the shared connection manager.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the initial connection
    /// cannot be established.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(StoreError::from)?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(StoreError::from)?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl CredentialStore for RedisStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let ttl = u64::try_from(ttl_seconds.max(1)).unwrap_or(1);
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "SETEX");
        async {
            let _: () = conn.set_ex(key, value, ttl).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "GET");
        async {
            let value: Option<String> = conn.get(key).await?;
            Ok(value)
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "DEL");
        async {
            let _: () = conn.del(key).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "DEL");
        async {
            let _: () = conn.del(keys).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn set_add(&self, key: &str, member: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        let ttl = ttl_seconds.max(1);
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "SADD");
        async {
            let _: () = conn.sadd(key, member).await?;
            let _: bool = conn.expire(key, ttl).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "SREM");
        async {
            let _: () = conn.srem(key, member).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "SMEMBERS");
        async {
            let members: Vec<String> = conn.smembers(key).await?;
            Ok(members)
        }
        .instrument(span)
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let span = info_span!("redis.command", redis.operation = "PING");
        async {
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        }
        .instrument(span)
        .await
    }
}

struct ValueEntry {
    value: String,
    expires_at: i64,
}

struct SetEntry {
    members: HashSet<String>,
    expires_at: i64,
}

/// In-memory credential store honoring TTLs against the injected clock.
///
/// Used by tests and available for development runs without Redis.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    values: Mutex<HashMap<String, ValueEntry>>,
    sets: Mutex<HashMap<String, SetEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            values: Mutex::new(HashMap::new()),
            sets: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), StoreError> {
        let expires_at = self.clock.now_unix() + ttl_seconds.max(1);
        let mut values = self.values.lock().await;
        values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_unix();
        let mut values = self.values.lock().await;
        match values.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value.clone())),
            Some(_) => {
                values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().await.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut values = self.values.lock().await;
        for key in keys {
            values.remove(key);
        }
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str, ttl_seconds: i64) -> Result<(), StoreError> {
        let now = self.clock.now_unix();
        let expires_at = now + ttl_seconds.max(1);
        let mut sets = self.sets.lock().await;
        let entry = sets.entry(key.to_string()).or_insert_with(|| SetEntry {
            members: HashSet::new(),
            expires_at,
        });
        if entry.expires_at <= now {
            entry.members.clear();
        }
        entry.members.insert(member.to_string());
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut sets = self.sets.lock().await;
        if let Some(entry) = sets.get_mut(key) {
            entry.members.remove(member);
            if entry.members.is_empty() {
                sets.remove(key);
            }
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now_unix();
        let mut sets = self.sets.lock().await;
        match sets.get(key) {
            Some(entry) if entry.expires_at > now => Ok(entry.members.iter().cloned().collect()),
            Some(_) => {
                sets.remove(key);
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) struct ManualClock(std::sync::atomic::AtomicI64);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: i64) -> Self {
        Self(std::sync::atomic::AtomicI64::new(start))
    }

    pub(crate) fn advance(&self, seconds: i64) {
        self.0.fetch_add(seconds, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_unix(&self) -> i64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, CredentialStore, ManualClock, MemoryStore, SystemClock};
    use std::sync::Arc;

    #[test]
    fn system_clock_reports_recent_time() {
        // 2020-01-01 as a floor; anything earlier means a broken clock.
        assert!(SystemClock.now_unix() > 1_577_836_800);
    }

    #[tokio::test]
    async fn memory_store_expires_values() -> Result<(), super::StoreError> {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::new(clock.clone());

        store.set_with_ttl("k", "v", 60).await?;
        assert_eq!(store.get("k").await?, Some("v".to_string()));

        clock.advance(61);
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_set_operations() -> Result<(), super::StoreError> {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = MemoryStore::new(clock.clone());

        store.set_add("s", "a", 60).await?;
        store.set_add("s", "b", 60).await?;
        let mut members = store.set_members("s").await?;
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);

        store.set_remove("s", "a").await?;
        assert_eq!(store.set_members("s").await?, vec!["b".to_string()]);

        clock.advance(61);
        assert!(store.set_members("s").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn memory_store_delete_many() -> Result<(), super::StoreError> {
        let clock = Arc::new(ManualClock::new(0));
        let store = MemoryStore::new(clock);
        store.set_with_ttl("a", "1", 60).await?;
        store.set_with_ttl("b", "2", 60).await?;
        store
            .delete_many(&["a".to_string(), "b".to_string()])
            .await?;
        assert_eq!(store.get("a").await?, None);
        assert_eq!(store.get("b").await?, None);
        Ok(())
    }
}
