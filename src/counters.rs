//! The advisory counter store: `candidate_votes` hash, the `voting_results`
//! cache, and the fixed-window rate-limit counters (§6, Counter store).
//!
//! Mirrors the dual in-memory/durable backend split the rest of the
//! pipeline uses for storage: [`InMemoryCounterStore`] backs unit tests,
//! [`RedisCounterStore`] is what both binaries run against in production.
//! Both implement the same [`CounterStore`] trait so request handlers
//! never know which one they're holding.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::ResultsResponse;

pub const RESULTS_CACHE_KEY: &str = "voting_results";
pub const CANDIDATE_VOTES_KEY: &str = "candidate_votes";

#[derive(thiserror::Error, Debug)]
pub enum CounterError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to (de)serialize cached payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of a fixed-window increment: the post-increment count and the
/// window's remaining TTL in seconds (-1 if the key has no expiry yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: i64,
    pub ttl_seconds: i64,
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn increment_candidate_votes(&self, candidate_id: Uuid) -> Result<(), CounterError>;

    /// Unconditionally overwrite one field of the counter hash; used only
    /// by the reconciliation job (§4.8) to repair drift.
    async fn set_candidate_votes(&self, candidate_id: Uuid, count: i64) -> Result<(), CounterError>;

    async fn get_candidate_votes(&self) -> Result<HashMap<Uuid, i64>, CounterError>;

    async fn get_results_cache(&self) -> Result<Option<ResultsResponse>, CounterError>;

    async fn set_results_cache(
        &self,
        results: &ResultsResponse,
        ttl: Duration,
    ) -> Result<(), CounterError>;

    async fn invalidate_results_cache(&self) -> Result<(), CounterError>;

    /// Atomically increment `rate_limit:{key}` and, on first touch, set
    /// its TTL to `window` in the same round trip (§4.2).
    async fn increment_rate_limit_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, CounterError>;
}

/// In-memory stand-in for tests and local development, paralleling the
/// relationship between the real counter store and an always-available
/// fake — losing this data on restart is acceptable because the design
/// treats the counter store as advisory (I4).
#[derive(Default)]
pub struct InMemoryCounterStore {
    votes: RwLock<HashMap<Uuid, i64>>,
    results_cache: RwLock<Option<ResultsResponse>>,
    rate_limits: RwLock<HashMap<String, (i64, std::time::Instant)>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_candidate_votes(&self, candidate_id: Uuid) -> Result<(), CounterError> {
        *self.votes.write().await.entry(candidate_id).or_insert(0) += 1;
        Ok(())
    }

    async fn set_candidate_votes(&self, candidate_id: Uuid, count: i64) -> Result<(), CounterError> {
        self.votes.write().await.insert(candidate_id, count);
        Ok(())
    }

    async fn get_candidate_votes(&self) -> Result<HashMap<Uuid, i64>, CounterError> {
        Ok(self.votes.read().await.clone())
    }

    async fn get_results_cache(&self) -> Result<Option<ResultsResponse>, CounterError> {
        Ok(self.results_cache.read().await.clone())
    }

    async fn set_results_cache(
        &self,
        results: &ResultsResponse,
        _ttl: Duration,
    ) -> Result<(), CounterError> {
        *self.results_cache.write().await = Some(results.clone());
        Ok(())
    }

    async fn invalidate_results_cache(&self) -> Result<(), CounterError> {
        *self.results_cache.write().await = None;
        Ok(())
    }

    async fn increment_rate_limit_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, CounterError> {
        let mut limits = self.rate_limits.write().await;
        let now = std::time::Instant::now();
        let entry = limits.entry(key.to_string()).or_insert((0, now + window));

        if now >= entry.1 {
            entry.0 = 0;
            entry.1 = now + window;
        }
        entry.0 += 1;

        let ttl_seconds = entry.1.saturating_duration_since(now).as_secs() as i64;
        Ok(WindowCount {
            count: entry.0,
            ttl_seconds,
        })
    }
}

pub struct RedisCounterStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisCounterStore {
    pub async fn connect(redis_url: &str) -> Result<Self, CounterError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_candidate_votes(&self, candidate_id: Uuid) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        redis::cmd("HINCRBY")
            .arg(CANDIDATE_VOTES_KEY)
            .arg(candidate_id.to_string())
            .arg(1)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_candidate_votes(&self, candidate_id: Uuid, count: i64) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(CANDIDATE_VOTES_KEY)
            .arg(candidate_id.to_string())
            .arg(count)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_candidate_votes(&self) -> Result<HashMap<Uuid, i64>, CounterError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, i64> = redis::cmd("HGETALL")
            .arg(CANDIDATE_VOTES_KEY)
            .query_async(&mut conn)
            .await?;

        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| Uuid::parse_str(&k).ok().map(|id| (id, v)))
            .collect())
    }

    async fn get_results_cache(&self) -> Result<Option<ResultsResponse>, CounterError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(RESULTS_CACHE_KEY)
            .query_async(&mut conn)
            .await?;

        let Some(raw) = raw else { return Ok(None) };

        match serde_json::from_str::<ResultsResponse>(&raw) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                tracing::warn!(error = %e, "corrupt results cache payload; invalidating");
                self.invalidate_results_cache().await?;
                Ok(None)
            }
        }
    }

    async fn set_results_cache(
        &self,
        results: &ResultsResponse,
        ttl: Duration,
    ) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(results)?;
        redis::cmd("SETEX")
            .arg(RESULTS_CACHE_KEY)
            .arg(ttl.as_secs().max(1))
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn invalidate_results_cache(&self) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(RESULTS_CACHE_KEY)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn increment_rate_limit_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, CounterError> {
        let mut conn = self.conn.clone();
        let redis_key = format!("rate_limit:{key}");

        let count: i64 = redis::cmd("INCR").arg(&redis_key).query_async(&mut conn).await?;
        let mut ttl_seconds: i64 = redis::cmd("TTL").arg(&redis_key).query_async(&mut conn).await?;

        if ttl_seconds == -1 {
            redis::cmd("EXPIRE")
                .arg(&redis_key)
                .arg(window.as_secs().max(1))
                .query_async::<_, ()>(&mut conn)
                .await?;
            ttl_seconds = window.as_secs() as i64;
        }

        Ok(WindowCount {
            count,
            ttl_seconds,
        })
    }
}

pub type SharedCounterStore = Arc<dyn CounterStore>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increment_and_read_candidate_votes() {
        let store = InMemoryCounterStore::new();
        let candidate = Uuid::new_v4();

        store.increment_candidate_votes(candidate).await.unwrap();
        store.increment_candidate_votes(candidate).await.unwrap();

        let votes = store.get_candidate_votes().await.unwrap();
        assert_eq!(votes.get(&candidate), Some(&2));
    }

    #[tokio::test]
    async fn results_cache_round_trips() {
        let store = InMemoryCounterStore::new();
        assert!(store.get_results_cache().await.unwrap().is_none());

        let results = ResultsResponse {
            results: vec![],
            last_updated: chrono::Utc::now(),
        };
        store
            .set_results_cache(&results, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.get_results_cache().await.unwrap().is_some());

        store.invalidate_results_cache().await.unwrap();
        assert!(store.get_results_cache().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rate_limit_window_resets_after_expiry() {
        let store = InMemoryCounterStore::new();
        let window = Duration::from_millis(20);

        let first = store.increment_rate_limit_window("u1", window).await.unwrap();
        assert_eq!(first.count, 1);
        let second = store.increment_rate_limit_window("u1", window).await.unwrap();
        assert_eq!(second.count, 2);

        tokio::time::sleep(Duration::from_millis(25)).await;
        let third = store.increment_rate_limit_window("u1", window).await.unwrap();
        assert_eq!(third.count, 1);
    }
}
