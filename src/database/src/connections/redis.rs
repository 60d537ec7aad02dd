//! Redis client wrapper used as the remote tier of the two-level cache
//! (C7). Exposes a small, generic get/set/delete/ping surface — everything
//! C7 in `authz-core` needs and nothing it doesn't.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::RedisConfig;
use crate::DatabaseError;

/// Running counters, surfaced by the health checker; not itself part of the
/// crash-detector state machine (that lives in `authz-core::cache`).
#[derive(Debug, Clone, Default)]
pub struct RedisStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_sets: u64,
    pub cache_deletes: u64,
    pub last_error: Option<String>,
}

pub struct RedisConnection {
    connection_manager: ConnectionManager,
    config: RedisConfig,
    stats: Arc<RwLock<RedisStats>>,
}

impl RedisConnection {
    pub async fn new(config: RedisConfig) -> Result<Self, DatabaseError> {
        let client = redis::Client::open(config.url.clone())
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        let connection_manager = ConnectionManager::new(client).await?;

        Ok(Self {
            connection_manager,
            config,
            stats: Arc::new(RwLock::new(RedisStats::default())),
        })
    }

    /// Serialize `value` as JSON and write it with the given TTL. Callers
    /// that have no natural TTL pass `config.default_ttl_seconds`.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), DatabaseError>
    where
        T: Serialize,
    {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.connection_manager.clone();
        conn.set_ex::<_, _, ()>(key, serialized, ttl.as_secs().max(1))
            .await?;

        self.stats.write().await.cache_sets += 1;
        debug!(key, "redis set");
        Ok(())
    }

    /// Returns `Ok(None)` for a missing key — the distinguishable
    /// "key not found" sentinel §6 requires, as distinct from an error.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, DatabaseError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = conn.get(key).await?;

        match raw {
            Some(raw) => {
                self.stats.write().await.cache_hits += 1;
                let value = serde_json::from_str(&raw)?;
                debug!(key, "redis hit");
                Ok(Some(value))
            }
            None => {
                self.stats.write().await.cache_misses += 1;
                debug!(key, "redis miss");
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), DatabaseError> {
        let mut conn = self.connection_manager.clone();
        conn.del::<_, ()>(key).await?;
        self.stats.write().await.cache_deletes += 1;
        debug!(key, "redis delete");
        Ok(())
    }

    /// Liveness probe for the health-check loop (§4.7): a `PING` bounded by
    /// `timeout`. Times out -> treated as unreachable, not a protocol error.
    pub async fn ping(&self, timeout: Duration) -> Result<(), DatabaseError> {
        let mut conn = self.connection_manager.clone();
        let fut = redis::cmd("PING").query_async::<_, String>(&mut conn);

        match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DatabaseError::from(e)),
            Err(_) => Err(DatabaseError::Connection("redis ping timed out".to_string())),
        }
    }

    pub async fn stats(&self) -> RedisStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }
}
