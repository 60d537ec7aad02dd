//! Combined Postgres + Redis health reporting, independent of the
//! crash-detector state machine the cache tier runs internally (that one
//! lives in `authz-core::cache` and reacts to these signals at runtime;
//! this module is for operational visibility only).

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::connections::RedisConnection;
use crate::DatabaseError;

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseHealth {
    pub overall_healthy: bool,
    pub postgres: PostgresHealth,
    pub redis: RedisHealth,
    pub last_check: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostgresHealth {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub pool_size: u32,
    pub idle_connections: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedisHealth {
    pub healthy: bool,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
}

pub struct HealthChecker {
    postgres_pool: Arc<PgPool>,
    redis: Arc<RedisConnection>,
    ping_timeout: Duration,
}

impl HealthChecker {
    pub fn new(postgres_pool: Arc<PgPool>, redis: Arc<RedisConnection>, ping_timeout: Duration) -> Self {
        Self {
            postgres_pool,
            redis,
            ping_timeout,
        }
    }

    pub async fn check_health(&self) -> Result<DatabaseHealth, DatabaseError> {
        let postgres = self.check_postgres().await;
        let redis = self.check_redis().await;
        let overall_healthy = postgres.healthy && redis.healthy;

        if !overall_healthy {
            warn!(?postgres, ?redis, "database health check detected issues");
        } else {
            debug!("database health check: all systems healthy");
        }

        Ok(DatabaseHealth {
            overall_healthy,
            postgres,
            redis,
            last_check: chrono::Utc::now(),
        })
    }

    async fn check_postgres(&self) -> PostgresHealth {
        let start = Instant::now();
        let result = sqlx::query("SELECT 1").fetch_one(&*self.postgres_pool).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        PostgresHealth {
            healthy: result.is_ok(),
            response_time_ms,
            pool_size: self.postgres_pool.size(),
            idle_connections: self.postgres_pool.num_idle(),
            error_message: result.err().map(|e| e.to_string()),
        }
    }

    async fn check_redis(&self) -> RedisHealth {
        let start = Instant::now();
        let result = self.redis.ping(self.ping_timeout).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        RedisHealth {
            healthy: result.is_ok(),
            response_time_ms,
            error_message: result.err().map(|e| e.to_string()),
        }
    }
}
