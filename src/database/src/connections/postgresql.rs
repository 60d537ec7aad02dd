//! Postgres connection pool wrapper.

use std::sync::Arc;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use super::PostgresConfig;
use crate::DatabaseError;

/// Owns a `sqlx::PgPool` plus the config it was built from, so pool stats
/// can be reported against the configured ceiling.
pub struct PostgresConnection {
    pool: Arc<PgPool>,
    config: PostgresConfig,
}

impl PostgresConnection {
    pub async fn new(config: PostgresConfig) -> Result<Self, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .connect(&config.url)
            .await?;

        let mut conn = pool.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;

        info!("postgres connection pool created");

        Ok(Self {
            pool: Arc::new(pool),
            config,
        })
    }

    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    pub async fn health_check(&self) -> Result<bool, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(true)
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_size: self.config.max_connections,
        }
    }

    pub async fn close(&self) {
        info!("closing postgres connection pool");
        self.pool.close().await;
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
}
