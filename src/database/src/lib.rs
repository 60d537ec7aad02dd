//! Postgres-backed repository layer and Redis remote-cache backend for the
//! authorization engine.
//!
//! This crate owns all storage I/O: connection pooling, the typed DAO traits
//! for every entity in the data model, their `sqlx` implementations, and the
//! Redis client wrapper used as the remote tier of the two-level cache in
//! `authz-core`. Nothing here makes an authorization decision; it only reads
//! and writes rows.

pub mod connections;
pub mod health;
pub mod repositories;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use connections::{PostgresConfig, PostgresConnection, RedisConfig, RedisConnection};
pub use health::{DatabaseHealth, HealthChecker};
pub use repositories::*;

/// Errors surfaced by this crate. `authz-core` converts these into its own
/// `AuthzError` taxonomy at the boundary (see `authz_core::errors`).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Owns the Postgres pool and Redis connection used by the repository layer
/// and the remote-cache backend, acquired once at startup per §5.
#[derive(Clone)]
pub struct DatabaseManager {
    pub postgres: Arc<PgPool>,
    pub redis: Arc<RedisConnection>,
}

impl DatabaseManager {
    pub async fn new(
        postgres_config: PostgresConfig,
        redis_config: RedisConfig,
    ) -> Result<Self, DatabaseError> {
        tracing::info!("initializing database connections");

        let postgres = Self::init_postgres(&postgres_config).await?;
        let redis = Arc::new(RedisConnection::new(redis_config).await?);

        tracing::info!("database connections initialized");
        Ok(Self { postgres, redis })
    }

    async fn init_postgres(config: &PostgresConfig) -> Result<Arc<PgPool>, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(config.max_lifetime_seconds))
            .connect(&config.url)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        Ok(Arc::new(pool))
    }

    pub fn repositories(&self) -> RepositoryFactory {
        RepositoryFactory::new(self.postgres.clone())
    }

    pub async fn shutdown(&self) {
        tracing::info!("shutting down database connections");
        self.postgres.close().await;
    }
}
