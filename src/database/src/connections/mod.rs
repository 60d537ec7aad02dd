//! Connection pooling and configuration for the two backends this crate
//! speaks to: Postgres (relational store) and Redis (remote cache tier).

pub mod postgresql;
pub mod redis;

use serde::{Deserialize, Serialize};

pub use postgresql::{PoolStats, PostgresConnection};
pub use redis::{RedisConnection, RedisStats};

/// Postgres connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/authz".to_string(),
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: 600,
            max_lifetime_seconds: 1800,
        }
    }
}

/// Redis client settings for the remote cache tier (C7).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout_seconds: u64,
    pub response_timeout_seconds: u64,
    pub default_ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connection_timeout_seconds: 5,
            response_timeout_seconds: 2,
            default_ttl_seconds: 3_153_600_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_config_default_is_sane() {
        let config = PostgresConfig::default();
        assert!(config.max_connections >= config.min_connections);
    }

    #[test]
    fn redis_config_default_is_sane() {
        let config = RedisConfig::default();
        assert!(config.response_timeout_seconds < config.connection_timeout_seconds * 10);
    }
}
