//! Authorization engine configuration.
//!
//! Layered configuration (defaults → file → environment) for every tunable the
//! engine exposes: the bit-ring health detector, the multi-level cache's
//! timing knobs, the cache key namespace, and the one resolved open question
//! from the design notes (what the ABAC gate does when zero policies cover a
//! permission).

use crate::errors::{AuthzError, AuthzResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration for the authorization engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzConfig {
    pub bit_ring: BitRingConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

/// Parameters for the bit-ring crash/health detector (C1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BitRingConfig {
    /// Window size `W`. Clamped to `>= 1` (default 128 when `<= 0` is supplied).
    pub window_size: usize,
    /// Consecutive-failure trigger `k`. Clamped to `1..=window_size` (default 3).
    pub consecutive_threshold: usize,
    /// Rate trigger `theta`. Clamped to `[0, 1]`.
    pub rate_threshold: f64,
}

impl Default for BitRingConfig {
    fn default() -> Self {
        Self {
            window_size: 128,
            consecutive_threshold: 3,
            rate_threshold: 0.5,
        }
    }
}

/// What the hybrid pipeline's ABAC gate does when no policy covers the
/// candidate permissions. See the design notes for the rationale; this is
/// intentionally operator-tunable rather than hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbacZeroPoliciesPolicy {
    /// No applicable policy denies the request (the conservative default).
    Deny,
    /// No applicable policy means ABAC has no opinion; the RBAC verdict stands.
    RbacStands,
}

impl Default for AbacZeroPoliciesPolicy {
    fn default() -> Self {
        AbacZeroPoliciesPolicy::Deny
    }
}

/// Timing and topology configuration for the multi-level cache (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Namespace prefix applied to every cache key, isolating co-tenant keys.
    pub namespace: String,
    /// Interval between background local-cache refreshes while the remote
    /// tier is unavailable.
    #[serde(with = "duration_secs")]
    pub refresh_period: Duration,
    /// Bound on the remote-store liveness probe issued by the health-check loop.
    #[serde(with = "duration_secs")]
    pub ping_timeout: Duration,
    /// Interval between health-check attempts while the remote tier is down.
    #[serde(with = "duration_secs")]
    pub health_check_period: Duration,
    /// TTL applied to entries written into either cache tier.
    #[serde(with = "duration_secs")]
    pub entry_ttl: Duration,
    /// What the ABAC gate does with zero applicable policies.
    pub abac_zero_policies: AbacZeroPoliciesPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "authz".to_string(),
            refresh_period: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(2),
            health_check_period: Duration::from_secs(5),
            entry_ttl: Duration::from_secs(3_153_600_000), // ~100 years, matching UserPermission's synthesized grants
            abac_zero_policies: AbacZeroPoliciesPolicy::Deny,
        }
    }
}

/// Storage backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub postgres_url: String,
    pub redis_url: String,
    pub max_connections: u32,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost/authz".to_string(),
            redis_url: "redis://localhost:6379/0".to_string(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            bit_ring: BitRingConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl AuthzConfig {
    /// Load configuration from a file overlaid with `AUTHZ_`-prefixed
    /// environment variables (e.g. `AUTHZ_STORAGE__POSTGRES_URL`).
    pub fn load(path: Option<&str>) -> AuthzResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("AUTHZ")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> AuthzResult<()> {
        if self.bit_ring.window_size == 0 {
            return Err(AuthzError::Validation(
                "bit_ring.window_size must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.bit_ring.rate_threshold) {
            return Err(AuthzError::Validation(
                "bit_ring.rate_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.cache.namespace.is_empty() {
            return Err(AuthzError::Validation(
                "cache.namespace must not be empty".to_string(),
            ));
        }
        if self.storage.postgres_url.is_empty() || self.storage.redis_url.is_empty() {
            return Err(AuthzError::Validation(
                "storage URLs must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
