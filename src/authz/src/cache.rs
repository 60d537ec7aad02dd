//! Two-tier cache (C7): Redis as the remote tier, an in-process `moka` cache
//! as the local fallback, with a [`BitRing`](crate::bitring::BitRing)
//! deciding when sustained Redis failure should trigger fail-over.
//!
//! Mirrors the source oracle's `MultiCacheV2` (§4.7, §9): `Set`/`Get` always
//! go to whichever tier is currently marked available; write errors (and
//! read errors other than "key not found") feed the crash detector; once it
//! trips, a CAS-guarded transition flips to the local tier, immediately
//! backfills it from `data_loader`, and starts a refresh loop. A background
//! health-check loop pings Redis on an interval and, once it recovers,
//! performs the CAS-guarded reverse transition.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use authz_database::RedisConnection;
use moka::future::Cache as LocalCache;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::bitring::BitRing;

/// One entry a data loader hands back when backfilling a tier after
/// fail-over/recovery: a namespaced key, its JSON-serialized value, and the
/// TTL it should be stored with.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
}

/// Reloads every entry the cache should hold, used to backfill whichever
/// tier just became active. Implemented by the permission reloader (C8).
#[async_trait::async_trait]
pub trait DataLoader: Send + Sync {
    async fn load(&self) -> Vec<CacheEntry>;
}

struct Inner {
    remote: Arc<RedisConnection>,
    local: LocalCache<String, String>,
    remote_available: AtomicBool,
    crash_detector: BitRing,
    transition_lock: Mutex<()>,
    ping_timeout: Duration,
    health_check_period: Duration,
    local_refresh_period: Duration,
    namespace: String,
    data_loader: Arc<dyn DataLoader>,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the two-tier cache. Cheaply cloneable; the background loops
/// hold their own `Arc<Inner>`.
#[derive(Clone)]
pub struct MultiLevelCache {
    inner: Arc<Inner>,
}

impl MultiLevelCache {
    pub fn new(
        remote: Arc<RedisConnection>,
        namespace: impl Into<String>,
        local_capacity: u64,
        local_refresh_period: Duration,
        ping_timeout: Duration,
        health_check_period: Duration,
        crash_detector: BitRing,
        data_loader: Arc<dyn DataLoader>,
    ) -> Self {
        let inner = Arc::new(Inner {
            remote,
            local: LocalCache::builder().max_capacity(local_capacity).build(),
            remote_available: AtomicBool::new(true),
            crash_detector,
            transition_lock: Mutex::new(()),
            ping_timeout,
            health_check_period,
            local_refresh_period,
            namespace: namespace.into(),
            data_loader,
            refresh_handle: Mutex::new(None),
        });

        let cache = Self { inner };
        cache.spawn_health_check();
        cache
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{}", self.inner.namespace, key)
    }

    #[instrument(skip(self, value), fields(key))]
    pub async fn set<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let namespaced = self.namespaced(key);

        if !self.inner.remote_available.load(Ordering::SeqCst) {
            return self.set_local(&namespaced, value, ttl).await;
        }

        match self.inner.remote.set(&namespaced, value, ttl).await {
            Ok(()) => {
                self.inner.crash_detector.add(false);
                true
            }
            Err(err) => {
                warn!(%err, "remote cache set failed");
                self.inner.crash_detector.add(true);
                if self.inner.crash_detector.is_condition_met() {
                    self.handle_crash().await;
                }
                false
            }
        }
    }

    async fn set_local<T: Serialize>(&self, namespaced_key: &str, value: &T, ttl: Duration) -> bool {
        match serde_json::to_string(value) {
            Ok(serialized) => {
                self.inner.local.insert(namespaced_key.to_string(), serialized).await;
                true
            }
            Err(err) => {
                error!(%err, "failed to serialize value for local cache");
                false
            }
        }
    }

    #[instrument(skip(self), fields(key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let namespaced = self.namespaced(key);

        if !self.inner.remote_available.load(Ordering::SeqCst) {
            return self.get_local(&namespaced).await;
        }

        match self.inner.remote.get::<T>(&namespaced).await {
            Ok(value) => {
                self.inner.crash_detector.add(false);
                value
            }
            Err(err) => {
                warn!(%err, "remote cache get failed");
                self.inner.crash_detector.add(true);
                if self.inner.crash_detector.is_condition_met() {
                    self.handle_crash().await;
                }
                None
            }
        }
    }

    async fn get_local<T: DeserializeOwned>(&self, namespaced_key: &str) -> Option<T> {
        let raw = self.inner.local.get(namespaced_key).await?;
        serde_json::from_str(&raw).ok()
    }

    pub fn is_remote_available(&self) -> bool {
        self.inner.remote_available.load(Ordering::SeqCst)
    }

    /// CAS-guarded transition to the local tier: marks Redis unavailable,
    /// backfills the local cache from `data_loader`, and starts the
    /// periodic refresh loop. A concurrent caller that loses the race on
    /// `transition_lock` finds `remote_available` already false and returns.
    async fn handle_crash(&self) {
        let _guard = self.inner.transition_lock.lock().await;
        if !self.inner.remote_available.swap(false, Ordering::SeqCst) {
            // Was already false; another caller already handled the crash.
            return;
        }

        warn!("remote cache marked unavailable, failing over to local tier");
        self.reload_into_local().await;
        self.spawn_refresh_loop().await;
    }

    /// CAS-guarded reverse transition: marks Redis available again, cancels
    /// the refresh loop, resets the crash detector, and backfills Redis from
    /// `data_loader`.
    async fn handle_recovery(&self) {
        let _guard = self.inner.transition_lock.lock().await;
        if self.inner.remote_available.load(Ordering::SeqCst) {
            return;
        }
        self.inner.remote_available.store(true, Ordering::SeqCst);

        if let Some(handle) = self.inner.refresh_handle.lock().await.take() {
            handle.abort();
        }
        self.inner.crash_detector.reset();

        info!("remote cache recovered, reloading from source of truth");
        self.reload_into_remote().await;
    }

    async fn reload_into_local(&self) {
        for entry in self.inner.data_loader.load().await {
            self.inner.local.insert(entry.key, entry.value).await;
        }
    }

    async fn reload_into_remote(&self) {
        for entry in self.inner.data_loader.load().await {
            if let Err(err) = self.inner.remote.set(&entry.key, &entry.value, entry.ttl).await {
                error!(%err, key = %entry.key, "failed to reload entry into remote cache");
            }
        }
    }

    async fn spawn_refresh_loop(&self) {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.inner.local_refresh_period);
            ticker.tick().await; // first tick fires immediately; skip it, we just backfilled
            loop {
                ticker.tick().await;
                if cache.inner.remote_available.load(Ordering::SeqCst) {
                    return;
                }
                cache.reload_into_local().await;
            }
        });

        *self.inner.refresh_handle.lock().await = Some(handle);
    }

    fn spawn_health_check(&self) {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.inner.health_check_period);
            loop {
                ticker.tick().await;
                if cache.inner.remote_available.load(Ordering::SeqCst) {
                    continue;
                }
                if cache.inner.remote.ping(cache.inner.ping_timeout).await.is_ok() {
                    cache.handle_recovery().await;
                }
            }
        });
    }
}

/// A `DataLoader` that always returns an empty set, for callers that have
/// nothing to backfill (e.g. caches with no cold-start reload story yet).
pub struct NoopDataLoader;

#[async_trait::async_trait]
impl DataLoader for NoopDataLoader {
    async fn load(&self) -> Vec<CacheEntry> {
        Vec::new()
    }
}

/// A `DataLoader` built from an async closure, for callers that can express
/// their reload logic inline rather than as a dedicated type.
pub struct FnDataLoader<F> {
    f: F,
}

impl<F> FnDataLoader<F>
where
    F: Fn() -> Pin<Box<dyn Future<Output = Vec<CacheEntry>> + Send>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait::async_trait]
impl<F> DataLoader for FnDataLoader<F>
where
    F: Fn() -> Pin<Box<dyn Future<Output = Vec<CacheEntry>> + Send>> + Send + Sync,
{
    async fn load(&self) -> Vec<CacheEntry> {
        (self.f)().await
    }
}
