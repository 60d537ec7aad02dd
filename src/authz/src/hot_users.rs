//! Hot-user loader (C10): keeps an atomically-swappable list of "hot" users
//! whose effective permissions are eagerly refreshed, e.g. right after the
//! remote cache recovers from an outage (§4.10).

use std::sync::Arc;

use arc_swap::ArcSwap;
use authz_shared::{EffectivePermission, UserKey};
use tracing::{instrument, warn};

use crate::permissions::PermissionAssembler;

/// Watches an external coordination store for updates to the hot-user list.
/// A polling-stub implementation is provided since a real coordination store
/// (etcd/consul) is out of this engine's scope (§6).
#[async_trait::async_trait]
pub trait HotUserWatcher: Send + Sync {
    /// Returns the current hot-user list, or `None` if it hasn't changed
    /// since the last poll (callers skip the swap in that case).
    async fn poll(&self) -> Option<Vec<UserKey>>;
}

/// A watcher that always reports "unchanged" — for deployments with no hot-
/// user coordination source configured.
pub struct NoopHotUserWatcher;

#[async_trait::async_trait]
impl HotUserWatcher for NoopHotUserWatcher {
    async fn poll(&self) -> Option<Vec<UserKey>> {
        None
    }
}

/// A watcher backed by the same key-value cache abstraction the two-level
/// cache uses, polling one fixed key and JSON-decoding its value (§6).
pub struct CacheBackedHotUserWatcher<F> {
    fetch: F,
    last_seen: parking_lot::Mutex<Option<String>>,
}

impl<F> CacheBackedHotUserWatcher<F>
where
    F: Fn() -> Option<String> + Send + Sync,
{
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            last_seen: parking_lot::Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl<F> HotUserWatcher for CacheBackedHotUserWatcher<F>
where
    F: Fn() -> Option<String> + Send + Sync,
{
    async fn poll(&self) -> Option<Vec<UserKey>> {
        let raw = (self.fetch)()?;

        {
            let mut last_seen = self.last_seen.lock();
            if last_seen.as_deref() == Some(raw.as_str()) {
                return None;
            }
            *last_seen = Some(raw.clone());
        }

        match serde_json::from_str(&raw) {
            Ok(users) => Some(users),
            Err(err) => {
                warn!(%err, "failed to decode hot-user list payload");
                None
            }
        }
    }
}

/// Holds the current hot-user list behind an atomic pointer swap, so readers
/// never block a concurrent update (§5).
pub struct HotUserList {
    current: ArcSwap<Vec<UserKey>>,
}

impl Default for HotUserList {
    fn default() -> Self {
        Self::new()
    }
}

impl HotUserList {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub fn replace(&self, users: Vec<UserKey>) {
        self.current.store(Arc::new(users));
    }

    pub fn snapshot(&self) -> Arc<Vec<UserKey>> {
        self.current.load_full()
    }

    /// Applies the watcher's latest view if it changed.
    #[instrument(skip(self, watcher))]
    pub async fn refresh_from(&self, watcher: &dyn HotUserWatcher) {
        if let Some(users) = watcher.poll().await {
            self.replace(users);
        }
    }
}

/// Eagerly reloads every hot user's effective permissions, e.g. right after
/// cache recovery, so the first real request for each hot user doesn't pay
/// the cold-cache cost (§4.10).
#[instrument(skip(list, assembler))]
pub async fn load_permissions(
    list: &HotUserList,
    assembler: &PermissionAssembler,
) -> Vec<(UserKey, Vec<EffectivePermission>)> {
    let snapshot = list.snapshot();
    let mut loaded = Vec::with_capacity(snapshot.len());

    for user in snapshot.iter() {
        match assembler.get_all_user_permissions(user.biz_id, user.user_id).await {
            Ok(permissions) => loaded.push((user.clone(), permissions)),
            Err(err) => warn!(%err, biz_id = user.biz_id, user_id = user.user_id, "failed to eagerly load hot user permissions"),
        }
    }

    loaded
}
