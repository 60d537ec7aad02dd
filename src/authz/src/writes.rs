//! Cache-invalidating write wrappers and the permission reloader (C8).
//!
//! Every mutation that can change a user's effective permissions — granting
//! or revoking a role, editing the role-inclusion graph, granting or
//! revoking a direct permission — goes through here instead of straight to
//! the repository, so the affected users' cached permissions are always
//! reloaded in the same operation that changed them (§4.8, grounded on the
//! source oracle's cached-permission repository: writes call `Reload`
//! immediately after the commit, reload failures are logged and do not fail
//! the write, the freshly-reloaded list is written back into the cache under
//! the user's key with the configured TTL, and the accumulated event is
//! published best-effort at the end).

use std::sync::Arc;
use std::time::Duration;

use authz_database::{AuthzRepository, NewRoleInclusion, NewUserPermission, NewUserRole};
use authz_shared::{ChangedPermission, PermissionChangeEvent, UserPermissionChange, RoleInclusion, UserRole};
use chrono::Utc;
use tracing::{instrument, warn};

use crate::cache::MultiLevelCache;
use crate::errors::AuthzResult;
use crate::events::ChangeEventSink;
use crate::permissions::PermissionAssembler;
use crate::roles::RoleResolver;

pub struct WriteCoordinator {
    repository: Arc<dyn AuthzRepository>,
    permissions: PermissionAssembler,
    roles: RoleResolver,
    event_sink: Arc<dyn ChangeEventSink>,
    cache: Option<Arc<MultiLevelCache>>,
    cache_entry_ttl: Duration,
}

impl WriteCoordinator {
    pub fn new(
        repository: Arc<dyn AuthzRepository>,
        event_sink: Arc<dyn ChangeEventSink>,
        cache: Option<Arc<MultiLevelCache>>,
        cache_entry_ttl: Duration,
    ) -> Self {
        Self {
            permissions: PermissionAssembler::new(repository.clone()),
            roles: RoleResolver::new(repository.clone()),
            repository,
            event_sink,
            cache,
            cache_entry_ttl,
        }
    }

    #[instrument(skip(self))]
    pub async fn grant_user_role(&self, new_user_role: NewUserRole) -> AuthzResult<UserRole> {
        let biz_id = new_user_role.biz_id;
        let user_id = new_user_role.user_id;
        let created = self.repository.create_user_role(new_user_role).await?;
        self.reload(biz_id, &[user_id]).await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn revoke_user_role(&self, biz_id: i64, id: i64) -> AuthzResult<()> {
        if let Some(removed) = self.repository.delete_user_role(biz_id, id).await? {
            self.reload(biz_id, &[removed.user_id]).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn grant_user_permission(
        &self,
        new_user_permission: NewUserPermission,
    ) -> AuthzResult<authz_shared::UserPermission> {
        let biz_id = new_user_permission.biz_id;
        let user_id = new_user_permission.user_id;
        let created = self.repository.create_user_permission(new_user_permission).await?;
        self.reload(biz_id, &[user_id]).await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn revoke_user_permission(&self, biz_id: i64, id: i64) -> AuthzResult<()> {
        if let Some(removed) = self.repository.delete_user_permission(biz_id, id).await? {
            self.reload(biz_id, &[removed.user_id]).await;
        }
        Ok(())
    }

    /// Adding an inclusion edge can change the effective permissions of any
    /// user who directly holds the *including* role, or any role that
    /// transitively includes it — so the affected-user set is every active
    /// grantee of every ancestor of `including_role_id` (itself included).
    #[instrument(skip(self))]
    pub async fn add_role_inclusion(&self, new_inclusion: NewRoleInclusion) -> AuthzResult<RoleInclusion> {
        let biz_id = new_inclusion.biz_id;
        let including_role_id = new_inclusion.including_role_id;
        let created = self.repository.create_role_inclusion(new_inclusion).await?;
        let affected_users = self.users_holding_role_or_ancestors(biz_id, including_role_id).await?;
        self.reload(biz_id, &affected_users).await;
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn remove_role_inclusion(&self, biz_id: i64, id: i64) -> AuthzResult<()> {
        if let Some(removed) = self.repository.delete_role_inclusion(biz_id, id).await? {
            let affected_users = self
                .users_holding_role_or_ancestors(biz_id, removed.including_role_id)
                .await?;
            self.reload(biz_id, &affected_users).await;
        }
        Ok(())
    }

    /// Every user with an active grant of `role_id` or any role that
    /// transitively includes it (§4.8).
    async fn users_holding_role_or_ancestors(&self, biz_id: i64, role_id: i64) -> AuthzResult<Vec<i64>> {
        let ancestor_role_ids = self.roles.expand_backward(biz_id, role_id).await?;
        let now = Utc::now();
        let user_roles = self
            .repository
            .find_active_user_roles_by_role_ids(biz_id, &ancestor_role_ids, now)
            .await?;

        let mut user_ids: Vec<i64> = user_roles.into_iter().map(|ur| ur.user_id).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        Ok(user_ids)
    }

    /// Reloads each user's effective permissions, writes the fresh list back
    /// into the cache (when one is configured) so a stale entry never
    /// outlives the write that invalidated it, and publishes one accumulated
    /// event for the batch. Per-user reload failures are logged and skipped
    /// rather than aborting the batch; publish failures are handled inside
    /// the sink itself (§4.8, §9).
    #[instrument(skip(self))]
    async fn reload(&self, biz_id: i64, user_ids: &[i64]) {
        let mut event = PermissionChangeEvent::new();

        for &user_id in user_ids {
            match self.permissions.get_all_user_permissions(biz_id, user_id).await {
                Ok(effective) => {
                    if let Some(cache) = &self.cache {
                        let cache_key = format!("user_permissions:{biz_id}:{user_id}");
                        cache.set(&cache_key, &effective, self.cache_entry_ttl).await;
                    }

                    let changed = effective
                        .into_iter()
                        .map(|p| ChangedPermission {
                            resource: p.resource,
                            action: p.action,
                            effect: p.effect,
                        })
                        .collect();
                    event.insert(UserPermissionChange {
                        user_id,
                        biz_id,
                        permissions: changed,
                    });
                }
                Err(err) => {
                    warn!(%err, user_id, biz_id, "failed to reload user permissions after write");
                }
            }
        }

        if !event.permissions.is_empty() {
            self.event_sink.publish(&event).await;
        }
    }
}
