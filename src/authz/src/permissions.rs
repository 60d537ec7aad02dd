//! User-permission assembly (C6): combines direct grants with role-derived
//! permissions into one effective set, and resolves Allow/Deny conflicts by
//! deny-precedence.

use std::collections::HashMap;
use std::sync::Arc;

use authz_database::AuthzRepository;
use authz_shared::{Effect, EffectivePermission, Permission, ResourceLocator};
use chrono::Utc;
use tracing::instrument;

use crate::errors::AuthzResult;
use crate::roles::RoleResolver;

pub struct PermissionAssembler {
    repository: Arc<dyn AuthzRepository>,
    roles: RoleResolver,
}

impl PermissionAssembler {
    pub fn new(repository: Arc<dyn AuthzRepository>) -> Self {
        Self {
            roles: RoleResolver::new(repository.clone()),
            repository,
        }
    }

    /// Every permission currently in effect for a user: their direct grants
    /// plus everything granted through their effective role set, each
    /// materialized with resource context so callers need not re-join (§4.6).
    #[instrument(skip(self), fields(biz_id, user_id))]
    pub async fn get_all_user_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> AuthzResult<Vec<EffectivePermission>> {
        let now = Utc::now();

        let direct_user_permissions = self.repository.find_active_user_permissions(biz_id, user_id, now).await?;
        let direct_permission_ids: Vec<i64> = direct_user_permissions.iter().map(|up| up.permission_id).collect();
        let direct_permissions = self.repository.find_permissions_by_ids(biz_id, &direct_permission_ids).await?;

        let role_ids = self.roles.effective_role_ids(biz_id, user_id).await?;
        let role_permissions = self.repository.find_role_permissions_by_role_ids(biz_id, &role_ids).await?;
        let role_permission_ids: Vec<i64> = role_permissions.iter().map(|rp| rp.permission_id).collect();
        let granted_permissions = self.repository.find_permissions_by_ids(biz_id, &role_permission_ids).await?;

        let resource_ids: Vec<i64> = direct_permissions
            .iter()
            .chain(granted_permissions.iter())
            .map(|p| p.resource_id)
            .collect();
        let resources = self.repository.find_resources_by_ids(biz_id, &resource_ids).await?;
        let locator_by_resource_id: HashMap<i64, ResourceLocator> =
            resources.iter().map(|r| (r.id, r.locator())).collect();

        let mut effective: Vec<EffectivePermission> = direct_user_permissions
            .iter()
            .filter_map(|up| {
                let permission = direct_permissions.iter().find(|p| p.id == up.permission_id)?;
                let resource = locator_by_resource_id.get(&permission.resource_id)?.clone();
                Some(EffectivePermission {
                    permission_id: permission.id,
                    resource,
                    action: permission.action.clone(),
                    effect: up.effect,
                    start_time: up.start_time,
                    end_time: up.end_time,
                })
            })
            .collect();

        let far_future = now + chrono::Duration::days(365 * 100);
        effective.extend(granted_permissions.into_iter().filter_map(|permission| {
            let resource = locator_by_resource_id.get(&permission.resource_id)?.clone();
            Some(EffectivePermission {
                permission_id: permission.id,
                resource,
                action: permission.action,
                effect: Effect::Allow,
                start_time: now,
                end_time: far_future,
            })
        }));

        Ok(effective)
    }

    /// Resolves a resource-bound decision for one set of requested actions
    /// against an already-assembled permission list: one scan over every
    /// permission, OR-ing allow matches across the requested actions but
    /// returning `false` immediately on the first active Deny match among
    /// them (§4.6, §8 I1). A requested action with no grant at all simply
    /// contributes nothing to the scan — it is not individually required.
    pub fn resolve(
        permissions: &[EffectivePermission],
        resource: &ResourceLocator,
        actions: &[String],
        now: chrono::DateTime<Utc>,
    ) -> bool {
        let mut pending = false;
        for permission in permissions {
            if !permission.is_active_at(now) {
                continue;
            }
            if !actions.iter().any(|action| permission.matches(resource, action)) {
                continue;
            }
            if permission.effect.is_deny() {
                return false;
            }
            pending = true;
        }
        pending
    }

    pub async fn find_permissions_by_resource_and_actions(
        &self,
        biz_id: i64,
        resource_id: i64,
        actions: &[String],
    ) -> AuthzResult<Vec<Permission>> {
        Ok(self
            .repository
            .find_permissions_by_resource_and_actions(biz_id, resource_id, actions)
            .await?)
    }
}
