//! Service facade (C9/C12): wires C1–C10 behind one `AuthzService` and
//! implements the hybrid RBAC+ABAC decision pipeline (§4.9).

use std::collections::HashSet;
use std::sync::Arc;

use authz_database::{
    AttributeEntityKind, AuthzRepository, NewBusinessConfig, NewPermission, NewPolicy,
    NewPolicyRuleRow, NewResource, NewRole, NewRoleInclusion, NewRolePermission,
    NewUserPermission, NewUserRole,
};
use authz_shared::{
    AttributeDefinition, AttributeValue, BusinessConfig, Effect, EffectivePermission, Permission,
    Policy, PolicyRuleRow, Resource, ResourceLocator, Role, RoleInclusion, RolePermission,
    UserPermission, UserRole,
};
use tracing::instrument;

use crate::attribute_store::{AttributeStore, BizAttrDefinitions};
use crate::cache::MultiLevelCache;
use crate::config::{AbacZeroPoliciesPolicy, AuthzConfig};
use crate::errors::{AuthzError, AuthzResult};
use crate::events::ChangeEventSink;
use crate::hot_users::HotUserList;
use crate::permissions::PermissionAssembler;
use crate::policy::{self, AttributeBundle};
use crate::writes::WriteCoordinator;

/// The entity id backing a business's single shared "environment" row:
/// environment attributes (time of day, network zone, ...) are not scoped
/// to any particular user or resource, so they live under one sentinel id
/// per `biz_id` rather than a real foreign key (§9 open question).
pub const ENVIRONMENT_ENTITY_ID: i64 = 0;

pub struct AuthzService {
    config: AuthzConfig,
    repository: Arc<dyn AuthzRepository>,
    attribute_store: AttributeStore,
    permissions: PermissionAssembler,
    writes: WriteCoordinator,
    hot_users: HotUserList,
    cache: Option<Arc<MultiLevelCache>>,
}

impl AuthzService {
    pub fn new(
        config: AuthzConfig,
        repository: Arc<dyn AuthzRepository>,
        event_sink: Arc<dyn ChangeEventSink>,
        cache: Option<Arc<MultiLevelCache>>,
    ) -> Self {
        let writes = WriteCoordinator::new(
            repository.clone(),
            event_sink,
            cache.clone(),
            config.cache.entry_ttl,
        );
        Self {
            attribute_store: AttributeStore::new(repository.clone()),
            permissions: PermissionAssembler::new(repository.clone()),
            writes,
            hot_users: HotUserList::new(),
            repository,
            config,
            cache,
        }
    }

    pub fn hot_users(&self) -> &HotUserList {
        &self.hot_users
    }

    /// The hybrid RBAC+ABAC decision: RBAC short-circuits on a deny or a
    /// missing grant, and ABAC only runs once RBAC allows. Within ABAC, any
    /// satisfied DENY policy wins over any satisfied ALLOW, and zero
    /// applicable policies falls back to `config.cache.abac_zero_policies`
    /// (§4.9, §9).
    #[instrument(skip(self, request_attrs), fields(biz_id, user_id, resource = %resource.key, actions = actions.len()))]
    pub async fn check(
        &self,
        biz_id: i64,
        user_id: i64,
        resource: &ResourceLocator,
        actions: &[String],
        request_attrs: &std::collections::HashMap<String, String>,
    ) -> AuthzResult<bool> {
        if biz_id == 0 {
            return Err(AuthzError::Unauthenticated("missing biz_id".to_string()));
        }
        if actions.is_empty() {
            return Err(AuthzError::Validation("actions must not be empty".to_string()));
        }

        let now = chrono::Utc::now();

        let effective = self.effective_permissions_cached(biz_id, user_id).await?;
        let rbac_allowed = PermissionAssembler::resolve(&effective, resource, actions, now);
        if !rbac_allowed {
            return Ok(false);
        }

        let Some(resource_row) = self
            .repository
            .find_resource_by_type_key(biz_id, &resource.resource_type, &resource.key)
            .await?
        else {
            return Ok(false);
        };

        let (definitions, candidate_permissions) = tokio::try_join!(
            self.attribute_store.fetch_biz_definitions(biz_id),
            self.permissions
                .find_permissions_by_resource_and_actions(biz_id, resource_row.id, actions),
        )?;

        if candidate_permissions.is_empty() {
            return Ok(false);
        }

        let (subject_bundle, resource_bundle, environment_bundle) = tokio::try_join!(
            self.attribute_store.fetch_values(
                AttributeEntityKind::Subject,
                biz_id,
                user_id,
                &definitions
            ),
            self.attribute_store.fetch_values(
                AttributeEntityKind::Resource,
                biz_id,
                resource_row.id,
                &definitions
            ),
            self.attribute_store.fetch_values(
                AttributeEntityKind::Environment,
                biz_id,
                ENVIRONMENT_ENTITY_ID,
                &definitions
            ),
        )?;

        // Realtime request attributes are treated as subject-scoped context
        // (§9 open question): the inbound `Check` carries no separate
        // resource/environment override channel, so they merge only here.
        let subject_bundle = self.attribute_store.merge_realtime(
            subject_bundle,
            authz_shared::EntityKind::Subject,
            request_attrs,
            &definitions,
        );

        let mut merged_bundle = AttributeBundle::new();
        merged_bundle.extend(subject_bundle);
        merged_bundle.extend(resource_bundle);
        merged_bundle.extend(environment_bundle);

        let permission_ids: Vec<i64> = candidate_permissions.iter().map(|p| p.id).collect();
        let policies = self
            .repository
            .find_policies_by_permission_ids(biz_id, &permission_ids)
            .await?;

        if policies.is_empty() {
            return Ok(match self.config.cache.abac_zero_policies {
                AbacZeroPoliciesPolicy::Deny => false,
                AbacZeroPoliciesPolicy::RbacStands => rbac_allowed,
            });
        }

        let policy_ids: Vec<i64> = policies.iter().map(|p| p.id).collect();
        let rule_rows = self.repository.find_policy_rules(biz_id, &policy_ids).await?;
        let grouped = policy::group_rows_by_policy(&policies, rule_rows);
        let data_type_of = definitions.data_type_index();

        let permission_id_set: HashSet<i64> = permission_ids.into_iter().collect();
        let mut any_deny = false;
        let mut any_allow = false;

        for group in &grouped {
            if group.policy.status != authz_shared::PolicyStatus::Active {
                continue;
            }
            if !policy::evaluate_policy(&group.rows, &merged_bundle, &data_type_of) {
                continue;
            }
            for binding in &group.policy.permissions {
                if !permission_id_set.contains(&binding.permission_id) {
                    continue;
                }
                match binding.effect {
                    Effect::Deny => any_deny = true,
                    Effect::Allow => any_allow = true,
                }
            }
        }

        if any_deny {
            return Ok(false);
        }
        Ok(any_allow)
    }

    /// Loads a user's effective permissions through the cache when one is
    /// configured, falling back to direct assembly on a miss or when no
    /// cache is wired in — correctness never depends on the cache (§4.7).
    async fn effective_permissions_cached(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> AuthzResult<Vec<EffectivePermission>> {
        let cache_key = format!("user_permissions:{biz_id}:{user_id}");

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get::<Vec<EffectivePermission>>(&cache_key).await {
                return Ok(cached);
            }
        }

        let loaded = self.permissions.get_all_user_permissions(biz_id, user_id).await?;

        if let Some(cache) = &self.cache {
            cache.set(&cache_key, &loaded, self.config.cache.entry_ttl).await;
        }

        Ok(loaded)
    }

    // --- CRUD passthrough (§3, one method pair per entity) -----------------

    #[instrument(skip(self, role))]
    pub async fn create_role(&self, role: NewRole) -> AuthzResult<Role> {
        Ok(self.repository.create_role(role).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_role(&self, biz_id: i64, id: i64) -> AuthzResult<Role> {
        self.repository
            .find_role_by_id(biz_id, id)
            .await?
            .ok_or_else(|| AuthzError::not_found("role", format!("id={id}")))
    }

    #[instrument(skip(self))]
    pub async fn delete_role(&self, biz_id: i64, id: i64) -> AuthzResult<()> {
        Ok(self.repository.delete_role(biz_id, id).await?)
    }

    #[instrument(skip(self, resource))]
    pub async fn create_resource(&self, resource: NewResource) -> AuthzResult<Resource> {
        Ok(self.repository.create_resource(resource).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_resource(
        &self,
        biz_id: i64,
        resource_type: &str,
        key: &str,
    ) -> AuthzResult<Resource> {
        self.repository
            .find_resource_by_type_key(biz_id, resource_type, key)
            .await?
            .ok_or_else(|| AuthzError::not_found("resource", format!("{resource_type}:{key}")))
    }

    #[instrument(skip(self, permission))]
    pub async fn create_permission(&self, permission: NewPermission) -> AuthzResult<Permission> {
        Ok(self.repository.create_permission(permission).await?)
    }

    #[instrument(skip(self, binding))]
    pub async fn create_role_permission(
        &self,
        binding: NewRolePermission,
    ) -> AuthzResult<RolePermission> {
        Ok(self.repository.create_role_permission(binding).await?)
    }

    #[instrument(skip(self, new_user_role))]
    pub async fn grant_user_role(&self, new_user_role: NewUserRole) -> AuthzResult<UserRole> {
        self.writes.grant_user_role(new_user_role).await
    }

    #[instrument(skip(self))]
    pub async fn revoke_user_role(&self, biz_id: i64, id: i64) -> AuthzResult<()> {
        self.writes.revoke_user_role(biz_id, id).await
    }

    #[instrument(skip(self, new_user_permission))]
    pub async fn grant_user_permission(
        &self,
        new_user_permission: NewUserPermission,
    ) -> AuthzResult<UserPermission> {
        self.writes.grant_user_permission(new_user_permission).await
    }

    #[instrument(skip(self))]
    pub async fn revoke_user_permission(&self, biz_id: i64, id: i64) -> AuthzResult<()> {
        self.writes.revoke_user_permission(biz_id, id).await
    }

    #[instrument(skip(self, new_inclusion))]
    pub async fn add_role_inclusion(
        &self,
        new_inclusion: NewRoleInclusion,
    ) -> AuthzResult<RoleInclusion> {
        self.writes.add_role_inclusion(new_inclusion).await
    }

    #[instrument(skip(self))]
    pub async fn remove_role_inclusion(&self, biz_id: i64, id: i64) -> AuthzResult<()> {
        self.writes.remove_role_inclusion(biz_id, id).await
    }

    #[instrument(skip(self))]
    pub async fn get_all_user_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
    ) -> AuthzResult<Vec<EffectivePermission>> {
        self.effective_permissions_cached(biz_id, user_id).await
    }

    #[instrument(skip(self, definition))]
    pub async fn create_attribute_definition(
        &self,
        definition: authz_database::NewAttributeDefinition,
    ) -> AuthzResult<AttributeDefinition> {
        Ok(self.repository.create_attribute_definition(definition).await?)
    }

    #[instrument(skip(self))]
    pub async fn biz_attribute_definitions(&self, biz_id: i64) -> AuthzResult<BizAttrDefinitions> {
        self.attribute_store.fetch_biz_definitions(biz_id).await
    }

    #[instrument(skip(self, value))]
    pub async fn set_attribute_value(
        &self,
        kind: AttributeEntityKind,
        definition: &AttributeDefinition,
        value: AttributeValue,
    ) -> AuthzResult<AttributeValue> {
        self.attribute_store.save_value(kind, definition, value).await
    }

    #[instrument(skip(self, policy))]
    pub async fn create_policy(&self, policy: NewPolicy) -> AuthzResult<Policy> {
        Ok(self.repository.create_policy(policy).await?)
    }

    #[instrument(skip(self, rule))]
    pub async fn create_policy_rule(&self, rule: NewPolicyRuleRow) -> AuthzResult<PolicyRuleRow> {
        Ok(self.repository.create_policy_rule(rule).await?)
    }

    #[instrument(skip(self, config))]
    pub async fn create_business_config(
        &self,
        config: NewBusinessConfig,
    ) -> AuthzResult<BusinessConfig> {
        Ok(self.repository.create_business_config(config).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_business_config(&self, id: i64) -> AuthzResult<BusinessConfig> {
        self.repository
            .find_business_config_by_id(id)
            .await?
            .ok_or_else(|| AuthzError::not_found("business_config", format!("id={id}")))
    }

    /// Updates a business config by delegating straight to the repository,
    /// rather than recursing through this same method in a loop (§9
    /// correction to the source oracle's `UpdateBusinessConfig`).
    #[instrument(skip(self, config))]
    pub async fn update_business_config(&self, config: BusinessConfig) -> AuthzResult<BusinessConfig> {
        Ok(self.repository.update_business_config(config).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LoggingEventSink;
    use async_trait::async_trait;
    use authz_database::DatabaseError;
    use authz_shared::*;
    use chrono::{DateTime, Duration, Utc};

    struct FakeRepo {
        resources: Vec<Resource>,
        user_roles: Vec<UserRole>,
        role_permissions: Vec<RolePermission>,
        permissions: Vec<Permission>,
        policies: Vec<Policy>,
        policy_rules: Vec<PolicyRuleRow>,
        definitions: Vec<AttributeDefinition>,
        subject_values: Vec<AttributeValue>,
    }

    #[async_trait]
    impl AuthzRepository for FakeRepo {
        async fn create_role(&self, _: NewRole) -> Result<Role, DatabaseError> { unreachable!() }
        async fn find_role_by_id(&self, _: i64, _: i64) -> Result<Option<Role>, DatabaseError> { unreachable!() }
        async fn delete_role(&self, _: i64, _: i64) -> Result<(), DatabaseError> { unreachable!() }
        async fn create_resource(&self, _: NewResource) -> Result<Resource, DatabaseError> { unreachable!() }
        async fn find_resource_by_type_key(&self, _: i64, resource_type: &str, key: &str) -> Result<Option<Resource>, DatabaseError> {
            Ok(self.resources.iter().find(|r| r.resource_type == resource_type && r.key == key).cloned())
        }
        async fn find_resources_by_ids(&self, _: i64, ids: &[i64]) -> Result<Vec<Resource>, DatabaseError> {
            Ok(self.resources.iter().filter(|r| ids.contains(&r.id)).cloned().collect())
        }
        async fn create_permission(&self, _: NewPermission) -> Result<Permission, DatabaseError> { unreachable!() }
        async fn find_permissions_by_resource_and_actions(&self, _: i64, resource_id: i64, actions: &[String]) -> Result<Vec<Permission>, DatabaseError> {
            Ok(self.permissions.iter().filter(|p| p.resource_id == resource_id && actions.contains(&p.action)).cloned().collect())
        }
        async fn find_permissions_by_ids(&self, _: i64, ids: &[i64]) -> Result<Vec<Permission>, DatabaseError> {
            Ok(self.permissions.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
        }
        async fn create_user_role(&self, _: NewUserRole) -> Result<UserRole, DatabaseError> { unreachable!() }
        async fn delete_user_role(&self, _: i64, _: i64) -> Result<Option<UserRole>, DatabaseError> { unreachable!() }
        async fn find_active_user_roles(&self, _: i64, user_id: i64, now: DateTime<Utc>) -> Result<Vec<UserRole>, DatabaseError> {
            Ok(self.user_roles.iter().filter(|ur| ur.user_id == user_id && ur.is_active_at(now)).cloned().collect())
        }
        async fn find_active_user_roles_by_role_ids(&self, _: i64, _: &[i64], _: DateTime<Utc>) -> Result<Vec<UserRole>, DatabaseError> { unreachable!() }
        async fn create_role_permission(&self, _: NewRolePermission) -> Result<RolePermission, DatabaseError> { unreachable!() }
        async fn find_role_permissions_by_role_ids(&self, _: i64, role_ids: &[i64]) -> Result<Vec<RolePermission>, DatabaseError> {
            Ok(self.role_permissions.iter().filter(|rp| role_ids.contains(&rp.role_id)).cloned().collect())
        }
        async fn create_role_inclusion(&self, _: NewRoleInclusion) -> Result<RoleInclusion, DatabaseError> { unreachable!() }
        async fn delete_role_inclusion(&self, _: i64, _: i64) -> Result<Option<RoleInclusion>, DatabaseError> { unreachable!() }
        async fn find_inclusions_by_including_ids(&self, _: i64, _: &[i64]) -> Result<Vec<RoleInclusion>, DatabaseError> { Ok(vec![]) }
        async fn find_inclusions_by_included_ids(&self, _: i64, _: &[i64]) -> Result<Vec<RoleInclusion>, DatabaseError> { Ok(vec![]) }
        async fn create_user_permission(&self, _: NewUserPermission) -> Result<UserPermission, DatabaseError> { unreachable!() }
        async fn delete_user_permission(&self, _: i64, _: i64) -> Result<Option<UserPermission>, DatabaseError> { unreachable!() }
        async fn find_active_user_permissions(&self, _: i64, _: i64, _: DateTime<Utc>) -> Result<Vec<UserPermission>, DatabaseError> { Ok(vec![]) }
        async fn create_attribute_definition(&self, _: authz_database::NewAttributeDefinition) -> Result<AttributeDefinition, DatabaseError> { unreachable!() }
        async fn find_attribute_definitions(&self, _: i64) -> Result<Vec<AttributeDefinition>, DatabaseError> {
            Ok(self.definitions.clone())
        }
        async fn find_attribute_values(&self, kind: AttributeEntityKind, _: i64, entity_id: i64) -> Result<Vec<AttributeValue>, DatabaseError> {
            match kind {
                AttributeEntityKind::Subject => Ok(self.subject_values.iter().filter(|v| v.entity_id == entity_id).cloned().collect()),
                AttributeEntityKind::Resource => Ok(vec![]),
                AttributeEntityKind::Environment => Ok(vec![]),
            }
        }
        async fn upsert_attribute_value(&self, _: AttributeEntityKind, _: AttributeValue) -> Result<AttributeValue, DatabaseError> { unreachable!() }
        async fn create_policy(&self, _: authz_database::NewPolicy) -> Result<Policy, DatabaseError> { unreachable!() }
        async fn create_policy_rule(&self, _: authz_database::NewPolicyRuleRow) -> Result<PolicyRuleRow, DatabaseError> { unreachable!() }
        async fn find_policies_by_permission_ids(&self, _: i64, permission_ids: &[i64]) -> Result<Vec<Policy>, DatabaseError> {
            Ok(self.policies.iter().filter(|p| p.permissions.iter().any(|b| permission_ids.contains(&b.permission_id))).cloned().collect())
        }
        async fn find_policy_rules(&self, _: i64, policy_ids: &[i64]) -> Result<Vec<PolicyRuleRow>, DatabaseError> {
            Ok(self.policy_rules.iter().filter(|r| policy_ids.contains(&r.policy_id)).cloned().collect())
        }
        async fn create_business_config(&self, _: NewBusinessConfig) -> Result<BusinessConfig, DatabaseError> { unreachable!() }
        async fn find_business_config_by_id(&self, _: i64) -> Result<Option<BusinessConfig>, DatabaseError> { unreachable!() }
        async fn update_business_config(&self, _: BusinessConfig) -> Result<BusinessConfig, DatabaseError> { unreachable!() }
    }

    fn locator() -> ResourceLocator {
        ResourceLocator { resource_type: "document".to_string(), key: "doc-1".to_string() }
    }

    fn base_repo() -> FakeRepo {
        let now = Utc::now();
        FakeRepo {
            resources: vec![Resource {
                id: 100,
                biz_id: 1,
                resource_type: "document".to_string(),
                key: "doc-1".to_string(),
                name: "Doc 1".to_string(),
                description: String::new(),
                metadata: Default::default(),
            }],
            user_roles: vec![UserRole {
                id: 1,
                biz_id: 1,
                user_id: 7,
                role_id: 10,
                start_time: now - Duration::hours(1),
                end_time: now + Duration::hours(1),
            }],
            role_permissions: vec![RolePermission { id: 1, biz_id: 1, role_id: 10, permission_id: 50 }],
            permissions: vec![Permission {
                id: 50,
                biz_id: 1,
                name: "read-doc".to_string(),
                description: String::new(),
                resource_id: 100,
                action: "read".to_string(),
                metadata: Default::default(),
            }],
            policies: vec![],
            policy_rules: vec![],
            definitions: vec![],
            subject_values: vec![],
        }
    }

    fn service(repo: FakeRepo) -> AuthzService {
        AuthzService::new(
            AuthzConfig::default(),
            Arc::new(repo),
            Arc::new(LoggingEventSink),
            None,
        )
    }

    #[tokio::test]
    async fn rbac_only_denies_with_no_policies_configured_by_default() {
        // Default config is Deny-on-zero-policies, so RBAC alone never suffices.
        let svc = service(base_repo());
        let allowed = svc
            .check(1, 7, &locator(), &["read".to_string()], &Default::default())
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn rbac_stands_when_configured_and_no_policies_apply() {
        let mut config = AuthzConfig::default();
        config.cache.abac_zero_policies = AbacZeroPoliciesPolicy::RbacStands;
        let svc = AuthzService::new(config, Arc::new(base_repo()), Arc::new(LoggingEventSink), None);
        let allowed = svc
            .check(1, 7, &locator(), &["read".to_string()], &Default::default())
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn rbac_denies_without_any_matching_role_permission() {
        let svc = service(base_repo());
        let allowed = svc
            .check(1, 7, &locator(), &["delete".to_string()], &Default::default())
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn abac_satisfied_allow_policy_grants_access() {
        let mut repo = base_repo();
        repo.definitions.push(AttributeDefinition {
            id: 1,
            biz_id: 1,
            name: "dept".to_string(),
            description: String::new(),
            data_type: DataType::String,
            entity_type: EntityKind::Subject,
            validation_rule: ".*".to_string(),
        });
        repo.subject_values.push(AttributeValue { id: 1, biz_id: 1, entity_id: 7, definition_id: 1, value: "eng".to_string() });
        repo.policies.push(Policy {
            id: 1,
            biz_id: 1,
            name: "eng-only".to_string(),
            description: String::new(),
            status: PolicyStatus::Active,
            execute_type: "all".to_string(),
            permissions: vec![PolicyPermissionBinding { permission_id: 50, effect: Effect::Allow }],
        });
        repo.policy_rules.push(PolicyRuleRow {
            id: 1,
            biz_id: 1,
            policy_id: 1,
            operator: RuleOperator::Eq,
            left_child: None,
            right_child: None,
            attr_def_id: Some(1),
            value: Some("eng".to_string()),
        });

        let svc = service(repo);
        let allowed = svc
            .check(1, 7, &locator(), &["read".to_string()], &Default::default())
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn abac_satisfied_deny_policy_beats_allow_on_the_same_permission() {
        let mut repo = base_repo();
        repo.definitions.push(AttributeDefinition {
            id: 1,
            biz_id: 1,
            name: "dept".to_string(),
            description: String::new(),
            data_type: DataType::String,
            entity_type: EntityKind::Subject,
            validation_rule: ".*".to_string(),
        });
        repo.subject_values.push(AttributeValue { id: 1, biz_id: 1, entity_id: 7, definition_id: 1, value: "eng".to_string() });
        repo.policies.push(Policy {
            id: 1,
            biz_id: 1,
            name: "always-matches".to_string(),
            description: String::new(),
            status: PolicyStatus::Active,
            execute_type: "all".to_string(),
            permissions: vec![
                PolicyPermissionBinding { permission_id: 50, effect: Effect::Allow },
                PolicyPermissionBinding { permission_id: 50, effect: Effect::Deny },
            ],
        });
        repo.policy_rules.push(PolicyRuleRow {
            id: 1,
            biz_id: 1,
            policy_id: 1,
            operator: RuleOperator::Eq,
            left_child: None,
            right_child: None,
            attr_def_id: Some(1),
            value: Some("eng".to_string()),
        });

        let svc = service(repo);
        let allowed = svc
            .check(1, 7, &locator(), &["read".to_string()], &Default::default())
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn unsatisfied_policy_falls_back_to_zero_policy_default() {
        let mut repo = base_repo();
        repo.definitions.push(AttributeDefinition {
            id: 1,
            biz_id: 1,
            name: "dept".to_string(),
            description: String::new(),
            data_type: DataType::String,
            entity_type: EntityKind::Subject,
            validation_rule: ".*".to_string(),
        });
        // No subject value is ever stored for definition 1, so the leaf is
        // always false and the policy never becomes satisfied.
        repo.policies.push(Policy {
            id: 1,
            biz_id: 1,
            name: "eng-only".to_string(),
            description: String::new(),
            status: PolicyStatus::Active,
            execute_type: "all".to_string(),
            permissions: vec![PolicyPermissionBinding { permission_id: 50, effect: Effect::Allow }],
        });
        repo.policy_rules.push(PolicyRuleRow {
            id: 1,
            biz_id: 1,
            policy_id: 1,
            operator: RuleOperator::Eq,
            left_child: None,
            right_child: None,
            attr_def_id: Some(1),
            value: Some("eng".to_string()),
        });

        let svc = service(repo);
        let allowed = svc
            .check(1, 7, &locator(), &["read".to_string()], &Default::default())
            .await
            .unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn request_attrs_merge_into_the_subject_bundle() {
        let mut repo = base_repo();
        repo.definitions.push(AttributeDefinition {
            id: 1,
            biz_id: 1,
            name: "mfa".to_string(),
            description: String::new(),
            data_type: DataType::Boolean,
            entity_type: EntityKind::Subject,
            validation_rule: ".*".to_string(),
        });
        repo.policies.push(Policy {
            id: 1,
            biz_id: 1,
            name: "mfa-required".to_string(),
            description: String::new(),
            status: PolicyStatus::Active,
            execute_type: "all".to_string(),
            permissions: vec![PolicyPermissionBinding { permission_id: 50, effect: Effect::Allow }],
        });
        repo.policy_rules.push(PolicyRuleRow {
            id: 1,
            biz_id: 1,
            policy_id: 1,
            operator: RuleOperator::Eq,
            left_child: None,
            right_child: None,
            attr_def_id: Some(1),
            value: Some("true".to_string()),
        });

        let svc = service(repo);
        let mut request_attrs = std::collections::HashMap::new();
        request_attrs.insert("mfa".to_string(), "true".to_string());

        let allowed = svc
            .check(1, 7, &locator(), &["read".to_string()], &request_attrs)
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn missing_resource_denies_without_error() {
        let svc = service(base_repo());
        let missing = ResourceLocator { resource_type: "document".to_string(), key: "missing".to_string() };
        let allowed = svc.check(1, 7, &missing, &["read".to_string()], &Default::default()).await.unwrap();
        assert!(!allowed);
    }

    #[tokio::test]
    async fn zero_biz_id_is_rejected_as_unauthenticated() {
        let svc = service(base_repo());
        let err = svc.check(0, 7, &locator(), &["read".to_string()], &Default::default()).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::AuthzErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn empty_actions_is_rejected_as_validation_error() {
        let svc = service(base_repo());
        let err = svc.check(1, 7, &locator(), &[], &Default::default()).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::AuthzErrorKind::Validation);
    }
}
