//! Shared fakes and builders for the crate-level scenario tests.
//!
//! A single mutable, in-memory `FakeRepo` stands in for the Postgres-backed
//! repository so the S1-S7 scenarios and cross-cutting invariants (§8) can
//! run deterministically, without a database, end-to-end through
//! `AuthzService`. This mirrors the hand-rolled fakes already used inside
//! `roles.rs`, `writes.rs`, and `service.rs`'s own unit tests, just wide
//! enough to also exercise the write paths those per-module fakes stub out.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use authz_core::events::ChangeEventSink;
use authz_core::{AttributeEntityKind, AuthzConfig, AuthzRepository, AuthzService};
use authz_database::{
    DatabaseError, NewAttributeDefinition, NewBusinessConfig, NewPermission, NewPolicy,
    NewPolicyRuleRow, NewResource, NewRole, NewRoleInclusion, NewRolePermission,
    NewUserPermission, NewUserRole,
};
use authz_shared::*;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

#[derive(Default)]
pub struct FakeRepo {
    next_id: AtomicI64,
    pub roles: Mutex<Vec<Role>>,
    pub resources: Mutex<Vec<Resource>>,
    pub permissions: Mutex<Vec<Permission>>,
    pub user_roles: Mutex<Vec<UserRole>>,
    pub role_permissions: Mutex<Vec<RolePermission>>,
    pub role_inclusions: Mutex<Vec<RoleInclusion>>,
    pub user_permissions: Mutex<Vec<UserPermission>>,
    pub definitions: Mutex<Vec<AttributeDefinition>>,
    pub subject_values: Mutex<Vec<AttributeValue>>,
    pub resource_values: Mutex<Vec<AttributeValue>>,
    pub environment_values: Mutex<Vec<AttributeValue>>,
    pub policies: Mutex<Vec<Policy>>,
    pub policy_rules: Mutex<Vec<PolicyRuleRow>>,
    pub business_configs: Mutex<Vec<BusinessConfig>>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self { next_id: AtomicI64::new(1), ..Default::default() }
    }

    fn fresh_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthzRepository for FakeRepo {
    async fn create_role(&self, role: NewRole) -> Result<Role, DatabaseError> {
        let row = Role {
            id: self.fresh_id(),
            biz_id: role.biz_id,
            role_type: role.role_type,
            name: role.name,
            description: role.description,
            metadata: role.metadata,
        };
        self.roles.lock().push(row.clone());
        Ok(row)
    }

    async fn find_role_by_id(&self, biz_id: i64, id: i64) -> Result<Option<Role>, DatabaseError> {
        Ok(self.roles.lock().iter().find(|r| r.biz_id == biz_id && r.id == id).cloned())
    }

    async fn delete_role(&self, biz_id: i64, id: i64) -> Result<(), DatabaseError> {
        self.roles.lock().retain(|r| !(r.biz_id == biz_id && r.id == id));
        Ok(())
    }

    async fn create_resource(&self, resource: NewResource) -> Result<Resource, DatabaseError> {
        let row = Resource {
            id: self.fresh_id(),
            biz_id: resource.biz_id,
            resource_type: resource.resource_type,
            key: resource.key,
            name: resource.name,
            description: resource.description,
            metadata: resource.metadata,
        };
        self.resources.lock().push(row.clone());
        Ok(row)
    }

    async fn find_resource_by_type_key(
        &self,
        biz_id: i64,
        resource_type: &str,
        key: &str,
    ) -> Result<Option<Resource>, DatabaseError> {
        Ok(self
            .resources
            .lock()
            .iter()
            .find(|r| r.biz_id == biz_id && r.resource_type == resource_type && r.key == key)
            .cloned())
    }

    async fn find_resources_by_ids(&self, biz_id: i64, ids: &[i64]) -> Result<Vec<Resource>, DatabaseError> {
        Ok(self.resources.lock().iter().filter(|r| r.biz_id == biz_id && ids.contains(&r.id)).cloned().collect())
    }

    async fn create_permission(&self, permission: NewPermission) -> Result<Permission, DatabaseError> {
        let row = Permission {
            id: self.fresh_id(),
            biz_id: permission.biz_id,
            name: permission.name,
            description: permission.description,
            resource_id: permission.resource_id,
            action: permission.action,
            metadata: permission.metadata,
        };
        self.permissions.lock().push(row.clone());
        Ok(row)
    }

    async fn find_permissions_by_resource_and_actions(
        &self,
        biz_id: i64,
        resource_id: i64,
        actions: &[String],
    ) -> Result<Vec<Permission>, DatabaseError> {
        Ok(self
            .permissions
            .lock()
            .iter()
            .filter(|p| p.biz_id == biz_id && p.resource_id == resource_id && actions.contains(&p.action))
            .cloned()
            .collect())
    }

    async fn find_permissions_by_ids(&self, biz_id: i64, ids: &[i64]) -> Result<Vec<Permission>, DatabaseError> {
        Ok(self.permissions.lock().iter().filter(|p| p.biz_id == biz_id && ids.contains(&p.id)).cloned().collect())
    }

    async fn create_user_role(&self, user_role: NewUserRole) -> Result<UserRole, DatabaseError> {
        let row = UserRole {
            id: self.fresh_id(),
            biz_id: user_role.biz_id,
            user_id: user_role.user_id,
            role_id: user_role.role_id,
            start_time: user_role.start_time,
            end_time: user_role.end_time,
        };
        self.user_roles.lock().push(row.clone());
        Ok(row)
    }

    async fn delete_user_role(&self, biz_id: i64, id: i64) -> Result<Option<UserRole>, DatabaseError> {
        let mut roles = self.user_roles.lock();
        let position = roles.iter().position(|ur| ur.biz_id == biz_id && ur.id == id);
        Ok(position.map(|i| roles.remove(i)))
    }

    async fn find_active_user_roles(
        &self,
        biz_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserRole>, DatabaseError> {
        Ok(self
            .user_roles
            .lock()
            .iter()
            .filter(|ur| ur.biz_id == biz_id && ur.user_id == user_id && ur.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn find_active_user_roles_by_role_ids(
        &self,
        biz_id: i64,
        role_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<Vec<UserRole>, DatabaseError> {
        Ok(self
            .user_roles
            .lock()
            .iter()
            .filter(|ur| ur.biz_id == biz_id && role_ids.contains(&ur.role_id) && ur.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn create_role_permission(&self, binding: NewRolePermission) -> Result<RolePermission, DatabaseError> {
        let row = RolePermission {
            id: self.fresh_id(),
            biz_id: binding.biz_id,
            role_id: binding.role_id,
            permission_id: binding.permission_id,
        };
        self.role_permissions.lock().push(row.clone());
        Ok(row)
    }

    async fn find_role_permissions_by_role_ids(
        &self,
        biz_id: i64,
        role_ids: &[i64],
    ) -> Result<Vec<RolePermission>, DatabaseError> {
        Ok(self
            .role_permissions
            .lock()
            .iter()
            .filter(|rp| rp.biz_id == biz_id && role_ids.contains(&rp.role_id))
            .cloned()
            .collect())
    }

    async fn create_role_inclusion(&self, inclusion: NewRoleInclusion) -> Result<RoleInclusion, DatabaseError> {
        let row = RoleInclusion {
            id: self.fresh_id(),
            biz_id: inclusion.biz_id,
            including_role_id: inclusion.including_role_id,
            included_role_id: inclusion.included_role_id,
        };
        self.role_inclusions.lock().push(row.clone());
        Ok(row)
    }

    async fn delete_role_inclusion(&self, biz_id: i64, id: i64) -> Result<Option<RoleInclusion>, DatabaseError> {
        let mut edges = self.role_inclusions.lock();
        let position = edges.iter().position(|e| e.biz_id == biz_id && e.id == id);
        Ok(position.map(|i| edges.remove(i)))
    }

    async fn find_inclusions_by_including_ids(
        &self,
        biz_id: i64,
        including_ids: &[i64],
    ) -> Result<Vec<RoleInclusion>, DatabaseError> {
        Ok(self
            .role_inclusions
            .lock()
            .iter()
            .filter(|e| e.biz_id == biz_id && including_ids.contains(&e.including_role_id))
            .cloned()
            .collect())
    }

    async fn find_inclusions_by_included_ids(
        &self,
        biz_id: i64,
        included_ids: &[i64],
    ) -> Result<Vec<RoleInclusion>, DatabaseError> {
        Ok(self
            .role_inclusions
            .lock()
            .iter()
            .filter(|e| e.biz_id == biz_id && included_ids.contains(&e.included_role_id))
            .cloned()
            .collect())
    }

    async fn create_user_permission(&self, permission: NewUserPermission) -> Result<UserPermission, DatabaseError> {
        let row = UserPermission {
            id: self.fresh_id(),
            biz_id: permission.biz_id,
            user_id: permission.user_id,
            permission_id: permission.permission_id,
            start_time: permission.start_time,
            end_time: permission.end_time,
            effect: permission.effect,
        };
        self.user_permissions.lock().push(row.clone());
        Ok(row)
    }

    async fn delete_user_permission(&self, biz_id: i64, id: i64) -> Result<Option<UserPermission>, DatabaseError> {
        let mut permissions = self.user_permissions.lock();
        let position = permissions.iter().position(|up| up.biz_id == biz_id && up.id == id);
        Ok(position.map(|i| permissions.remove(i)))
    }

    async fn find_active_user_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserPermission>, DatabaseError> {
        Ok(self
            .user_permissions
            .lock()
            .iter()
            .filter(|up| up.biz_id == biz_id && up.user_id == user_id && up.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn create_attribute_definition(
        &self,
        definition: NewAttributeDefinition,
    ) -> Result<AttributeDefinition, DatabaseError> {
        let row = AttributeDefinition {
            id: self.fresh_id(),
            biz_id: definition.biz_id,
            name: definition.name,
            description: definition.description,
            data_type: definition.data_type,
            entity_type: definition.entity_type,
            validation_rule: definition.validation_rule,
        };
        self.definitions.lock().push(row.clone());
        Ok(row)
    }

    async fn find_attribute_definitions(&self, biz_id: i64) -> Result<Vec<AttributeDefinition>, DatabaseError> {
        Ok(self.definitions.lock().iter().filter(|d| d.biz_id == biz_id).cloned().collect())
    }

    async fn find_attribute_values(
        &self,
        kind: AttributeEntityKind,
        biz_id: i64,
        entity_id: i64,
    ) -> Result<Vec<AttributeValue>, DatabaseError> {
        let values = match kind {
            AttributeEntityKind::Subject => self.subject_values.lock(),
            AttributeEntityKind::Resource => self.resource_values.lock(),
            AttributeEntityKind::Environment => self.environment_values.lock(),
        };
        Ok(values.iter().filter(|v| v.biz_id == biz_id && v.entity_id == entity_id).cloned().collect())
    }

    async fn upsert_attribute_value(
        &self,
        kind: AttributeEntityKind,
        value: AttributeValue,
    ) -> Result<AttributeValue, DatabaseError> {
        let mut values = match kind {
            AttributeEntityKind::Subject => self.subject_values.lock(),
            AttributeEntityKind::Resource => self.resource_values.lock(),
            AttributeEntityKind::Environment => self.environment_values.lock(),
        };
        let mut stored = value.clone();
        if stored.id == 0 {
            stored.id = self.fresh_id();
        }
        values.retain(|v| !(v.biz_id == stored.biz_id && v.entity_id == stored.entity_id && v.definition_id == stored.definition_id));
        values.push(stored.clone());
        Ok(stored)
    }

    async fn create_policy(&self, policy: NewPolicy) -> Result<Policy, DatabaseError> {
        let row = Policy {
            id: self.fresh_id(),
            biz_id: policy.biz_id,
            name: policy.name,
            description: policy.description,
            status: policy.status,
            execute_type: policy.execute_type,
            permissions: policy.permissions,
        };
        self.policies.lock().push(row.clone());
        Ok(row)
    }

    async fn create_policy_rule(&self, rule: NewPolicyRuleRow) -> Result<PolicyRuleRow, DatabaseError> {
        let row = PolicyRuleRow {
            id: self.fresh_id(),
            biz_id: rule.biz_id,
            policy_id: rule.policy_id,
            operator: rule.operator,
            left_child: rule.left_child,
            right_child: rule.right_child,
            attr_def_id: rule.attr_def_id,
            value: rule.value,
        };
        self.policy_rules.lock().push(row.clone());
        Ok(row)
    }

    async fn find_policies_by_permission_ids(
        &self,
        biz_id: i64,
        permission_ids: &[i64],
    ) -> Result<Vec<Policy>, DatabaseError> {
        Ok(self
            .policies
            .lock()
            .iter()
            .filter(|p| p.biz_id == biz_id && p.permissions.iter().any(|b| permission_ids.contains(&b.permission_id)))
            .cloned()
            .collect())
    }

    async fn find_policy_rules(&self, biz_id: i64, policy_ids: &[i64]) -> Result<Vec<PolicyRuleRow>, DatabaseError> {
        Ok(self
            .policy_rules
            .lock()
            .iter()
            .filter(|r| r.biz_id == biz_id && policy_ids.contains(&r.policy_id))
            .cloned()
            .collect())
    }

    async fn create_business_config(&self, config: NewBusinessConfig) -> Result<BusinessConfig, DatabaseError> {
        let row = BusinessConfig {
            id: self.fresh_id(),
            owner_id: config.owner_id,
            owner_type: config.owner_type,
            name: config.name,
            rate_limit: config.rate_limit,
            token: config.token,
        };
        self.business_configs.lock().push(row.clone());
        Ok(row)
    }

    async fn find_business_config_by_id(&self, id: i64) -> Result<Option<BusinessConfig>, DatabaseError> {
        Ok(self.business_configs.lock().iter().find(|c| c.id == id).cloned())
    }

    async fn update_business_config(&self, config: BusinessConfig) -> Result<BusinessConfig, DatabaseError> {
        let mut configs = self.business_configs.lock();
        if let Some(existing) = configs.iter_mut().find(|c| c.id == config.id) {
            *existing = config.clone();
        }
        Ok(config)
    }
}

pub struct RecordingSink {
    pub published: Mutex<Vec<PermissionChangeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self { published: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl ChangeEventSink for RecordingSink {
    async fn publish(&self, event: &PermissionChangeEvent) {
        self.published.lock().push(event.clone());
    }
}

pub fn service(repo: FakeRepo) -> (AuthzService, Arc<RecordingSink>) {
    authz_core::telemetry::init();
    let sink = Arc::new(RecordingSink::new());
    let svc = AuthzService::new(AuthzConfig::default(), Arc::new(repo), sink.clone(), None);
    (svc, sink)
}

pub fn service_with_config(repo: FakeRepo, config: AuthzConfig) -> (AuthzService, Arc<RecordingSink>) {
    authz_core::telemetry::init();
    let sink = Arc::new(RecordingSink::new());
    let svc = AuthzService::new(config, Arc::new(repo), sink.clone(), None);
    (svc, sink)
}

pub fn locator(resource_type: &str, key: &str) -> ResourceLocator {
    ResourceLocator { resource_type: resource_type.to_string(), key: key.to_string() }
}

pub fn active_window() -> (DateTime<Utc>, DateTime<Utc>) {
    let now = Utc::now();
    (now - chrono::Duration::hours(1), now + chrono::Duration::hours(1))
}
