//! Typed DAO surface for every entity in the data model (§3), plus the
//! batched id-set lookups the role-expansion resolver (C5), the user-
//! permission assembler (C6) and the cache-invalidating write wrappers (C8)
//! need. One trait, `AuthzRepository`, rather than one trait per entity —
//! every concrete implementation talks to the same pool/transaction, and
//! splitting it up would just mean threading the same `&self` through N
//! objects.

pub mod postgresql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use authz_shared::{
    AttributeDefinition, AttributeValue, BusinessConfig, Permission, Policy, PolicyRuleRow,
    Resource, Role, RoleInclusion, RolePermission, UserPermission, UserRole,
};
use sqlx::PgPool;

use crate::DatabaseError;

pub use postgresql::PostgresRepository;

/// Fields needed to create a `Role`; `id` is assigned by storage.
#[derive(Debug, Clone)]
pub struct NewRole {
    pub biz_id: i64,
    pub role_type: String,
    pub name: String,
    pub description: String,
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewResource {
    pub biz_id: i64,
    pub resource_type: String,
    pub key: String,
    pub name: String,
    pub description: String,
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    pub resource_id: i64,
    pub action: String,
    pub metadata: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewUserRole {
    pub biz_id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRolePermission {
    pub biz_id: i64,
    pub role_id: i64,
    pub permission_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewRoleInclusion {
    pub biz_id: i64,
    pub including_role_id: i64,
    pub included_role_id: i64,
}

#[derive(Debug, Clone)]
pub struct NewUserPermission {
    pub biz_id: i64,
    pub user_id: i64,
    pub permission_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub effect: authz_shared::Effect,
}

#[derive(Debug, Clone)]
pub struct NewAttributeDefinition {
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    pub data_type: authz_shared::DataType,
    pub entity_type: authz_shared::EntityKind,
    pub validation_rule: String,
}

#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    pub status: authz_shared::PolicyStatus,
    pub execute_type: String,
    pub permissions: Vec<authz_shared::PolicyPermissionBinding>,
}

/// Fields needed to create one `PolicyRuleRow`. Leaves are created first (no
/// children yet); internal nodes reference already-created children by id.
#[derive(Debug, Clone)]
pub struct NewPolicyRuleRow {
    pub biz_id: i64,
    pub policy_id: i64,
    pub operator: authz_shared::RuleOperator,
    pub left_child: Option<i64>,
    pub right_child: Option<i64>,
    pub attr_def_id: Option<i64>,
    pub value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBusinessConfig {
    pub owner_id: i64,
    pub owner_type: String,
    pub name: String,
    pub rate_limit: i64,
    pub token: String,
}

/// The three parallel attribute-value relations (§3), distinguished by
/// which kind of entity they attach values to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeEntityKind {
    Subject,
    Resource,
    Environment,
}

#[async_trait]
pub trait AuthzRepository: Send + Sync {
    // Roles
    async fn create_role(&self, role: NewRole) -> Result<Role, DatabaseError>;
    async fn find_role_by_id(&self, biz_id: i64, id: i64) -> Result<Option<Role>, DatabaseError>;
    async fn delete_role(&self, biz_id: i64, id: i64) -> Result<(), DatabaseError>;

    // Resources
    async fn create_resource(&self, resource: NewResource) -> Result<Resource, DatabaseError>;
    async fn find_resource_by_type_key(
        &self,
        biz_id: i64,
        resource_type: &str,
        key: &str,
    ) -> Result<Option<Resource>, DatabaseError>;
    async fn find_resources_by_ids(
        &self,
        biz_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Resource>, DatabaseError>;

    // Permissions
    async fn create_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, DatabaseError>;
    async fn find_permissions_by_resource_and_actions(
        &self,
        biz_id: i64,
        resource_id: i64,
        actions: &[String],
    ) -> Result<Vec<Permission>, DatabaseError>;
    async fn find_permissions_by_ids(
        &self,
        biz_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Permission>, DatabaseError>;

    // UserRole (time-bounded role grants)
    async fn create_user_role(&self, user_role: NewUserRole) -> Result<UserRole, DatabaseError>;
    async fn delete_user_role(&self, biz_id: i64, id: i64) -> Result<Option<UserRole>, DatabaseError>;
    async fn find_active_user_roles(
        &self,
        biz_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserRole>, DatabaseError>;
    async fn find_active_user_roles_by_role_ids(
        &self,
        biz_id: i64,
        role_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<Vec<UserRole>, DatabaseError>;

    // RolePermission
    async fn create_role_permission(
        &self,
        binding: NewRolePermission,
    ) -> Result<RolePermission, DatabaseError>;
    async fn find_role_permissions_by_role_ids(
        &self,
        biz_id: i64,
        role_ids: &[i64],
    ) -> Result<Vec<RolePermission>, DatabaseError>;

    // RoleInclusion (role-inheritance graph edges)
    async fn create_role_inclusion(
        &self,
        inclusion: NewRoleInclusion,
    ) -> Result<RoleInclusion, DatabaseError>;
    async fn delete_role_inclusion(
        &self,
        biz_id: i64,
        id: i64,
    ) -> Result<Option<RoleInclusion>, DatabaseError>;
    async fn find_inclusions_by_including_ids(
        &self,
        biz_id: i64,
        including_ids: &[i64],
    ) -> Result<Vec<RoleInclusion>, DatabaseError>;
    async fn find_inclusions_by_included_ids(
        &self,
        biz_id: i64,
        included_ids: &[i64],
    ) -> Result<Vec<RoleInclusion>, DatabaseError>;

    // UserPermission (direct grants/denials)
    async fn create_user_permission(
        &self,
        permission: NewUserPermission,
    ) -> Result<UserPermission, DatabaseError>;
    async fn delete_user_permission(
        &self,
        biz_id: i64,
        id: i64,
    ) -> Result<Option<UserPermission>, DatabaseError>;
    async fn find_active_user_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserPermission>, DatabaseError>;

    // AttributeDefinition
    async fn create_attribute_definition(
        &self,
        definition: NewAttributeDefinition,
    ) -> Result<AttributeDefinition, DatabaseError>;
    async fn find_attribute_definitions(
        &self,
        biz_id: i64,
    ) -> Result<Vec<AttributeDefinition>, DatabaseError>;

    // AttributeValue, one method pair per parallel relation.
    async fn find_attribute_values(
        &self,
        kind: AttributeEntityKind,
        biz_id: i64,
        entity_id: i64,
    ) -> Result<Vec<AttributeValue>, DatabaseError>;
    async fn upsert_attribute_value(
        &self,
        kind: AttributeEntityKind,
        value: AttributeValue,
    ) -> Result<AttributeValue, DatabaseError>;

    // Policy
    async fn create_policy(&self, policy: NewPolicy) -> Result<Policy, DatabaseError>;
    async fn create_policy_rule(
        &self,
        rule: NewPolicyRuleRow,
    ) -> Result<PolicyRuleRow, DatabaseError>;
    async fn find_policies_by_permission_ids(
        &self,
        biz_id: i64,
        permission_ids: &[i64],
    ) -> Result<Vec<Policy>, DatabaseError>;
    async fn find_policy_rules(
        &self,
        biz_id: i64,
        policy_ids: &[i64],
    ) -> Result<Vec<PolicyRuleRow>, DatabaseError>;

    // BusinessConfig
    async fn create_business_config(
        &self,
        config: NewBusinessConfig,
    ) -> Result<BusinessConfig, DatabaseError>;
    async fn find_business_config_by_id(
        &self,
        id: i64,
    ) -> Result<Option<BusinessConfig>, DatabaseError>;
    async fn update_business_config(
        &self,
        config: BusinessConfig,
    ) -> Result<BusinessConfig, DatabaseError>;
}

/// Builds the single `PostgresRepository` the rest of the engine depends on
/// through `AuthzRepository`. Kept as its own type (rather than exposing the
/// pool directly) so call sites depend on the trait object, matching the
/// teacher's own `RepositoryFactory` pattern.
#[derive(Clone)]
pub struct RepositoryFactory {
    postgres: Arc<PgPool>,
}

impl RepositoryFactory {
    pub fn new(postgres: Arc<PgPool>) -> Self {
        Self { postgres }
    }

    pub fn repository(&self) -> Arc<dyn AuthzRepository> {
        Arc::new(PostgresRepository::new(self.postgres.clone()))
    }
}
