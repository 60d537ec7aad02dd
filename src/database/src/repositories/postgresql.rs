//! `sqlx`-backed implementation of `AuthzRepository`.
//!
//! Reference DDL lives in `SCHEMA_SQL` below: one table per §3 entity,
//! `biz_id` always part of the relevant unique index. No migration
//! framework is wired up (out of scope, §10.4) — a caller that wants a live
//! schema applies `SCHEMA_SQL` directly, e.g. in an integration test's setup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use authz_shared::{
    AttributeDefinition, AttributeValue, BusinessConfig, DataType, Effect, EntityKind, Permission,
    Policy, PolicyPermissionBinding, PolicyRuleRow, PolicyStatus, Resource, Role, RoleInclusion,
    RolePermission, RuleOperator, UserPermission, UserRole,
};

use super::{
    AttributeEntityKind, AuthzRepository, NewAttributeDefinition, NewBusinessConfig, NewPermission,
    NewPolicy, NewPolicyRuleRow, NewResource, NewRole, NewRoleInclusion, NewRolePermission,
    NewUserPermission, NewUserRole,
};
use crate::DatabaseError;

/// Reference schema for the entities in §3. Not applied automatically.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS roles (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    role_type TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    metadata JSONB NOT NULL DEFAULT '{}',
    UNIQUE (biz_id, role_type, name)
);

CREATE TABLE IF NOT EXISTS resources (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    resource_type TEXT NOT NULL,
    key TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    metadata JSONB NOT NULL DEFAULT '{}',
    UNIQUE (biz_id, resource_type, key)
);

CREATE TABLE IF NOT EXISTS permissions (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    resource_id BIGINT NOT NULL REFERENCES resources (id),
    action TEXT NOT NULL,
    metadata JSONB NOT NULL DEFAULT '{}',
    UNIQUE (biz_id, resource_id, action)
);

CREATE TABLE IF NOT EXISTS user_roles (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    role_id BIGINT NOT NULL REFERENCES roles (id),
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    UNIQUE (biz_id, user_id, role_id)
);

CREATE TABLE IF NOT EXISTS role_permissions (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    role_id BIGINT NOT NULL REFERENCES roles (id),
    permission_id BIGINT NOT NULL REFERENCES permissions (id),
    UNIQUE (biz_id, role_id, permission_id)
);

CREATE TABLE IF NOT EXISTS role_inclusions (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    including_role_id BIGINT NOT NULL REFERENCES roles (id),
    included_role_id BIGINT NOT NULL REFERENCES roles (id),
    UNIQUE (biz_id, including_role_id, included_role_id)
);

CREATE TABLE IF NOT EXISTS user_permissions (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    user_id BIGINT NOT NULL,
    permission_id BIGINT NOT NULL REFERENCES permissions (id),
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ NOT NULL,
    effect TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attribute_definitions (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    data_type TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    validation_rule TEXT NOT NULL DEFAULT '',
    UNIQUE (biz_id, name)
);

CREATE TABLE IF NOT EXISTS subject_attribute_values (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    entity_id BIGINT NOT NULL,
    definition_id BIGINT NOT NULL REFERENCES attribute_definitions (id),
    value TEXT NOT NULL,
    UNIQUE (biz_id, entity_id, definition_id)
);

CREATE TABLE IF NOT EXISTS resource_attribute_values (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    entity_id BIGINT NOT NULL,
    definition_id BIGINT NOT NULL REFERENCES attribute_definitions (id),
    value TEXT NOT NULL,
    UNIQUE (biz_id, entity_id, definition_id)
);

CREATE TABLE IF NOT EXISTS environment_attribute_values (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    entity_id BIGINT NOT NULL,
    definition_id BIGINT NOT NULL REFERENCES attribute_definitions (id),
    value TEXT NOT NULL,
    UNIQUE (biz_id, entity_id, definition_id)
);

CREATE TABLE IF NOT EXISTS policies (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    execute_type TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS policy_permissions (
    policy_id BIGINT NOT NULL REFERENCES policies (id),
    permission_id BIGINT NOT NULL REFERENCES permissions (id),
    effect TEXT NOT NULL,
    PRIMARY KEY (policy_id, permission_id)
);

CREATE TABLE IF NOT EXISTS policy_rules (
    id BIGSERIAL PRIMARY KEY,
    biz_id BIGINT NOT NULL,
    policy_id BIGINT NOT NULL REFERENCES policies (id),
    operator TEXT NOT NULL,
    left_child BIGINT,
    right_child BIGINT,
    attr_def_id BIGINT REFERENCES attribute_definitions (id),
    value TEXT
);

CREATE TABLE IF NOT EXISTS business_configs (
    id BIGSERIAL PRIMARY KEY,
    owner_id BIGINT NOT NULL,
    owner_type TEXT NOT NULL,
    name TEXT NOT NULL,
    rate_limit BIGINT NOT NULL,
    token TEXT NOT NULL
);
"#;

fn effect_to_str(effect: Effect) -> &'static str {
    match effect {
        Effect::Allow => "ALLOW",
        Effect::Deny => "DENY",
    }
}

fn effect_from_str(s: &str) -> Result<Effect, DatabaseError> {
    match s {
        "ALLOW" => Ok(Effect::Allow),
        "DENY" => Ok(Effect::Deny),
        other => Err(DatabaseError::Validation(format!("unknown effect: {other}"))),
    }
}

fn data_type_to_str(data_type: DataType) -> &'static str {
    match data_type {
        DataType::String => "string",
        DataType::Number => "number",
        DataType::Float => "float",
        DataType::Boolean => "boolean",
        DataType::Datetime => "datetime",
        DataType::Array => "array",
    }
}

fn data_type_from_str(s: &str) -> Result<DataType, DatabaseError> {
    match s {
        "string" => Ok(DataType::String),
        "number" => Ok(DataType::Number),
        "float" => Ok(DataType::Float),
        "boolean" => Ok(DataType::Boolean),
        "datetime" => Ok(DataType::Datetime),
        "array" => Ok(DataType::Array),
        other => Err(DatabaseError::Validation(format!("unknown data type: {other}"))),
    }
}

fn entity_kind_to_str(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Subject => "subject",
        EntityKind::Resource => "resource",
        EntityKind::Environment => "environment",
    }
}

fn entity_kind_from_str(s: &str) -> Result<EntityKind, DatabaseError> {
    match s {
        "subject" => Ok(EntityKind::Subject),
        "resource" => Ok(EntityKind::Resource),
        "environment" => Ok(EntityKind::Environment),
        other => Err(DatabaseError::Validation(format!("unknown entity kind: {other}"))),
    }
}

fn policy_status_to_str(status: PolicyStatus) -> &'static str {
    match status {
        PolicyStatus::Active => "ACTIVE",
        PolicyStatus::Inactive => "INACTIVE",
    }
}

fn policy_status_from_str(s: &str) -> Result<PolicyStatus, DatabaseError> {
    match s {
        "ACTIVE" => Ok(PolicyStatus::Active),
        "INACTIVE" => Ok(PolicyStatus::Inactive),
        other => Err(DatabaseError::Validation(format!("unknown policy status: {other}"))),
    }
}

fn rule_operator_to_str(op: RuleOperator) -> &'static str {
    match op {
        RuleOperator::And => "AND",
        RuleOperator::Or => "OR",
        RuleOperator::Not => "NOT",
        RuleOperator::Eq => "EQ",
        RuleOperator::Ne => "NE",
        RuleOperator::Lt => "LT",
        RuleOperator::Le => "LE",
        RuleOperator::Gt => "GT",
        RuleOperator::Ge => "GE",
        RuleOperator::In => "IN",
        RuleOperator::NotIn => "NOT_IN",
        RuleOperator::AnyMatch => "ANY_MATCH",
        RuleOperator::AllMatch => "ALL_MATCH",
    }
}

fn rule_operator_from_str(s: &str) -> Result<RuleOperator, DatabaseError> {
    match s {
        "AND" => Ok(RuleOperator::And),
        "OR" => Ok(RuleOperator::Or),
        "NOT" => Ok(RuleOperator::Not),
        "EQ" => Ok(RuleOperator::Eq),
        "NE" => Ok(RuleOperator::Ne),
        "LT" => Ok(RuleOperator::Lt),
        "LE" => Ok(RuleOperator::Le),
        "GT" => Ok(RuleOperator::Gt),
        "GE" => Ok(RuleOperator::Ge),
        "IN" => Ok(RuleOperator::In),
        "NOT_IN" => Ok(RuleOperator::NotIn),
        "ANY_MATCH" => Ok(RuleOperator::AnyMatch),
        "ALL_MATCH" => Ok(RuleOperator::AllMatch),
        other => Err(DatabaseError::Validation(format!("unknown rule operator: {other}"))),
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: i64,
    biz_id: i64,
    role_type: String,
    name: String,
    description: String,
    metadata: Json<HashMap<String, String>>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            biz_id: row.biz_id,
            role_type: row.role_type,
            name: row.name,
            description: row.description,
            metadata: row.metadata.0,
        }
    }
}

#[derive(FromRow)]
struct ResourceRow {
    id: i64,
    biz_id: i64,
    resource_type: String,
    key: String,
    name: String,
    description: String,
    metadata: Json<HashMap<String, String>>,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        Resource {
            id: row.id,
            biz_id: row.biz_id,
            resource_type: row.resource_type,
            key: row.key,
            name: row.name,
            description: row.description,
            metadata: row.metadata.0,
        }
    }
}

#[derive(FromRow)]
struct PermissionRow {
    id: i64,
    biz_id: i64,
    name: String,
    description: String,
    resource_id: i64,
    action: String,
    metadata: Json<HashMap<String, String>>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission {
            id: row.id,
            biz_id: row.biz_id,
            name: row.name,
            description: row.description,
            resource_id: row.resource_id,
            action: row.action,
            metadata: row.metadata.0,
        }
    }
}

#[derive(FromRow)]
struct UserRoleRow {
    id: i64,
    biz_id: i64,
    user_id: i64,
    role_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
}

impl From<UserRoleRow> for UserRole {
    fn from(row: UserRoleRow) -> Self {
        UserRole {
            id: row.id,
            biz_id: row.biz_id,
            user_id: row.user_id,
            role_id: row.role_id,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}

#[derive(FromRow)]
struct RolePermissionRow {
    id: i64,
    biz_id: i64,
    role_id: i64,
    permission_id: i64,
}

impl From<RolePermissionRow> for RolePermission {
    fn from(row: RolePermissionRow) -> Self {
        RolePermission {
            id: row.id,
            biz_id: row.biz_id,
            role_id: row.role_id,
            permission_id: row.permission_id,
        }
    }
}

#[derive(FromRow)]
struct RoleInclusionRow {
    id: i64,
    biz_id: i64,
    including_role_id: i64,
    included_role_id: i64,
}

impl From<RoleInclusionRow> for RoleInclusion {
    fn from(row: RoleInclusionRow) -> Self {
        RoleInclusion {
            id: row.id,
            biz_id: row.biz_id,
            including_role_id: row.including_role_id,
            included_role_id: row.included_role_id,
        }
    }
}

#[derive(FromRow)]
struct UserPermissionRow {
    id: i64,
    biz_id: i64,
    user_id: i64,
    permission_id: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    effect: String,
}

impl TryFrom<UserPermissionRow> for UserPermission {
    type Error = DatabaseError;

    fn try_from(row: UserPermissionRow) -> Result<Self, Self::Error> {
        Ok(UserPermission {
            id: row.id,
            biz_id: row.biz_id,
            user_id: row.user_id,
            permission_id: row.permission_id,
            start_time: row.start_time,
            end_time: row.end_time,
            effect: effect_from_str(&row.effect)?,
        })
    }
}

#[derive(FromRow)]
struct AttributeDefinitionRow {
    id: i64,
    biz_id: i64,
    name: String,
    description: String,
    data_type: String,
    entity_type: String,
    validation_rule: String,
}

impl TryFrom<AttributeDefinitionRow> for AttributeDefinition {
    type Error = DatabaseError;

    fn try_from(row: AttributeDefinitionRow) -> Result<Self, Self::Error> {
        Ok(AttributeDefinition {
            id: row.id,
            biz_id: row.biz_id,
            name: row.name,
            description: row.description,
            data_type: data_type_from_str(&row.data_type)?,
            entity_type: entity_kind_from_str(&row.entity_type)?,
            validation_rule: row.validation_rule,
        })
    }
}

#[derive(FromRow)]
struct AttributeValueRow {
    id: i64,
    biz_id: i64,
    entity_id: i64,
    definition_id: i64,
    value: String,
}

impl From<AttributeValueRow> for AttributeValue {
    fn from(row: AttributeValueRow) -> Self {
        AttributeValue {
            id: row.id,
            biz_id: row.biz_id,
            entity_id: row.entity_id,
            definition_id: row.definition_id,
            value: row.value,
        }
    }
}

#[derive(FromRow)]
struct PolicyRow {
    id: i64,
    biz_id: i64,
    name: String,
    description: String,
    status: String,
    execute_type: String,
}

#[derive(FromRow)]
struct PolicyPermissionRow {
    policy_id: i64,
    permission_id: i64,
    effect: String,
}

#[derive(FromRow)]
struct PolicyRuleRowRecord {
    id: i64,
    biz_id: i64,
    policy_id: i64,
    operator: String,
    left_child: Option<i64>,
    right_child: Option<i64>,
    attr_def_id: Option<i64>,
    value: Option<String>,
}

impl TryFrom<PolicyRuleRowRecord> for PolicyRuleRow {
    type Error = DatabaseError;

    fn try_from(row: PolicyRuleRowRecord) -> Result<Self, Self::Error> {
        Ok(PolicyRuleRow {
            id: row.id,
            biz_id: row.biz_id,
            policy_id: row.policy_id,
            operator: rule_operator_from_str(&row.operator)?,
            left_child: row.left_child,
            right_child: row.right_child,
            attr_def_id: row.attr_def_id,
            value: row.value,
        })
    }
}

#[derive(FromRow)]
struct BusinessConfigRow {
    id: i64,
    owner_id: i64,
    owner_type: String,
    name: String,
    rate_limit: i64,
    token: String,
}

impl From<BusinessConfigRow> for BusinessConfig {
    fn from(row: BusinessConfigRow) -> Self {
        BusinessConfig {
            id: row.id,
            owner_id: row.owner_id,
            owner_type: row.owner_type,
            name: row.name,
            rate_limit: row.rate_limit,
            token: row.token,
        }
    }
}

/// The single concrete `AuthzRepository`, backed by one `sqlx::PgPool`.
pub struct PostgresRepository {
    pool: Arc<PgPool>,
}

impl PostgresRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }
}

#[async_trait]
impl AuthzRepository for PostgresRepository {
    async fn create_role(&self, role: NewRole) -> Result<Role, DatabaseError> {
        let row = sqlx::query_as::<_, RoleRow>(
            "INSERT INTO roles (biz_id, role_type, name, description, metadata)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, biz_id, role_type, name, description, metadata",
        )
        .bind(role.biz_id)
        .bind(role.role_type)
        .bind(role.name)
        .bind(role.description)
        .bind(Json(role.metadata))
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_role_by_id(&self, biz_id: i64, id: i64) -> Result<Option<Role>, DatabaseError> {
        let row = sqlx::query_as::<_, RoleRow>(
            "SELECT id, biz_id, role_type, name, description, metadata
             FROM roles WHERE biz_id = $1 AND id = $2",
        )
        .bind(biz_id)
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn delete_role(&self, biz_id: i64, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM roles WHERE biz_id = $1 AND id = $2")
            .bind(biz_id)
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn create_resource(&self, resource: NewResource) -> Result<Resource, DatabaseError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            "INSERT INTO resources (biz_id, resource_type, key, name, description, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, biz_id, resource_type, key, name, description, metadata",
        )
        .bind(resource.biz_id)
        .bind(resource.resource_type)
        .bind(resource.key)
        .bind(resource.name)
        .bind(resource.description)
        .bind(Json(resource.metadata))
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_resource_by_type_key(
        &self,
        biz_id: i64,
        resource_type: &str,
        key: &str,
    ) -> Result<Option<Resource>, DatabaseError> {
        let row = sqlx::query_as::<_, ResourceRow>(
            "SELECT id, biz_id, resource_type, key, name, description, metadata
             FROM resources WHERE biz_id = $1 AND resource_type = $2 AND key = $3",
        )
        .bind(biz_id)
        .bind(resource_type)
        .bind(key)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_resources_by_ids(
        &self,
        biz_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Resource>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, ResourceRow>(
            "SELECT id, biz_id, resource_type, key, name, description, metadata
             FROM resources WHERE biz_id = $1 AND id = ANY($2)",
        )
        .bind(biz_id)
        .bind(ids)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, DatabaseError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            "INSERT INTO permissions (biz_id, name, description, resource_id, action, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, biz_id, name, description, resource_id, action, metadata",
        )
        .bind(permission.biz_id)
        .bind(permission.name)
        .bind(permission.description)
        .bind(permission.resource_id)
        .bind(permission.action)
        .bind(Json(permission.metadata))
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_permissions_by_resource_and_actions(
        &self,
        biz_id: i64,
        resource_id: i64,
        actions: &[String],
    ) -> Result<Vec<Permission>, DatabaseError> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT id, biz_id, name, description, resource_id, action, metadata
             FROM permissions
             WHERE biz_id = $1 AND resource_id = $2 AND action = ANY($3)",
        )
        .bind(biz_id)
        .bind(resource_id)
        .bind(actions)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_permissions_by_ids(
        &self,
        biz_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Permission>, DatabaseError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PermissionRow>(
            "SELECT id, biz_id, name, description, resource_id, action, metadata
             FROM permissions WHERE biz_id = $1 AND id = ANY($2)",
        )
        .bind(biz_id)
        .bind(ids)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_user_role(&self, user_role: NewUserRole) -> Result<UserRole, DatabaseError> {
        let row = sqlx::query_as::<_, UserRoleRow>(
            "INSERT INTO user_roles (biz_id, user_id, role_id, start_time, end_time)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, biz_id, user_id, role_id, start_time, end_time",
        )
        .bind(user_role.biz_id)
        .bind(user_role.user_id)
        .bind(user_role.role_id)
        .bind(user_role.start_time)
        .bind(user_role.end_time)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }

    async fn delete_user_role(
        &self,
        biz_id: i64,
        id: i64,
    ) -> Result<Option<UserRole>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRoleRow>(
            "DELETE FROM user_roles WHERE biz_id = $1 AND id = $2
             RETURNING id, biz_id, user_id, role_id, start_time, end_time",
        )
        .bind(biz_id)
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_active_user_roles(
        &self,
        biz_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserRole>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserRoleRow>(
            "SELECT id, biz_id, user_id, role_id, start_time, end_time
             FROM user_roles
             WHERE biz_id = $1 AND user_id = $2 AND start_time <= $3 AND end_time >= $3",
        )
        .bind(biz_id)
        .bind(user_id)
        .bind(now)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_active_user_roles_by_role_ids(
        &self,
        biz_id: i64,
        role_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<Vec<UserRole>, DatabaseError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, UserRoleRow>(
            "SELECT id, biz_id, user_id, role_id, start_time, end_time
             FROM user_roles
             WHERE biz_id = $1 AND role_id = ANY($2) AND start_time <= $3 AND end_time >= $3",
        )
        .bind(biz_id)
        .bind(role_ids)
        .bind(now)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_role_permission(
        &self,
        binding: NewRolePermission,
    ) -> Result<RolePermission, DatabaseError> {
        let row = sqlx::query_as::<_, RolePermissionRow>(
            "INSERT INTO role_permissions (biz_id, role_id, permission_id)
             VALUES ($1, $2, $3)
             RETURNING id, biz_id, role_id, permission_id",
        )
        .bind(binding.biz_id)
        .bind(binding.role_id)
        .bind(binding.permission_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_role_permissions_by_role_ids(
        &self,
        biz_id: i64,
        role_ids: &[i64],
    ) -> Result<Vec<RolePermission>, DatabaseError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, RolePermissionRow>(
            "SELECT id, biz_id, role_id, permission_id
             FROM role_permissions WHERE biz_id = $1 AND role_id = ANY($2)",
        )
        .bind(biz_id)
        .bind(role_ids)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_role_inclusion(
        &self,
        inclusion: NewRoleInclusion,
    ) -> Result<RoleInclusion, DatabaseError> {
        let row = sqlx::query_as::<_, RoleInclusionRow>(
            "INSERT INTO role_inclusions (biz_id, including_role_id, included_role_id)
             VALUES ($1, $2, $3)
             RETURNING id, biz_id, including_role_id, included_role_id",
        )
        .bind(inclusion.biz_id)
        .bind(inclusion.including_role_id)
        .bind(inclusion.included_role_id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }

    async fn delete_role_inclusion(
        &self,
        biz_id: i64,
        id: i64,
    ) -> Result<Option<RoleInclusion>, DatabaseError> {
        let row = sqlx::query_as::<_, RoleInclusionRow>(
            "DELETE FROM role_inclusions WHERE biz_id = $1 AND id = $2
             RETURNING id, biz_id, including_role_id, included_role_id",
        )
        .bind(biz_id)
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_inclusions_by_including_ids(
        &self,
        biz_id: i64,
        including_ids: &[i64],
    ) -> Result<Vec<RoleInclusion>, DatabaseError> {
        if including_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, RoleInclusionRow>(
            "SELECT id, biz_id, including_role_id, included_role_id
             FROM role_inclusions WHERE biz_id = $1 AND including_role_id = ANY($2)",
        )
        .bind(biz_id)
        .bind(including_ids)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_inclusions_by_included_ids(
        &self,
        biz_id: i64,
        included_ids: &[i64],
    ) -> Result<Vec<RoleInclusion>, DatabaseError> {
        if included_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, RoleInclusionRow>(
            "SELECT id, biz_id, including_role_id, included_role_id
             FROM role_inclusions WHERE biz_id = $1 AND included_role_id = ANY($2)",
        )
        .bind(biz_id)
        .bind(included_ids)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_user_permission(
        &self,
        permission: NewUserPermission,
    ) -> Result<UserPermission, DatabaseError> {
        let row = sqlx::query_as::<_, UserPermissionRow>(
            "INSERT INTO user_permissions
                (biz_id, user_id, permission_id, start_time, end_time, effect)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, biz_id, user_id, permission_id, start_time, end_time, effect",
        )
        .bind(permission.biz_id)
        .bind(permission.user_id)
        .bind(permission.permission_id)
        .bind(permission.start_time)
        .bind(permission.end_time)
        .bind(effect_to_str(permission.effect))
        .fetch_one(&*self.pool)
        .await?;

        row.try_into()
    }

    async fn delete_user_permission(
        &self,
        biz_id: i64,
        id: i64,
    ) -> Result<Option<UserPermission>, DatabaseError> {
        let row = sqlx::query_as::<_, UserPermissionRow>(
            "DELETE FROM user_permissions WHERE biz_id = $1 AND id = $2
             RETURNING id, biz_id, user_id, permission_id, start_time, end_time, effect",
        )
        .bind(biz_id)
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_active_user_permissions(
        &self,
        biz_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserPermission>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserPermissionRow>(
            "SELECT id, biz_id, user_id, permission_id, start_time, end_time, effect
             FROM user_permissions
             WHERE biz_id = $1 AND user_id = $2 AND start_time <= $3 AND end_time >= $3",
        )
        .bind(biz_id)
        .bind(user_id)
        .bind(now)
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_attribute_definition(
        &self,
        definition: NewAttributeDefinition,
    ) -> Result<AttributeDefinition, DatabaseError> {
        let row = sqlx::query_as::<_, AttributeDefinitionRow>(
            "INSERT INTO attribute_definitions
                (biz_id, name, description, data_type, entity_type, validation_rule)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, biz_id, name, description, data_type, entity_type, validation_rule",
        )
        .bind(definition.biz_id)
        .bind(definition.name)
        .bind(definition.description)
        .bind(data_type_to_str(definition.data_type))
        .bind(entity_kind_to_str(definition.entity_type))
        .bind(definition.validation_rule)
        .fetch_one(&*self.pool)
        .await?;

        row.try_into()
    }

    async fn find_attribute_definitions(
        &self,
        biz_id: i64,
    ) -> Result<Vec<AttributeDefinition>, DatabaseError> {
        let rows = sqlx::query_as::<_, AttributeDefinitionRow>(
            "SELECT id, biz_id, name, description, data_type, entity_type, validation_rule
             FROM attribute_definitions WHERE biz_id = $1",
        )
        .bind(biz_id)
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_attribute_values(
        &self,
        kind: AttributeEntityKind,
        biz_id: i64,
        entity_id: i64,
    ) -> Result<Vec<AttributeValue>, DatabaseError> {
        let table = attribute_table_name(kind);
        let query = format!(
            "SELECT id, biz_id, entity_id, definition_id, value FROM {table}
             WHERE biz_id = $1 AND entity_id = $2"
        );

        let rows = sqlx::query_as::<_, AttributeValueRow>(&query)
            .bind(biz_id)
            .bind(entity_id)
            .fetch_all(&*self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert_attribute_value(
        &self,
        kind: AttributeEntityKind,
        value: AttributeValue,
    ) -> Result<AttributeValue, DatabaseError> {
        let table = attribute_table_name(kind);
        let query = format!(
            "INSERT INTO {table} (biz_id, entity_id, definition_id, value)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (biz_id, entity_id, definition_id) DO UPDATE SET value = EXCLUDED.value
             RETURNING id, biz_id, entity_id, definition_id, value"
        );

        let row = sqlx::query_as::<_, AttributeValueRow>(&query)
            .bind(value.biz_id)
            .bind(value.entity_id)
            .bind(value.definition_id)
            .bind(value.value)
            .fetch_one(&*self.pool)
            .await?;

        Ok(row.into())
    }

    async fn create_policy(&self, policy: NewPolicy) -> Result<Policy, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, PolicyRow>(
            "INSERT INTO policies (biz_id, name, description, status, execute_type)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, biz_id, name, description, status, execute_type",
        )
        .bind(policy.biz_id)
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(policy_status_to_str(policy.status))
        .bind(&policy.execute_type)
        .fetch_one(&mut *tx)
        .await?;

        for binding in &policy.permissions {
            sqlx::query(
                "INSERT INTO policy_permissions (policy_id, permission_id, effect) VALUES ($1, $2, $3)",
            )
            .bind(row.id)
            .bind(binding.permission_id)
            .bind(effect_to_str(binding.effect))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Policy {
            id: row.id,
            biz_id: row.biz_id,
            name: row.name,
            description: row.description,
            status: policy_status_from_str(&row.status)?,
            execute_type: row.execute_type,
            permissions: policy.permissions,
        })
    }

    async fn create_policy_rule(
        &self,
        rule: NewPolicyRuleRow,
    ) -> Result<PolicyRuleRow, DatabaseError> {
        let row = sqlx::query_as::<_, PolicyRuleRowRecord>(
            "INSERT INTO policy_rules (biz_id, policy_id, operator, left_child, right_child, attr_def_id, value)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id, biz_id, policy_id, operator, left_child, right_child, attr_def_id, value",
        )
        .bind(rule.biz_id)
        .bind(rule.policy_id)
        .bind(rule_operator_to_str(rule.operator))
        .bind(rule.left_child)
        .bind(rule.right_child)
        .bind(rule.attr_def_id)
        .bind(rule.value)
        .fetch_one(&*self.pool)
        .await?;

        row.try_into()
    }

    async fn find_policies_by_permission_ids(
        &self,
        biz_id: i64,
        permission_ids: &[i64],
    ) -> Result<Vec<Policy>, DatabaseError> {
        if permission_ids.is_empty() {
            return Ok(Vec::new());
        }

        let policy_rows = sqlx::query_as::<_, PolicyRow>(
            "SELECT DISTINCT p.id, p.biz_id, p.name, p.description, p.status, p.execute_type
             FROM policies p
             JOIN policy_permissions pp ON pp.policy_id = p.id
             WHERE p.biz_id = $1 AND pp.permission_id = ANY($2) AND p.status = 'ACTIVE'",
        )
        .bind(biz_id)
        .bind(permission_ids)
        .fetch_all(&*self.pool)
        .await?;

        if policy_rows.is_empty() {
            return Ok(Vec::new());
        }

        let policy_ids: Vec<i64> = policy_rows.iter().map(|r| r.id).collect();
        let binding_rows = sqlx::query_as::<_, PolicyPermissionRow>(
            "SELECT policy_id, permission_id, effect
             FROM policy_permissions WHERE policy_id = ANY($1)",
        )
        .bind(&policy_ids)
        .fetch_all(&*self.pool)
        .await?;

        let mut policies = Vec::with_capacity(policy_rows.len());
        for row in policy_rows {
            let permissions = binding_rows
                .iter()
                .filter(|b| b.policy_id == row.id)
                .map(|b| {
                    Ok(PolicyPermissionBinding {
                        permission_id: b.permission_id,
                        effect: effect_from_str(&b.effect)?,
                    })
                })
                .collect::<Result<Vec<_>, DatabaseError>>()?;

            policies.push(Policy {
                id: row.id,
                biz_id: row.biz_id,
                name: row.name,
                description: row.description,
                status: policy_status_from_str(&row.status)?,
                execute_type: row.execute_type,
                permissions,
            });
        }

        Ok(policies)
    }

    async fn find_policy_rules(
        &self,
        biz_id: i64,
        policy_ids: &[i64],
    ) -> Result<Vec<PolicyRuleRow>, DatabaseError> {
        if policy_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, PolicyRuleRowRecord>(
            "SELECT id, biz_id, policy_id, operator, left_child, right_child, attr_def_id, value
             FROM policy_rules WHERE biz_id = $1 AND policy_id = ANY($2)",
        )
        .bind(biz_id)
        .bind(policy_ids)
        .fetch_all(&*self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_business_config(
        &self,
        config: NewBusinessConfig,
    ) -> Result<BusinessConfig, DatabaseError> {
        let row = sqlx::query_as::<_, BusinessConfigRow>(
            "INSERT INTO business_configs (owner_id, owner_type, name, rate_limit, token)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, owner_id, owner_type, name, rate_limit, token",
        )
        .bind(config.owner_id)
        .bind(config.owner_type)
        .bind(config.name)
        .bind(config.rate_limit)
        .bind(config.token)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }

    async fn find_business_config_by_id(
        &self,
        id: i64,
    ) -> Result<Option<BusinessConfig>, DatabaseError> {
        let row = sqlx::query_as::<_, BusinessConfigRow>(
            "SELECT id, owner_id, owner_type, name, rate_limit, token
             FROM business_configs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_business_config(
        &self,
        config: BusinessConfig,
    ) -> Result<BusinessConfig, DatabaseError> {
        let row = sqlx::query_as::<_, BusinessConfigRow>(
            "UPDATE business_configs
             SET owner_id = $2, owner_type = $3, name = $4, rate_limit = $5, token = $6
             WHERE id = $1
             RETURNING id, owner_id, owner_type, name, rate_limit, token",
        )
        .bind(config.id)
        .bind(config.owner_id)
        .bind(config.owner_type)
        .bind(config.name)
        .bind(config.rate_limit)
        .bind(config.token)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row.into())
    }
}

fn attribute_table_name(kind: AttributeEntityKind) -> &'static str {
    match kind {
        AttributeEntityKind::Subject => "subject_attribute_values",
        AttributeEntityKind::Resource => "resource_attribute_values",
        AttributeEntityKind::Environment => "environment_attribute_values",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_round_trips_through_storage_encoding() {
        assert_eq!(effect_from_str(effect_to_str(Effect::Allow)).unwrap(), Effect::Allow);
        assert_eq!(effect_from_str(effect_to_str(Effect::Deny)).unwrap(), Effect::Deny);
    }

    #[test]
    fn rejects_unknown_effect_encoding() {
        assert!(effect_from_str("MAYBE").is_err());
    }

    #[test]
    fn rule_operator_round_trips_through_storage_encoding() {
        for op in [
            RuleOperator::And,
            RuleOperator::Or,
            RuleOperator::Not,
            RuleOperator::Eq,
            RuleOperator::AnyMatch,
            RuleOperator::AllMatch,
        ] {
            assert_eq!(rule_operator_from_str(rule_operator_to_str(op)).unwrap(), op);
        }
    }

    #[test]
    fn attribute_table_name_is_distinct_per_entity_kind() {
        let subject = attribute_table_name(AttributeEntityKind::Subject);
        let resource = attribute_table_name(AttributeEntityKind::Resource);
        let environment = attribute_table_name(AttributeEntityKind::Environment);
        assert_ne!(subject, resource);
        assert_ne!(resource, environment);
    }
}
