//! Domain entities for the authorization engine (specification §3).
//!
//! Every entity is scoped by `biz_id`; no entity is shared across tenants.
//! These are plain data types — the engine treats them as immutable
//! snapshots within a single `Check` evaluation, so nothing here carries
//! interior mutability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A role grantable to users within one business.
///
/// Identity: `(biz_id, type, name)`. `type` and `name` are immutable after
/// creation — the write path enforces this, not this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: i64,
    pub biz_id: i64,
    #[serde(rename = "type")]
    pub role_type: String,
    pub name: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

/// A protectable resource within one business.
///
/// Identity: `(biz_id, type, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub biz_id: i64,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub key: String,
    pub name: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

impl Resource {
    /// The `(type, key)` pair used to match permissions against a requested
    /// resource, independent of the numeric id.
    pub fn locator(&self) -> ResourceLocator {
        ResourceLocator {
            resource_type: self.resource_type.clone(),
            key: self.key.clone(),
        }
    }
}

/// A `(type, key)` pair identifying a resource without needing its id —
/// this is how inbound `Check` calls and cached permission records both
/// refer to resources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceLocator {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub key: String,
}

/// A single action pinned against one resource.
///
/// Identity: `(biz_id, resource_id, action)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: i64,
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    pub resource_id: i64,
    pub action: String,
    pub metadata: HashMap<String, String>,
}

/// Allow or deny; deny always wins wherever both apply to the same
/// `(resource, action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        matches!(self, Effect::Allow)
    }

    pub fn is_deny(self) -> bool {
        matches!(self, Effect::Deny)
    }
}

/// A time-bounded grant of a role to a user.
///
/// Identity: `(biz_id, user_id, role_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    pub id: i64,
    pub biz_id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl UserRole {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }
}

/// A permission attached to a role.
///
/// Identity: `(biz_id, role_id, permission_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    pub id: i64,
    pub biz_id: i64,
    pub role_id: i64,
    pub permission_id: i64,
}

/// A directed "including inherits from included" edge between two roles.
///
/// Identity: `(biz_id, including_role_id, included_role_id)`. The graph per
/// `biz_id` must be acyclic; read paths defend with a visited set rather
/// than assuming the invariant holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInclusion {
    pub id: i64,
    pub biz_id: i64,
    pub including_role_id: i64,
    pub included_role_id: i64,
}

/// A permission (or explicit denial) granted directly to a user,
/// independent of any role. Time-bounded, like `UserRole`.
///
/// Identity is not separately constrained beyond the surrogate `id` — a user
/// may hold several overlapping grants/denials on the same permission, and
/// deny-precedence resolves the conflict at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    pub id: i64,
    pub biz_id: i64,
    pub user_id: i64,
    pub permission_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub effect: Effect,
}

impl UserPermission {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }
}

/// A `UserPermission` record materialized with resource context, the shape
/// the user-permission assembler (C6) actually hands to deny-precedence
/// scanning — joining in `(resource.type, resource.key, action)` so callers
/// needn't re-fetch the resource/permission rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermission {
    pub permission_id: i64,
    pub resource: ResourceLocator,
    pub action: String,
    pub effect: Effect,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl EffectivePermission {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_time <= now && now <= self.end_time
    }

    pub fn matches(&self, resource: &ResourceLocator, action: &str) -> bool {
        &self.resource == resource && self.action == action
    }
}

/// The data type an attribute's string-encoded value decodes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Number,
    Float,
    Boolean,
    Datetime,
    Array,
}

/// Which kind of entity an attribute is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Subject,
    Resource,
    Environment,
}

/// Defines one ABAC attribute: its data type, which entity kind it attaches
/// to, and the regex every stored value must satisfy.
///
/// Identity: `(biz_id, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub id: i64,
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    pub data_type: DataType,
    pub entity_type: EntityKind,
    pub validation_rule: String,
}

/// One string-encoded attribute value bound to one entity.
///
/// Identity: `(biz_id, entity_id, definition_id)`. Stored in three parallel
/// relations keyed by entity kind (subject/resource/environment); this type
/// is the shared shape for all three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: i64,
    pub biz_id: i64,
    pub entity_id: i64,
    pub definition_id: i64,
    pub value: String,
}

/// Whether a policy is currently enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyStatus {
    Active,
    Inactive,
}

/// One `{permission, effect}` binding of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPermissionBinding {
    pub permission_id: i64,
    pub effect: Effect,
}

/// A named rule tree attached to one or more permissions with an effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    pub biz_id: i64,
    pub name: String,
    pub description: String,
    pub status: PolicyStatus,
    pub execute_type: String,
    pub permissions: Vec<PolicyPermissionBinding>,
}

/// The operator at an internal `PolicyRule` node, or the comparison at a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleOperator {
    // Internal combinators.
    And,
    Or,
    Not,
    // Leaf comparisons.
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    AnyMatch,
    AllMatch,
}

impl RuleOperator {
    pub fn is_internal(self) -> bool {
        matches!(self, RuleOperator::And | RuleOperator::Or | RuleOperator::Not)
    }
}

/// One node of a policy's binary rule tree, as persisted: flat rows with
/// `left_child`/`right_child` id pointers. A leaf has both children `None`
/// and carries `attr_def_id` + `value`; an internal node has `operator` in
/// `{AND, OR, NOT}` and at least a `right_child` (`NOT` ignores `left_child`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRuleRow {
    pub id: i64,
    pub biz_id: i64,
    pub policy_id: i64,
    pub operator: RuleOperator,
    pub left_child: Option<i64>,
    pub right_child: Option<i64>,
    pub attr_def_id: Option<i64>,
    pub value: Option<String>,
}

impl PolicyRuleRow {
    pub fn is_leaf(&self) -> bool {
        self.left_child.is_none() && self.right_child.is_none()
    }
}

/// A reconstructed policy rule tree node, built from the flat `PolicyRuleRow`
/// storage representation by the policy executor (C3) before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyRuleNode {
    Leaf {
        attr_def_id: i64,
        operator: RuleOperator,
        value: String,
    },
    Internal {
        operator: RuleOperator,
        left: Option<Box<PolicyRuleNode>>,
        right: Option<Box<PolicyRuleNode>>,
    },
}

/// A tenant registration: who owns this business, its rate limit, and the
/// opaque bearer token minted for it. Token issuance itself is out of this
/// engine's scope — the token column is stored and returned verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessConfig {
    pub id: i64,
    pub owner_id: i64,
    pub owner_type: String,
    pub name: String,
    pub rate_limit: i64,
    pub token: String,
}

/// A `{biz_id, user_id}` pair — the unit of cache invalidation and the
/// element type of the hot-user list (C10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey {
    pub biz_id: i64,
    pub user_id: i64,
}
