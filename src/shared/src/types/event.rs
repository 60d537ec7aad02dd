//! Change-event wire format published by the cache-invalidating write
//! wrappers (C8) whenever a user's effective permissions change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::entity::{Effect, ResourceLocator};

/// One entry in a `PermissionChangeEvent`'s permission list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPermission {
    pub resource: ResourceLocator,
    pub action: String,
    pub effect: Effect,
}

/// A single user's refreshed permission set, as published on the event sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermissionChange {
    pub user_id: i64,
    pub biz_id: i64,
    pub permissions: Vec<ChangedPermission>,
}

/// The wire format for a permission-change event: `{"permissions": {user_id:
/// {...}}}`, matching the specification's change-event format exactly so a
/// downstream CDC/audit consumer (out of this engine's scope) can decode it
/// without engine-specific knowledge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionChangeEvent {
    pub permissions: HashMap<String, UserPermissionChange>,
}

impl PermissionChangeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, change: UserPermissionChange) {
        self.permissions.insert(change.user_id.to_string(), change);
    }
}
