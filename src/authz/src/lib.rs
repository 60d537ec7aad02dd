//! Multi-tenant RBAC+ABAC hybrid authorization engine.
//!
//! Every entity is scoped by `biz_id`. A `Check` asks whether a user may
//! perform a set of actions on a resource: role-based grants (direct or
//! inherited through the role-inclusion graph) decide the coarse RBAC gate,
//! and attribute-based policies layered on top of the permissions RBAC
//! already allowed decide the fine-grained ABAC gate. Deny always wins over
//! Allow wherever both apply.
//!
//! ## Modules
//!
//! - [`bitring`] — circular-buffer crash/health detector (C1)
//! - [`attributes`] — typed attribute value codec and operator evaluation (C2)
//! - [`policy`] — binary rule-tree reconstruction and evaluation (C3)
//! - [`attribute_store`] — attribute definition/value fetch, merge, validation (C4)
//! - [`roles`] — role-inclusion graph BFS, forward and backward (C5)
//! - [`permissions`] — user-permission assembly and deny-precedence resolution (C6)
//! - [`cache`] — two-tier Redis/in-process cache with fail-over (C7)
//! - [`events`] / [`writes`] — cache-invalidating writes and change notification (C8)
//! - [`service`] — the hybrid decision pipeline and CRUD facade (C9/C12)
//! - [`hot_users`] — eager permission warm-up for a tracked hot-user set (C10)
//! - [`config`] — layered configuration
//! - [`errors`] — the engine's error taxonomy
//! - [`telemetry`] — `tracing-subscriber` init helper

pub mod attribute_store;
pub mod attributes;
pub mod bitring;
pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod hot_users;
pub mod permissions;
pub mod policy;
pub mod roles;
pub mod service;
pub mod telemetry;
pub mod writes;

pub use config::AuthzConfig;
pub use errors::{AuthzError, AuthzErrorKind, AuthzResult};
pub use service::{AuthzService, ENVIRONMENT_ENTITY_ID};

pub use authz_database::{AttributeEntityKind, AuthzRepository, RepositoryFactory};
pub use authz_shared::*;
