//! Shared domain types for the multi-tenant authorization engine.
//!
//! Every type here is a plain, `biz_id`-scoped data record (§3 of the
//! design). Nothing in this crate talks to storage, cache, or the network —
//! that lives in `authz-database` and `authz-core` respectively.

pub mod types;

pub use types::*;
