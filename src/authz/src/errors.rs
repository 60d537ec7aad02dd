//! Authorization error types.
//!
//! `AuthzError` mirrors the error taxonomy of the engine: callers can match on
//! `kind()` to decide propagation policy (surface to the client vs. degrade and
//! log) without inspecting message strings.

use thiserror::Error;

/// The authorization engine's single error type.
///
/// Every public entry point in this crate returns `AuthzResult<T>`. Cache and
/// event-sink failures are caught and logged at the call site rather than
/// propagated through this type — by the time an `AuthzError` escapes a
/// component boundary it is meant to be surfaced.
#[derive(Error, Debug)]
pub enum AuthzError {
    /// Missing/zero ids, empty required strings, regex mismatch, unknown enum values.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Entity absent at the storage layer.
    #[error("{entity} not found: {detail}")]
    NotFound {
        entity: &'static str,
        detail: String,
    },

    /// Uniqueness-constraint violation on create.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing/invalid/expired credential, or absent `biz_id`.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Storage/cache/event-bus error that may succeed on retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// Invariant violation (unknown data type, unknown operator, corrupted
    /// policy tree). Logged at the call site before being returned.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used throughout the authorization engine.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Coarse error classification, matching the taxonomy in the specification's
/// error-handling design. Used to decide whether an error is safe to expose
/// verbatim to a caller or must be collapsed to an opaque failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthenticated,
    Transient,
    Internal,
}

impl AuthzError {
    pub fn kind(&self) -> AuthzErrorKind {
        match self {
            AuthzError::Validation(_) => AuthzErrorKind::Validation,
            AuthzError::NotFound { .. } => AuthzErrorKind::NotFound,
            AuthzError::Conflict(_) => AuthzErrorKind::Conflict,
            AuthzError::Unauthenticated(_) => AuthzErrorKind::Unauthenticated,
            AuthzError::Transient(_) => AuthzErrorKind::Transient,
            AuthzError::Internal(_) => AuthzErrorKind::Internal,
        }
    }

    /// Whether this error should surface to the RPC caller as-is (validation,
    /// conflict, unauthenticated) rather than being degraded to a bare `false`
    /// decision with the error logged.
    pub fn surfaces_to_caller(&self) -> bool {
        matches!(
            self.kind(),
            AuthzErrorKind::Validation
                | AuthzErrorKind::Conflict
                | AuthzErrorKind::Unauthenticated
                | AuthzErrorKind::NotFound
        )
    }

    pub fn not_found(entity: &'static str, detail: impl Into<String>) -> Self {
        AuthzError::NotFound {
            entity,
            detail: detail.into(),
        }
    }
}

impl From<sqlx::Error> for AuthzError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AuthzError::NotFound {
                entity: "row",
                detail: "no matching row".to_string(),
            },
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AuthzError::Conflict(db_err.message().to_string())
            }
            other => AuthzError::Transient(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AuthzError {
    fn from(err: redis::RedisError) -> Self {
        AuthzError::Transient(err.to_string())
    }
}

impl From<serde_json::Error> for AuthzError {
    fn from(err: serde_json::Error) -> Self {
        AuthzError::Internal(format!("serialization error: {err}"))
    }
}

impl From<config::ConfigError> for AuthzError {
    fn from(err: config::ConfigError) -> Self {
        AuthzError::Internal(format!("configuration error: {err}"))
    }
}

impl From<authz_database::DatabaseError> for AuthzError {
    fn from(err: authz_database::DatabaseError) -> Self {
        match &err {
            authz_database::DatabaseError::NotFound(detail) => AuthzError::NotFound {
                entity: "row",
                detail: detail.clone(),
            },
            authz_database::DatabaseError::Validation(detail) => {
                AuthzError::Validation(detail.clone())
            }
            _ => AuthzError::Transient(err.to_string()),
        }
    }
}
