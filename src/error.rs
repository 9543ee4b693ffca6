//! Stable error taxonomy shared by every component in this crate.
//!
//! The categories below are load-bearing: `CoreError::kind` drives how a
//! failure propagates (surfaced through a [`crate::store::ReactiveStore`] vs.
//! thrown synchronously on a write path) and whether a caller should retry.

use std::fmt;

/// The seven failure classes a CoValue operation can produce.
///
/// Mirrors the propagation policy: read failures surface through a store as
/// `{error, id}`, write failures (`Structural`, `Validation`, `SchemaMissing`,
/// `Permission`) throw synchronously, and `Transient` failures are swallowed
/// at a subscription callback boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A precondition on the operation itself was violated (missing field,
    /// wrong id shape, unsupported cotype).
    Structural,
    /// A requested CoValue has no local core and none arrived within timeout.
    NotFound,
    /// A bounded wait elapsed without the expected transition.
    Timeout,
    /// A post-state failed schema validation.
    Validation,
    /// `$schema` was absent where required, or the schema itself could not
    /// be resolved.
    SchemaMissing,
    /// The runtime rejected a mutation (bubbled up from the CRDT layer).
    Permission,
    /// Swallowed at a best-effort boundary: cleanup races, index appends,
    /// per-key extraction failures. Never surfaced to the caller as a hard
    /// failure.
    Transient,
}

/// The crate-wide error type. Carries a stable [`ErrorKind`] plus a
/// human-readable message and an optional root cause.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        mut self,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Read-path failures never throw; convert to a diagnostic the caller
    /// can stash on a store.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind, ErrorKind::Transient)
    }
}

macro_rules! ctor {
    ($name:ident, $kind:expr) => {
        impl CoreError {
            pub fn $name(message: impl Into<String>) -> Self {
                Self::new($kind, message)
            }
        }
    };
}

ctor!(structural, ErrorKind::Structural);
ctor!(not_found, ErrorKind::NotFound);
ctor!(timeout, ErrorKind::Timeout);
ctor!(validation, ErrorKind::Validation);
ctor!(schema_missing, ErrorKind::SchemaMissing);
ctor!(permission, ErrorKind::Permission);
ctor!(transient, ErrorKind::Transient);

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Structural => "structural",
            ErrorKind::NotFound => "notFound",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Validation => "validation",
            ErrorKind::SchemaMissing => "schemaMissing",
            ErrorKind::Permission => "permission",
            ErrorKind::Transient => "transient",
        };
        f.write_str(label)
    }
}
