//! # Error Types
//!
//! Control-plane error taxonomy and its central classification.

use thiserror::Error;

use crate::entities::{ResourceKind, ResourceName};

/// How a control-plane error must be treated by its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The desired state already holds. Downgraded to a logged no-op.
    Benign,
    /// Resource absent on describe. Precondition for create, not a failure.
    Expected,
    /// Fatal for this resource. Recorded and skipped; siblings continue.
    Fatal,
    /// Transient. The caller may retry with backoff.
    Retryable,
}

/// Errors returned by the remote control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    /// Create of a resource that already exists.
    #[error("{kind} already exists: {name}")]
    AlreadyExists {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource name.
        name: ResourceName,
    },

    /// Grant with a statement id already present on the function.
    #[error("duplicate statement {statement_id} on function {function_name}")]
    DuplicateStatement {
        /// Function carrying the policy.
        function_name: String,
        /// Conflicting statement id.
        statement_id: String,
    },

    /// Resource does not exist.
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Resource kind.
        kind: ResourceKind,
        /// Resource name.
        name: ResourceName,
    },

    /// Caller lacks the rights for this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Request rejected as invalid.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Network or availability failure.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Call exceeded its bounded timeout.
    #[error("call timed out after {0} ms")]
    Timeout(u64),
}

impl ControlPlaneError {
    /// Classify the error. Every call site relies on this decision.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AlreadyExists { .. } | Self::DuplicateStatement { .. } => ErrorClass::Benign,
            Self::NotFound { .. } => ErrorClass::Expected,
            Self::PermissionDenied(_) | Self::ConfigInvalid(_) => ErrorClass::Fatal,
            Self::TransientNetwork(_) | Self::Timeout(_) => ErrorClass::Retryable,
        }
    }

    /// Shorthand for `class() == Benign`.
    pub fn is_benign(&self) -> bool {
        self.class() == ErrorClass::Benign
    }

    /// Shorthand for `class() == Retryable`.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Build a `NotFound` error.
    pub fn not_found(kind: ResourceKind, name: &ResourceName) -> Self {
        Self::NotFound {
            kind,
            name: name.clone(),
        }
    }

    /// Build an `AlreadyExists` error.
    pub fn already_exists(kind: ResourceKind, name: &ResourceName) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.clone(),
        }
    }
}
