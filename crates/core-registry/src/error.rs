//! Error types for registry operations

use std::fmt;
use thiserror::Error;

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Which registry a lookup failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Policy,
    PolicyType,
    Service,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Node => "Near-RT RIC",
            EntityKind::Policy => "Policy",
            EntityKind::PolicyType => "Policy type",
            EntityKind::Service => "Service",
        };
        f.write_str(name)
    }
}

/// Classification of a refused operation, for the caller to map onto a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectStatus {
    /// The request itself is invalid for the current state
    BadRequest,
    /// The request contradicts existing state
    Conflict,
    /// The node is busy (synchronizing, being checked, or unavailable)
    Locked,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{reason}")]
    Rejected { status: RejectStatus, reason: String },
}

impl RegistryError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        RegistryError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn rejected(status: RejectStatus, reason: impl Into<String>) -> Self {
        RegistryError::Rejected {
            status,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}
