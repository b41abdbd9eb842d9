/*!
 * Error types for A1PMS
 */

use a1pms_connect::A1Error;
use a1pms_core_lock::LockError;
use a1pms_core_registry::{RegistryError, RejectStatus, StorageError};
use a1pms_sentinel::SentinelError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PmsError>;

/// Response class of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    NotFound,
    BadRequest,
    Conflict,
    /// The node cannot take mutations right now
    Locked,
    /// The node refused or could not be reached
    BadGateway,
    Internal,
}

impl ErrorStatus {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorStatus::NotFound => 404,
            ErrorStatus::BadRequest => 400,
            ErrorStatus::Conflict => 409,
            ErrorStatus::Locked => 423,
            ErrorStatus::BadGateway => 502,
            ErrorStatus::Internal => 500,
        }
    }
}

impl From<RejectStatus> for ErrorStatus {
    fn from(status: RejectStatus) -> Self {
        match status {
            RejectStatus::BadRequest => ErrorStatus::BadRequest,
            RejectStatus::Conflict => ErrorStatus::Conflict,
            RejectStatus::Locked => ErrorStatus::Locked,
        }
    }
}

#[derive(Error, Debug)]
pub enum PmsError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Southbound error: {0}")]
    Southbound(#[from] A1Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SentinelError),
}

impl PmsError {
    pub fn status(&self) -> ErrorStatus {
        match self {
            PmsError::Registry(RegistryError::NotFound { .. }) => ErrorStatus::NotFound,
            PmsError::Registry(RegistryError::Rejected { status, .. }) => (*status).into(),
            PmsError::Southbound(_) => ErrorStatus::BadGateway,
            PmsError::Config(_)
            | PmsError::Storage(_)
            | PmsError::Lock(_)
            | PmsError::Supervisor(_) => ErrorStatus::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status().status_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use a1pms_core_registry::EntityKind;

    #[test]
    fn test_not_found_maps_to_404() {
        let err: PmsError = RegistryError::not_found(EntityKind::Policy, "p1").into();
        assert_eq!(err.status(), ErrorStatus::NotFound);
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Policy not found: p1");
    }

    #[test]
    fn test_rejections_keep_their_status() {
        let locked: PmsError =
            RegistryError::rejected(RejectStatus::Locked, "busy").into();
        assert_eq!(locked.status_code(), 423);

        let conflict: PmsError =
            RegistryError::rejected(RejectStatus::Conflict, "other node").into();
        assert_eq!(conflict.status(), ErrorStatus::Conflict);

        let bad: PmsError = RegistryError::rejected(RejectStatus::BadRequest, "no").into();
        assert_eq!(bad.status_code(), 400);
    }

    #[test]
    fn test_southbound_failure_is_bad_gateway() {
        let err: PmsError = A1Error::Status {
            node_id: "ric1".to_string(),
            status: 503,
            body: String::new(),
        }
        .into();
        assert_eq!(err.status(), ErrorStatus::BadGateway);
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_config_is_internal() {
        assert_eq!(PmsError::Config("x".to_string()).status_code(), 500);
    }
}
