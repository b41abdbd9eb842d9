//! Error types for the lock crate

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock was torn down while the request was still queued
    #[error("lock '{0}' was dropped before the request could be granted")]
    Abandoned(String),
}
