//! Error types for the a1pms-sentinel crate

use a1pms_connect::A1Error;
use a1pms_core_lock::LockError;
use thiserror::Error;

/// Why a node synchronization gave up.
///
/// Every variant leaves the node UNAVAILABLE.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Lock on node {node_id} was abandoned: {source}")]
    Lock {
        node_id: String,
        #[source]
        source: LockError,
    },

    #[error("No southbound client for node {node_id}: {source}")]
    Client {
        node_id: String,
        #[source]
        source: A1Error,
    },

    #[error("Deleting all policies on node {node_id} failed after retry: {source}")]
    DeleteAll {
        node_id: String,
        #[source]
        source: A1Error,
    },

    #[error("Re-creating policy {policy_id} on node {node_id} failed: {source}")]
    Recreate {
        node_id: String,
        policy_id: String,
        #[source]
        source: A1Error,
    },

    #[error("Policy type synchronization for node {node_id} failed: {source}")]
    PolicyTypes {
        node_id: String,
        #[source]
        source: A1Error,
    },
}

#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("Invalid supervision policy: {0}")]
    InvalidPolicy(String),
}
