//! The southbound client contract

use crate::error::A1Result;
use a1pms_core_registry::{Node, Policy};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Remote policy operations against one node.
///
/// Every call may fail with a transport or protocol error. Callers must not
/// assume ordering between calls issued concurrently.
#[async_trait]
pub trait A1Client: Send + Sync {
    /// Policy-type ids the node supports
    async fn get_policy_type_identities(&self) -> A1Result<Vec<String>>;

    /// Ids of every policy instance on the node
    async fn get_policy_identities(&self) -> A1Result<Vec<String>>;

    /// Schema document of one type, as a JSON string
    async fn get_policy_type_schema(&self, type_id: &str) -> A1Result<String>;

    /// Create or update a policy; returns the node's acknowledgement body
    async fn put_policy(&self, policy: &Policy) -> A1Result<String>;

    /// Delete a policy; deleting a missing policy succeeds
    async fn delete_policy(&self, policy: &Policy) -> A1Result<String>;

    /// Delete every policy on the node, yielding each deleted id
    fn delete_all_policies(&self) -> BoxStream<'_, A1Result<String>>;
}

/// Hands out the client for a node.
///
/// Acquisition may involve dialect detection and can fail like any other
/// remote call.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn client_for(&self, node: &Arc<Node>) -> A1Result<Arc<dyn A1Client>>;
}
