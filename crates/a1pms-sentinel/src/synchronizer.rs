//! Node synchronization: repairs drift between a node and the registry
//!
//! A synchronization owns the node's EXCLUSIVE lock for its whole duration,
//! so no user mutation can interleave with it. The steps are:
//!
//! 1. acquire the node's southbound client
//! 2. delete every remote policy (one immediate retry)
//! 3. drop transient policies locally and re-create the others remotely
//! 4. reconcile policy types and replace the node's supported set
//! 5. mark the node AVAILABLE and tell services with a callback
//!
//! Any failure leaves the node UNAVAILABLE for the next supervision tick.

use crate::context::SupervisionContext;
use crate::error::SyncError;
use a1pms_connect::{A1Client, A1Error, A1Result};
use a1pms_core_lock::{Grant, LockRequest, LockType};
use a1pms_core_registry::{Node, NodeState, PolicyType};
use futures::future::try_join_all;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Holds the exclusive grant and settles the node's state on every exit path
struct SyncScope<'a> {
    node: &'a Node,
    grant: Option<Grant>,
    succeeded: bool,
}

impl Drop for SyncScope<'_> {
    fn drop(&mut self) {
        if !self.succeeded {
            self.node.set_state(NodeState::Unavailable);
        }
        if let Some(grant) = self.grant.take() {
            grant.unlock();
        }
    }
}

/// Runs synchronizations
#[derive(Clone, Debug)]
pub struct NodeSynchronizer {
    ctx: SupervisionContext,
}

impl NodeSynchronizer {
    pub fn new(ctx: SupervisionContext) -> Self {
        Self { ctx }
    }

    /// Mark the node SYNCHRONIZING and repair it in the background.
    ///
    /// The EXCLUSIVE request is queued before this returns, so it is served
    /// ahead of any lock request made afterwards.
    pub fn run(&self, node: Arc<Node>) -> JoinHandle<Result<(), SyncError>> {
        node.set_state(NodeState::Synchronizing);
        let request = node.lock().lock(LockType::Exclusive);
        let this = self.clone();
        tokio::spawn(async move { this.synchronize_with(&node, request).await })
    }

    /// Repair one node, returning once it is AVAILABLE or UNAVAILABLE
    pub async fn synchronize(&self, node: &Arc<Node>) -> Result<(), SyncError> {
        node.set_state(NodeState::Synchronizing);
        let request = node.lock().lock(LockType::Exclusive);
        self.synchronize_with(node, request).await
    }

    /// Repair one node using an EXCLUSIVE request already placed on its lock
    pub async fn synchronize_with(
        &self,
        node: &Arc<Node>,
        request: LockRequest,
    ) -> Result<(), SyncError> {
        node.set_state(NodeState::Synchronizing);
        let mut scope = SyncScope {
            node: node.as_ref(),
            grant: None,
            succeeded: false,
        };

        let grant = request
            .wait()
            .await
            .map_err(|source| SyncError::Lock {
                node_id: node.id().to_string(),
                source,
            })?;
        scope.grant = Some(grant);

        info!(node_id = %node.id(), "Synchronization started");

        let client = self
            .ctx
            .clients
            .client_for(node)
            .await
            .map_err(|source| SyncError::Client {
                node_id: node.id().to_string(),
                source,
            })?;

        self.delete_all_policies(node, client.as_ref()).await?;
        self.recreate_policies(node, client.as_ref()).await?;
        self.synchronize_policy_types(node, client.as_ref()).await?;

        node.set_state(NodeState::Available);
        scope.succeeded = true;
        drop(scope);

        info!(node_id = %node.id(), "Synchronization completed");
        self.notify_services(node);
        Ok(())
    }

    async fn delete_all_policies(
        &self,
        node: &Node,
        client: &dyn A1Client,
    ) -> Result<(), SyncError> {
        async fn attempt(client: &dyn A1Client) -> A1Result<usize> {
            let deleted: Vec<String> = client.delete_all_policies().try_collect().await?;
            Ok(deleted.len())
        }

        let deleted = match attempt(client).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(node_id = %node.id(), error = %e, "Deleting remote policies failed, retrying once");
                attempt(client).await.map_err(|source| SyncError::DeleteAll {
                    node_id: node.id().to_string(),
                    source,
                })?
            }
        };
        debug!(node_id = %node.id(), deleted, "Remote policies deleted");
        Ok(())
    }

    async fn recreate_policies(
        &self,
        node: &Node,
        client: &dyn A1Client,
    ) -> Result<(), SyncError> {
        let (transient, durable): (Vec<_>, Vec<_>) = self
            .ctx
            .policies
            .get_for_node(node.id())
            .into_iter()
            .partition(|p| p.is_transient);

        for policy in &transient {
            self.ctx.policies.remove(policy).await;
        }
        if !transient.is_empty() {
            info!(node_id = %node.id(), count = transient.len(), "Dropped transient policies");
        }

        try_join_all(durable.iter().map(|policy| async move {
            client
                .put_policy(policy)
                .await
                .map_err(|source| SyncError::Recreate {
                    node_id: node.id().to_string(),
                    policy_id: policy.id.clone(),
                    source,
                })
        }))
        .await?;
        debug!(node_id = %node.id(), count = durable.len(), "Policies re-created");
        Ok(())
    }

    async fn synchronize_policy_types(
        &self,
        node: &Node,
        client: &dyn A1Client,
    ) -> Result<(), SyncError> {
        let to_error = |source: A1Error| SyncError::PolicyTypes {
            node_id: node.id().to_string(),
            source,
        };

        let remote_types = client.get_policy_type_identities().await.map_err(to_error)?;
        let unknown: Vec<&String> = remote_types
            .iter()
            .filter(|type_id| self.ctx.policy_types.find(type_id).is_none())
            .collect();

        let fetched = try_join_all(unknown.iter().map(|type_id| async move {
            client
                .get_policy_type_schema(type_id)
                .await
                .map(|schema| PolicyType::new(type_id.as_str(), schema))
        }))
        .await
        .map_err(to_error)?;

        for policy_type in fetched {
            debug!(node_id = %node.id(), policy_type_id = %policy_type.id, "Learned policy type");
            self.ctx.policy_types.put(Arc::new(policy_type)).await;
        }

        node.set_supported_types(remote_types);
        Ok(())
    }

    /// Best-effort; failures are logged and never undo the synchronization
    fn notify_services(&self, node: &Node) {
        for service in self.ctx.services.list() {
            let Some(callback) = service.callback_url().map(str::to_string) else {
                continue;
            };
            let notifier = Arc::clone(&self.ctx.notifier);
            let node_id = node.id().to_string();
            let service_id = service.name().to_string();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify_node_available(&callback, &node_id).await {
                    warn!(service_id = %service_id, node_id = %node_id, error = %e, "Service notification failed");
                }
            });
        }
    }
}
