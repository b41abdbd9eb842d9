//! Node supervision: periodic drift detection
//!
//! Each tick inspects every node concurrently. The node lock is only tried,
//! never awaited, so a busy node is skipped instead of stalling the tick. A
//! node is compared while its EXCLUSIVE lock is held and its state reads CONSISTENCY_CHECK, so the local
//! view cannot change underneath the comparison. Repairs are handed to the
//! [`NodeSynchronizer`] and never run inline.

use crate::context::SupervisionContext;
use crate::error::SyncError;
use crate::metrics::SupervisionStats;
use crate::synchronizer::NodeSynchronizer;
use a1pms_core_lock::LockType;
use a1pms_core_registry::{Node, NodeState};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What supervision decided for one node
#[derive(Debug)]
pub enum NodeCheck {
    /// A check or repair was already in progress
    Skipped,
    /// The node could not be queried and is now UNAVAILABLE
    Unreachable,
    /// Remote state matched; the node's state is unchanged
    Consistent,
    /// Drift found; a synchronization is running
    SyncStarted(JoinHandle<Result<(), SyncError>>),
}

#[derive(Clone, Debug)]
pub struct NodeSupervision {
    ctx: SupervisionContext,
    synchronizer: NodeSynchronizer,
}

impl NodeSupervision {
    pub fn new(ctx: SupervisionContext) -> Self {
        let synchronizer = NodeSynchronizer::new(ctx.clone());
        Self { ctx, synchronizer }
    }

    pub fn synchronizer(&self) -> &NodeSynchronizer {
        &self.synchronizer
    }

    /// Check every known node once
    pub async fn run_tick(&self) -> SupervisionStats {
        let started = Instant::now();
        let nodes = self.ctx.nodes.list();
        let checks = join_all(nodes.iter().map(|node| self.check_node(node))).await;

        let mut stats = SupervisionStats::new();
        for check in checks {
            match check {
                NodeCheck::Skipped => stats.skipped += 1,
                NodeCheck::Unreachable => stats.unreachable += 1,
                NodeCheck::Consistent => {
                    stats.checked += 1;
                    stats.consistent += 1;
                }
                NodeCheck::SyncStarted(_) => {
                    stats.checked += 1;
                    stats.synchronizations_started += 1;
                }
            }
        }
        stats.duration = Some(started.elapsed());
        stats
    }

    /// Decide whether one node needs repair, starting the repair if so
    pub async fn check_node(&self, node: &Arc<Node>) -> NodeCheck {
        if Self::busy(node.state()) {
            debug!(node_id = %node.id(), state = %node.state(), "Skipping node");
            return NodeCheck::Skipped;
        }

        let client = match self.ctx.clients.client_for(node).await {
            Ok(client) => client,
            Err(e) => {
                warn!(node_id = %node.id(), error = %e, "Node unreachable");
                node.set_state(NodeState::Unavailable);
                return NodeCheck::Unreachable;
            }
        };

        // Never wait here: a node under API traffic is checked next tick
        let Some(grant) = node.lock().try_lock(LockType::Exclusive) else {
            debug!(node_id = %node.id(), "Node lock busy, skipping");
            return NodeCheck::Skipped;
        };

        // A synchronization may have started since the state check above
        let previous = node.state();
        if Self::busy(previous) {
            return NodeCheck::Skipped;
        }
        node.set_state(NodeState::ConsistencyCheck);

        let remote = futures::try_join!(
            client.get_policy_identities(),
            client.get_policy_type_identities()
        );
        let (remote_policies, remote_types) = match remote {
            Ok(remote) => remote,
            Err(e) => {
                warn!(node_id = %node.id(), error = %e, "Node unreachable");
                node.set_state(NodeState::Unavailable);
                return NodeCheck::Unreachable;
            }
        };

        let policies_match = Self::same_set(remote_policies, self.ctx.policies.ids_for_node(node.id()));
        let types_match = Self::same_set(remote_types, node.supported_types());

        if policies_match && types_match && previous != NodeState::Unavailable {
            node.set_state(previous);
            return NodeCheck::Consistent;
        }

        info!(
            node_id = %node.id(),
            policies_match,
            types_match,
            previous_state = %previous,
            "Node needs synchronization"
        );
        // The synchronization's EXCLUSIVE request is queued before this grant drops
        let handle = self.synchronizer.run(Arc::clone(node));
        drop(grant);
        NodeCheck::SyncStarted(handle)
    }

    fn busy(state: NodeState) -> bool {
        matches!(
            state,
            NodeState::Synchronizing | NodeState::ConsistencyCheck
        )
    }

    fn same_set(remote: Vec<String>, local: Vec<String>) -> bool {
        let remote: BTreeSet<String> = remote.into_iter().collect();
        let local: BTreeSet<String> = local.into_iter().collect();
        remote == local
    }
}
