//! Service keep-alive sweep
//!
//! Expired services are removed along with every policy they own. Local
//! removal always happens first and always completes; the remote deletes that
//! follow are best-effort and run concurrently. No node lock is taken: remote
//! point deletes are idempotent, and any drift they leave behind is repaired
//! by the next node supervision tick.

use crate::context::SupervisionContext;
use crate::metrics::ServiceSweepStats;
use a1pms_core_registry::Policy;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Result of removing one service and its policies
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub policies_removed: usize,
    pub remote_delete_failures: usize,
}

#[derive(Clone, Debug)]
pub struct ServiceSupervision {
    ctx: SupervisionContext,
}

impl ServiceSupervision {
    pub fn new(ctx: SupervisionContext) -> Self {
        Self { ctx }
    }

    /// Remove every expired service
    pub async fn run_sweep(&self) -> ServiceSweepStats {
        let started = Instant::now();
        let mut stats = ServiceSweepStats::new();

        let mut orphaned = Vec::new();
        for service in self.ctx.services.expired() {
            info!(
                service_id = %service.name(),
                keep_alive_s = service.keep_alive_interval().as_secs(),
                "Service keep-alive expired"
            );
            orphaned.extend(self.remove_locally(service.name()).await);
            stats.expired_services += 1;
        }

        stats.policies_removed = orphaned.len();
        stats.remote_delete_failures = self.delete_remotely(&orphaned).await;
        stats.duration = Some(started.elapsed());
        stats
    }

    /// Remove one service and cascade to its policies.
    ///
    /// Returns `None` if the service is unknown.
    pub async fn deregister(&self, service_id: &str) -> Option<CascadeOutcome> {
        self.ctx.services.find(service_id)?;
        let removed = self.remove_locally(service_id).await;
        let remote_delete_failures = self.delete_remotely(&removed).await;
        Some(CascadeOutcome {
            policies_removed: removed.len(),
            remote_delete_failures,
        })
    }

    async fn remove_locally(&self, service_id: &str) -> Vec<Arc<Policy>> {
        self.ctx.services.remove(service_id).await;
        self.ctx.policies.remove_for_service(service_id).await
    }

    /// Delete policies on their nodes, returning how many deletes failed
    async fn delete_remotely(&self, policies: &[Arc<Policy>]) -> usize {
        let results = join_all(policies.iter().map(|policy| async move {
            let client = self.ctx.clients.client_for(&policy.node).await?;
            client.delete_policy(policy).await
        }))
        .await;

        let mut failures = 0;
        for (policy, result) in policies.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    policy_id = %policy.id,
                    node_id = %policy.node_id(),
                    error = %e,
                    "Remote delete of orphaned policy failed"
                );
                failures += 1;
            }
        }
        failures
    }
}
