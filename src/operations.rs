/*!
 * Policy and service operations for request handlers
 *
 * Mutations hold the node's SHARED lock, so any number of them run in
 * parallel while supervision and synchronization, which take the EXCLUSIVE
 * lock, wait for them to drain.
 */

use a1pms_core_lock::{Grant, LockType};
use a1pms_core_registry::{
    EntityKind, Node, Policy, PolicyType, RegistryError, RejectStatus, Service,
};
use a1pms_sentinel::{CascadeOutcome, ServiceSupervision, SupervisionContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;

/// A policy create or update request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutPolicy {
    pub policy_id: String,
    pub node_id: String,
    pub policy_type_id: String,
    /// Owning service; may name a service that is not registered
    pub service_id: String,
    pub json: String,
    pub transient: bool,
    pub status_notification_uri: Option<String>,
}

/// Whether a put created a new entry or replaced one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Updated,
}

#[derive(Clone, Debug)]
pub struct PolicyOperations {
    ctx: SupervisionContext,
    services: ServiceSupervision,
}

impl PolicyOperations {
    pub fn new(ctx: SupervisionContext) -> Self {
        let services = ServiceSupervision::new(ctx.clone());
        Self { ctx, services }
    }

    /// Push a policy to its node and register it.
    ///
    /// The registry only changes once the node has accepted the policy.
    pub async fn put_policy(&self, request: PutPolicy) -> Result<PutOutcome> {
        let node = self.ctx.nodes.get(&request.node_id)?;
        let policy_type = self.ctx.policy_types.get(&request.policy_type_id)?;

        let _grant = self.lock_for_mutation(&node).await?;

        if !node.supports_type(&policy_type.id) {
            return Err(RegistryError::rejected(
                RejectStatus::BadRequest,
                format!(
                    "Near-RT RIC {} does not support policy type {}",
                    node.id(),
                    policy_type.id
                ),
            )
            .into());
        }
        if let Some(existing) = self.ctx.policies.find(&request.policy_id) {
            if existing.node_id() != node.id() {
                return Err(RegistryError::rejected(
                    RejectStatus::Conflict,
                    format!(
                        "Policy {} already exists on Near-RT RIC {}",
                        existing.id,
                        existing.node_id()
                    ),
                )
                .into());
            }
        }

        let policy = Arc::new(self.build_policy(request, policy_type, Arc::clone(&node)));
        let client = self.ctx.clients.client_for(&node).await?;
        client.put_policy(&policy).await?;

        self.touch_service(&policy.owner_service_id);
        let previous = self.ctx.policies.put(Arc::clone(&policy)).await?;
        let outcome = match previous {
            Some(_) => PutOutcome::Updated,
            None => PutOutcome::Created,
        };
        info!(
            policy_id = %policy.id,
            node_id = %node.id(),
            outcome = ?outcome,
            "Policy stored"
        );
        Ok(outcome)
    }

    /// Delete a policy on its node, then forget it
    pub async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        let policy = self.ctx.policies.get(policy_id)?;
        let node = Arc::clone(&policy.node);

        let _grant = self.lock_for_mutation(&node).await?;

        let client = self.ctx.clients.client_for(&node).await?;
        client.delete_policy(&policy).await?;

        self.touch_service(&policy.owner_service_id);
        self.ctx.policies.remove(&policy).await;
        info!(policy_id = %policy_id, node_id = %node.id(), "Policy deleted");
        Ok(())
    }

    /// Register a service, or replace its keep-alive settings
    pub async fn register_service(
        &self,
        name: &str,
        keep_alive_interval: Duration,
        callback_url: Option<String>,
    ) -> Result<PutOutcome> {
        if name.trim().is_empty() {
            return Err(
                RegistryError::rejected(RejectStatus::BadRequest, "Service name is missing")
                    .into(),
            );
        }
        if let Some(url) = callback_url.as_deref().filter(|url| !url.is_empty()) {
            url::Url::parse(url).map_err(|e| {
                RegistryError::rejected(
                    RejectStatus::BadRequest,
                    format!("Invalid callback URL {}: {}", url, e),
                )
            })?;
        }

        let service = Arc::new(Service::new(name, keep_alive_interval, callback_url));
        let previous = self.ctx.services.put(service).await;
        let outcome = match previous {
            Some(_) => PutOutcome::Updated,
            None => PutOutcome::Created,
        };
        info!(
            service_id = %name,
            keep_alive_s = keep_alive_interval.as_secs(),
            outcome = ?outcome,
            "Service registered"
        );
        Ok(outcome)
    }

    pub fn keep_alive(&self, name: &str) -> Result<()> {
        self.ctx.services.get(name)?.keep_alive();
        debug!(service_id = %name, "Keep-alive received");
        Ok(())
    }

    /// Remove a service and every policy it owns
    pub async fn deregister_service(&self, name: &str) -> Result<CascadeOutcome> {
        let outcome = self
            .services
            .deregister(name)
            .await
            .ok_or_else(|| RegistryError::not_found(EntityKind::Service, name))?;
        info!(
            service_id = %name,
            policies_removed = outcome.policies_removed,
            remote_delete_failures = outcome.remote_delete_failures,
            "Service deregistered"
        );
        Ok(outcome)
    }

    pub fn get_policy(&self, policy_id: &str) -> Result<Arc<Policy>> {
        Ok(self.ctx.policies.get(policy_id)?)
    }

    /// Policies matching every given filter, ordered by id
    pub fn policies_for(
        &self,
        policy_type_id: Option<&str>,
        node_id: Option<&str>,
        service_id: Option<&str>,
    ) -> Vec<Arc<Policy>> {
        self.ctx.policies.filter(policy_type_id, node_id, service_id)
    }

    /// Policy types by name and, optionally, compatible version
    pub fn policy_types(
        &self,
        type_name: Option<&str>,
        compatible_with: Option<&str>,
    ) -> Result<Vec<Arc<PolicyType>>> {
        Ok(self.ctx.policy_types.filter(type_name, compatible_with)?)
    }

    /// The node controlling a managed element
    pub fn node_for_managed_element(&self, managed_element_id: &str) -> Result<Arc<Node>> {
        self.ctx
            .nodes
            .find_by_managed_element(managed_element_id)
            .ok_or_else(|| {
                RegistryError::not_found(EntityKind::Node, managed_element_id).into()
            })
    }

    /// Take the node's SHARED lock and check that it takes mutations
    async fn lock_for_mutation(&self, node: &Node) -> Result<Grant> {
        let grant = node.lock().lock(LockType::Shared).wait().await?;
        let state = node.state();
        if !state.accepts_mutations() {
            return Err(RegistryError::rejected(
                RejectStatus::Locked,
                format!("Near-RT RIC {} is not operational, state: {}", node.id(), state),
            )
            .into());
        }
        Ok(grant)
    }

    fn build_policy(
        &self,
        request: PutPolicy,
        policy_type: Arc<PolicyType>,
        node: Arc<Node>,
    ) -> Policy {
        let mut policy = Policy::new(request.policy_id, policy_type, node, request.json)
            .with_owner(request.service_id)
            .transient(request.transient);
        if let Some(uri) = request.status_notification_uri {
            policy = policy.with_status_notification(uri);
        }
        policy
    }

    fn touch_service(&self, service_id: &str) {
        if let Some(service) = self.ctx.services.find(service_id) {
            service.keep_alive();
        }
    }
}
