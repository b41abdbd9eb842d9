//! Shared handles used by every supervisor

use a1pms_connect::{ClientProvider, ServiceNotifier};
use a1pms_core_registry::{Nodes, Policies, PolicyTypes, Services};
use std::sync::Arc;

/// Registries plus the southbound collaborators.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct SupervisionContext {
    pub nodes: Arc<Nodes>,
    pub policies: Arc<Policies>,
    pub policy_types: Arc<PolicyTypes>,
    pub services: Arc<Services>,
    pub clients: Arc<dyn ClientProvider>,
    pub notifier: Arc<dyn ServiceNotifier>,
}

impl std::fmt::Debug for SupervisionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisionContext")
            .field("nodes", &self.nodes.size())
            .field("policies", &self.policies.size())
            .field("policy_types", &self.policy_types.size())
            .field("services", &self.services.size())
            .finish()
    }
}
