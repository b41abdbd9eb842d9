/*!
 * Application wiring: registries, southbound clients and supervision
 */

use a1pms_connect::{A1ClientFactory, ClientProvider, HttpServiceNotifier, ServiceNotifier};
use a1pms_core_lock::LockType;
use a1pms_core_registry::{
    DataStore, FileStore, MemoryStore, Node, NodeState, Nodes, Policies, Policy, PolicyTypes,
    Services,
};
use a1pms_sentinel::{Supervisor, SupervisionContext, SupervisorHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{NodeConfigChange, PmsConfig};
use crate::error::Result;
use crate::operations::PolicyOperations;

/// What was reloaded from durable storage at startup
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreStats {
    pub policy_types: usize,
    pub services: usize,
    pub policies: usize,
}

pub struct PmsApp {
    config: Mutex<PmsConfig>,
    ctx: SupervisionContext,
    operations: PolicyOperations,
}

impl PmsApp {
    /// Build the service from configuration, with HTTP southbound clients
    pub fn new(config: PmsConfig) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn DataStore> = match &config.storage.database_dir {
            Some(dir) => {
                info!(database_dir = %dir.display(), "Using file storage");
                Arc::new(FileStore::new(dir))
            }
            None => {
                info!("No database_dir configured, state is kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        let factory = A1ClientFactory::with_timeout(
            config.southbound.http_timeout(),
            config.southbound.probe_dialects.clone(),
        )?;
        let notifier = HttpServiceNotifier::new(reqwest::Client::new());

        Ok(Self::with_parts(
            config,
            store,
            Arc::new(factory),
            Arc::new(notifier),
        ))
    }

    /// Build the service around explicit storage, clients and notifier
    pub fn with_parts(
        config: PmsConfig,
        store: Arc<dyn DataStore>,
        clients: Arc<dyn ClientProvider>,
        notifier: Arc<dyn ServiceNotifier>,
    ) -> Self {
        let ctx = SupervisionContext {
            nodes: Arc::new(Nodes::new()),
            policies: Arc::new(Policies::new(store.clone())),
            policy_types: Arc::new(PolicyTypes::new(store.clone())),
            services: Arc::new(Services::new(store)),
            clients,
            notifier,
        };
        for node_config in &config.nodes {
            ctx.nodes.put(Arc::new(Node::new(node_config.clone())));
        }

        let operations = PolicyOperations::new(ctx.clone());
        Self {
            config: Mutex::new(config),
            ctx,
            operations,
        }
    }

    pub fn context(&self) -> &SupervisionContext {
        &self.ctx
    }

    pub fn operations(&self) -> &PolicyOperations {
        &self.operations
    }

    /// Snapshot of the configuration currently applied
    pub fn config(&self) -> PmsConfig {
        self.config.lock().clone()
    }

    /// Reload persisted types, services and policies.
    ///
    /// Policies go last since they reference nodes and types.
    pub async fn restore(&self) -> RestoreStats {
        let stats = RestoreStats {
            policy_types: self.ctx.policy_types.restore().await,
            services: self.ctx.services.restore().await,
            policies: self
                .ctx
                .policies
                .restore(&self.ctx.nodes, &self.ctx.policy_types)
                .await,
        };
        info!(
            policy_types = stats.policy_types,
            services = stats.services,
            policies = stats.policies,
            "Restored persisted state"
        );
        stats
    }

    /// Bring the node registry in line with a refreshed configuration.
    ///
    /// Changed and added nodes start UNAVAILABLE and get synchronized by
    /// the next supervision tick. Removed nodes take their policies with them.
    pub async fn apply_node_config(&self, new_config: PmsConfig) -> Result<Vec<NodeConfigChange>> {
        new_config.validate()?;
        let changes = PmsConfig::node_changes(&self.config.lock(), &new_config);

        for change in &changes {
            match change {
                NodeConfigChange::Added(node_config) => {
                    info!(node_id = %node_config.id, "Node added");
                    self.ctx.nodes.put(Arc::new(Node::new(node_config.clone())));
                }
                NodeConfigChange::Changed(node_config) => {
                    info!(node_id = %node_config.id, "Node configuration changed");
                    let replacement = Arc::new(Node::new(node_config.clone()));
                    self.replace_node(replacement).await?;
                }
                NodeConfigChange::Removed(node_id) => {
                    info!(node_id = %node_id, "Node removed");
                    self.remove_node(node_id).await?;
                }
            }
        }

        *self.config.lock() = new_config;
        Ok(changes)
    }

    /// Start the background supervisors with the configured timing
    pub fn start_supervisor(&self) -> Result<SupervisorHandle> {
        let policy = self.config.lock().supervision.clone();
        Ok(Supervisor::spawn(self.ctx.clone(), policy)?)
    }

    /// Swap in a new node object and move the old node's policies onto it
    async fn replace_node(&self, replacement: Arc<Node>) -> Result<()> {
        let previous = self.ctx.nodes.find(replacement.id());
        let _grant = match &previous {
            Some(old) => Some(old.lock().lock(LockType::Exclusive).wait().await?),
            None => None,
        };

        self.ctx.nodes.put(Arc::clone(&replacement));
        if let Some(old) = previous {
            old.set_state(NodeState::Unavailable);
        }

        for policy in self.ctx.policies.get_for_node(replacement.id()) {
            let rebound = Policy {
                node: Arc::clone(&replacement),
                ..(*policy).clone()
            };
            if let Err(e) = self.ctx.policies.put(Arc::new(rebound)).await {
                warn!(policy_id = %policy.id, error = %e, "Failed to move policy to replaced node");
            }
        }
        Ok(())
    }

    async fn remove_node(&self, node_id: &str) -> Result<()> {
        let Some(node) = self.ctx.nodes.find(node_id) else {
            return Ok(());
        };
        let _grant = node.lock().lock(LockType::Exclusive).wait().await?;
        self.ctx.nodes.remove(node_id);
        node.set_state(NodeState::Unavailable);
        let removed = self.ctx.policies.remove_for_node(node_id).await;
        if !removed.is_empty() {
            info!(node_id = %node_id, count = removed.len(), "Removed policies of deleted node");
        }
        Ok(())
    }
}
