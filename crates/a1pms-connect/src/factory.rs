//! Adapter registry and dialect detection
//!
//! Adapters are looked up in a plugin table keyed by name. The built-in HTTP
//! adapters are registered under their dialect names (`STD_V2`, `OSC_V1`);
//! deployments can register their own under any key and select it per node
//! with the node's `adapter` setting.

use crate::client::{A1Client, ClientProvider};
use crate::error::{A1Error, A1Result};
use crate::http::HttpA1Client;
use a1pms_core_registry::{A1Dialect, Node};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Builds a client for a node
pub type AdapterFactory =
    Arc<dyn Fn(&Arc<Node>, &reqwest::Client) -> A1Result<Arc<dyn A1Client>> + Send + Sync>;

/// Resolves the client for each node.
///
/// Resolution order:
/// 1. the adapter named in the node's configuration, if any
/// 2. the dialect previously detected for the node
/// 3. probing each candidate dialect in order until one lists its policy types
pub struct A1ClientFactory {
    http: reqwest::Client,
    adapters: RwLock<HashMap<String, AdapterFactory>>,
    probe_order: Vec<A1Dialect>,
}

impl A1ClientFactory {
    /// Create a factory with the built-in adapters registered
    pub fn new(http: reqwest::Client, probe_order: Vec<A1Dialect>) -> Self {
        let factory = Self {
            http,
            adapters: RwLock::new(HashMap::new()),
            probe_order,
        };
        factory.register_builtin();
        factory
    }

    /// Create a factory with its own HTTP client
    pub fn with_timeout(timeout: Duration, probe_order: Vec<A1Dialect>) -> A1Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(http, probe_order))
    }

    fn register_builtin(&self) {
        for dialect in A1Dialect::ALL {
            self.register(
                dialect.as_str(),
                Arc::new(move |node: &Arc<Node>, http: &reqwest::Client| {
                    Ok(Arc::new(HttpA1Client::new(
                        http.clone(),
                        node.id(),
                        node.base_url(),
                        dialect,
                    )) as Arc<dyn A1Client>)
                }),
            );
        }
    }

    /// Register an adapter, replacing any existing one under the same key
    pub fn register(&self, key: impl Into<String>, factory: AdapterFactory) {
        let key = key.into();
        debug!(adapter = %key, "Registering southbound adapter");
        self.adapters.write().insert(key, factory);
    }

    /// Registered adapter keys, sorted
    pub fn adapters(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.adapters.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn probe_order(&self) -> &[A1Dialect] {
        &self.probe_order
    }

    fn create(&self, key: &str, node: &Arc<Node>) -> A1Result<Arc<dyn A1Client>> {
        let factory = self
            .adapters
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| A1Error::UnknownAdapter(key.to_string()))?;
        factory(node, &self.http)
    }

    async fn probe(&self, node: &Arc<Node>) -> A1Result<Arc<dyn A1Client>> {
        for dialect in &self.probe_order {
            let client = self.create(dialect.as_str(), node)?;
            match client.get_policy_type_identities().await {
                Ok(_) => {
                    info!(node_id = %node.id(), dialect = %dialect, "Detected A1 dialect");
                    node.set_dialect(Some(*dialect));
                    return Ok(client);
                }
                Err(e) => {
                    debug!(node_id = %node.id(), dialect = %dialect, error = %e, "Dialect probe failed");
                }
            }
        }
        Err(A1Error::NoDialect {
            node_id: node.id().to_string(),
        })
    }
}

#[async_trait]
impl ClientProvider for A1ClientFactory {
    async fn client_for(&self, node: &Arc<Node>) -> A1Result<Arc<dyn A1Client>> {
        if let Some(adapter) = &node.config().adapter {
            return self.create(adapter, node);
        }
        if let Some(dialect) = node.dialect() {
            return self.create(dialect.as_str(), node);
        }
        self.probe(node).await
    }
}

impl std::fmt::Debug for A1ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("A1ClientFactory")
            .field("adapters", &self.adapters())
            .field("probe_order", &self.probe_order)
            .finish()
    }
}
