//! Managed nodes (Near-RT RICs) and their availability state

use crate::error::{EntityKind, RegistryError, RegistryResult};
use a1pms_core_lock::ResourceLock;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Availability of a node as seen by the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
    /// Initial state; the local view may be stale or inconsistent
    Unavailable,
    /// Normal operation; mutations permitted
    Available,
    /// Repair in progress; mutations rejected
    Synchronizing,
    /// Drift check in progress; mutations rejected
    ConsistencyCheck,
}

impl NodeState {
    /// Whether user-facing policy mutations may proceed
    pub fn accepts_mutations(&self) -> bool {
        matches!(self, NodeState::Available)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Unavailable => "UNAVAILABLE",
            NodeState::Available => "AVAILABLE",
            NodeState::Synchronizing => "SYNCHRONIZING",
            NodeState::ConsistencyCheck => "CONSISTENCY_CHECK",
        };
        f.write_str(name)
    }
}

/// Southbound protocol dialect spoken by a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum A1Dialect {
    /// O-RAN A1-P version 2
    #[serde(rename = "STD_V2")]
    StdV2,
    /// O-RAN SC pre-standard A1 mediator API
    #[serde(rename = "OSC_V1")]
    OscV1,
}

impl A1Dialect {
    pub const ALL: [A1Dialect; 2] = [A1Dialect::StdV2, A1Dialect::OscV1];

    pub fn as_str(&self) -> &'static str {
        match self {
            A1Dialect::StdV2 => "STD_V2",
            A1Dialect::OscV1 => "OSC_V1",
        }
    }
}

impl fmt::Display for A1Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for A1Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STD_V2" => Ok(A1Dialect::StdV2),
            "OSC_V1" => Ok(A1Dialect::OscV1),
            other => Err(format!("unknown A1 dialect: {}", other)),
        }
    }
}

/// Static description of a node, as registered by configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node id
    pub id: String,

    /// Base address of the node's southbound API (e.g. "http://ric1:8085")
    pub base_url: String,

    /// Managed elements (e.g. cells, E2 nodes) controlled by this node
    #[serde(default)]
    pub managed_element_ids: Vec<String>,

    /// Adapter plugin key; `None` means the dialect is auto-detected
    #[serde(default)]
    pub adapter: Option<String>,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            managed_element_ids: Vec::new(),
            adapter: None,
        }
    }
}

/// One managed remote controller.
///
/// State and supported types are written only by supervision and
/// synchronization; request handlers read them to accept or reject work.
pub struct Node {
    config: NodeConfig,
    state: RwLock<NodeState>,
    supported_types: RwLock<BTreeSet<String>>,
    dialect: RwLock<Option<A1Dialect>>,
    lock: ResourceLock,
}

impl Node {
    /// Create a node in [`NodeState::Unavailable`]
    pub fn new(config: NodeConfig) -> Self {
        let lock = ResourceLock::new(config.id.clone());
        Self {
            config,
            state: RwLock::new(NodeState::Unavailable),
            supported_types: RwLock::new(BTreeSet::new()),
            dialect: RwLock::new(None),
            lock,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        *self.state.read()
    }

    /// Set the availability state, returning the previous one
    pub fn set_state(&self, new_state: NodeState) -> NodeState {
        let previous = std::mem::replace(&mut *self.state.write(), new_state);
        if previous != new_state {
            info!(node_id = %self.config.id, from = %previous, to = %new_state, "Node state changed");
        }
        previous
    }

    /// Move to `new_state` only if currently in `expected`
    pub fn compare_and_set_state(&self, expected: NodeState, new_state: NodeState) -> bool {
        let mut state = self.state.write();
        if *state != expected {
            return false;
        }
        *state = new_state;
        drop(state);
        info!(node_id = %self.config.id, from = %expected, to = %new_state, "Node state changed");
        true
    }

    /// Snapshot of the supported policy-type ids, sorted
    pub fn supported_types(&self) -> Vec<String> {
        self.supported_types.read().iter().cloned().collect()
    }

    pub fn supports_type(&self, type_id: &str) -> bool {
        self.supported_types.read().contains(type_id)
    }

    /// Replace the supported-type set wholesale
    pub fn set_supported_types<I>(&self, type_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let replacement: BTreeSet<String> = type_ids.into_iter().collect();
        *self.supported_types.write() = replacement;
    }

    pub fn dialect(&self) -> Option<A1Dialect> {
        *self.dialect.read()
    }

    pub fn set_dialect(&self, dialect: Option<A1Dialect>) {
        *self.dialect.write() = dialect;
    }

    pub fn manages_element(&self, managed_element_id: &str) -> bool {
        self.config
            .managed_element_ids
            .iter()
            .any(|me| me == managed_element_id)
    }

    /// The node's resource lock
    pub fn lock(&self) -> &ResourceLock {
        &self.lock
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.config.id)
            .field("base_url", &self.config.base_url)
            .field("state", &self.state())
            .field("supported_types", &self.supported_types())
            .field("dialect", &self.dialect())
            .finish()
    }
}

/// Registry of managed nodes
#[derive(Debug, Default)]
pub struct Nodes {
    nodes: Mutex<HashMap<String, Arc<Node>>>,
}

impl Nodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, returning the one it replaced
    pub fn put(&self, node: Arc<Node>) -> Option<Arc<Node>> {
        let id = node.id().to_string();
        info!(node_id = %id, base_url = %node.base_url(), "Registering node");
        self.nodes.lock().insert(id, node)
    }

    pub fn get(&self, id: &str) -> RegistryResult<Arc<Node>> {
        self.find(id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Node, id))
    }

    pub fn find(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Node>> {
        let removed = self.nodes.lock().remove(id);
        if removed.is_some() {
            info!(node_id = %id, "Node removed");
        }
        removed
    }

    /// All nodes, ordered by id
    pub fn list(&self) -> Vec<Arc<Node>> {
        let mut nodes: Vec<Arc<Node>> = self.nodes.lock().values().cloned().collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }

    /// The node controlling a managed element
    pub fn find_by_managed_element(&self, managed_element_id: &str) -> Option<Arc<Node>> {
        self.nodes
            .lock()
            .values()
            .find(|node| node.manages_element(managed_element_id))
            .cloned()
    }

    pub fn size(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn clear(&self) {
        self.nodes.lock().clear();
    }
}
