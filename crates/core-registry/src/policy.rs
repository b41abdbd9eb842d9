//! Policy instances and their indexed registry

use crate::error::{EntityKind, RegistryError, RegistryResult, RejectStatus};
use crate::node::{Node, Nodes};
use crate::policy_type::{PolicyType, PolicyTypes};
use crate::storage::{object_name, DataStore};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PREFIX: &str = "policies";

/// A configuration instance applied to one node
#[derive(Debug, Clone)]
pub struct Policy {
    pub id: String,
    pub policy_type: Arc<PolicyType>,
    pub node: Arc<Node>,
    /// Owning service; empty when unowned
    pub owner_service_id: String,
    /// Opaque JSON payload
    pub json: String,
    /// Transient policies are never persisted and are dropped on resync
    pub is_transient: bool,
    pub status_notification_uri: Option<String>,
    pub last_modified: DateTime<Utc>,
}

impl Policy {
    pub fn new(
        id: impl Into<String>,
        policy_type: Arc<PolicyType>,
        node: Arc<Node>,
        json: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            policy_type,
            node,
            owner_service_id: String::new(),
            json: json.into(),
            is_transient: false,
            status_notification_uri: None,
            last_modified: Utc::now(),
        }
    }

    pub fn with_owner(mut self, service_id: impl Into<String>) -> Self {
        self.owner_service_id = service_id.into();
        self
    }

    pub fn transient(mut self, is_transient: bool) -> Self {
        self.is_transient = is_transient;
        self
    }

    pub fn with_status_notification(mut self, uri: impl Into<String>) -> Self {
        self.status_notification_uri = Some(uri.into());
        self
    }

    pub fn node_id(&self) -> &str {
        self.node.id()
    }

    pub fn type_id(&self) -> &str {
        &self.policy_type.id
    }

    pub fn to_record(&self) -> PolicyRecord {
        PolicyRecord {
            id: self.id.clone(),
            policy_type_id: self.policy_type.id.clone(),
            node_id: self.node.id().to_string(),
            owner_service_id: self.owner_service_id.clone(),
            json: self.json.clone(),
            status_notification_uri: self.status_notification_uri.clone(),
            last_modified: self.last_modified,
        }
    }

    /// Rebuild a policy from a persisted record
    pub fn from_record(
        record: PolicyRecord,
        nodes: &Nodes,
        types: &PolicyTypes,
    ) -> RegistryResult<Self> {
        let node = nodes.get(&record.node_id)?;
        let policy_type = types.get(&record.policy_type_id)?;
        Ok(Self {
            id: record.id,
            policy_type,
            node,
            owner_service_id: record.owner_service_id,
            json: record.json,
            is_transient: false,
            status_notification_uri: record.status_notification_uri,
            last_modified: record.last_modified,
        })
    }
}

/// Durable form of a non-transient [`Policy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub id: String,
    pub policy_type_id: String,
    pub node_id: String,
    #[serde(default)]
    pub owner_service_id: String,
    pub json: String,
    #[serde(default)]
    pub status_notification_uri: Option<String>,
    pub last_modified: DateTime<Utc>,
}

type Bucket = HashMap<String, Arc<Policy>>;

/// Primary map plus the three secondary indices.
///
/// Every entry in `by_id` appears in exactly one bucket of each secondary
/// index, and nothing else does.
#[derive(Default)]
struct PolicyIndex {
    by_id: HashMap<String, Arc<Policy>>,
    by_node: HashMap<String, Bucket>,
    by_service: HashMap<String, Bucket>,
    by_type: HashMap<String, Bucket>,
}

impl PolicyIndex {
    fn insert(&mut self, policy: Arc<Policy>) -> Option<Arc<Policy>> {
        let previous = self.remove(&policy.id);
        Self::add(&mut self.by_node, policy.node_id(), &policy);
        Self::add(&mut self.by_service, &policy.owner_service_id, &policy);
        Self::add(&mut self.by_type, policy.type_id(), &policy);
        self.by_id.insert(policy.id.clone(), policy);
        previous
    }

    fn remove(&mut self, id: &str) -> Option<Arc<Policy>> {
        let policy = self.by_id.remove(id)?;
        Self::drop_from(&mut self.by_node, policy.node_id(), id);
        Self::drop_from(&mut self.by_service, &policy.owner_service_id, id);
        Self::drop_from(&mut self.by_type, policy.type_id(), id);
        Some(policy)
    }

    fn add(index: &mut HashMap<String, Bucket>, key: &str, policy: &Arc<Policy>) {
        index
            .entry(key.to_string())
            .or_default()
            .insert(policy.id.clone(), Arc::clone(policy));
    }

    fn drop_from(index: &mut HashMap<String, Bucket>, key: &str, id: &str) {
        if let Some(bucket) = index.get_mut(key) {
            bucket.remove(id);
            if bucket.is_empty() {
                index.remove(key);
            }
        }
    }

    fn bucket(index: &HashMap<String, Bucket>, key: &str) -> Vec<Arc<Policy>> {
        let mut policies: Vec<Arc<Policy>> = index
            .get(key)
            .map(|bucket| bucket.values().cloned().collect())
            .unwrap_or_default();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        policies
    }
}

/// Registry of policy instances
pub struct Policies {
    index: Mutex<PolicyIndex>,
    /// Held across an index change and its store write so records land in index order
    writes: tokio::sync::Mutex<()>,
    store: Arc<dyn DataStore>,
}

impl Policies {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self {
            index: Mutex::new(PolicyIndex::default()),
            writes: tokio::sync::Mutex::new(()),
            store,
        }
    }

    /// Create or update a policy.
    ///
    /// An update must keep the policy on the same node; moving it is rejected
    /// with a conflict. Returns the replaced policy, if any.
    pub async fn put(&self, policy: Arc<Policy>) -> RegistryResult<Option<Arc<Policy>>> {
        let _writes = self.writes.lock().await;
        let previous = {
            let mut index = self.index.lock();
            if let Some(existing) = index.by_id.get(&policy.id) {
                if existing.node_id() != policy.node_id() {
                    return Err(RegistryError::rejected(
                        RejectStatus::Conflict,
                        format!(
                            "policy {} belongs to node {}, not {}",
                            policy.id,
                            existing.node_id(),
                            policy.node_id()
                        ),
                    ));
                }
            }
            index.insert(Arc::clone(&policy))
        };

        if policy.is_transient {
            if previous.as_ref().is_some_and(|p| !p.is_transient) {
                self.forget(&policy.id).await;
            }
        } else {
            self.persist(&policy).await;
        }

        debug!(policy_id = %policy.id, node_id = %policy.node_id(), "Policy stored");
        Ok(previous)
    }

    pub fn get(&self, id: &str) -> RegistryResult<Arc<Policy>> {
        self.find(id)
            .ok_or_else(|| RegistryError::not_found(EntityKind::Policy, id))
    }

    pub fn find(&self, id: &str) -> Option<Arc<Policy>> {
        self.index.lock().by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.lock().by_id.contains_key(id)
    }

    pub fn get_for_node(&self, node_id: &str) -> Vec<Arc<Policy>> {
        PolicyIndex::bucket(&self.index.lock().by_node, node_id)
    }

    pub fn get_for_service(&self, service_id: &str) -> Vec<Arc<Policy>> {
        PolicyIndex::bucket(&self.index.lock().by_service, service_id)
    }

    pub fn get_for_type(&self, type_id: &str) -> Vec<Arc<Policy>> {
        PolicyIndex::bucket(&self.index.lock().by_type, type_id)
    }

    /// Ids of every policy on a node, transient ones included
    pub fn ids_for_node(&self, node_id: &str) -> Vec<String> {
        self.index
            .lock()
            .by_node
            .get(node_id)
            .map(|bucket| bucket.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Policies matching every given criterion, ordered by id
    pub fn filter(
        &self,
        type_id: Option<&str>,
        node_id: Option<&str>,
        service_id: Option<&str>,
    ) -> Vec<Arc<Policy>> {
        let mut policies: Vec<Arc<Policy>> = self
            .index
            .lock()
            .by_id
            .values()
            .filter(|p| type_id.map_or(true, |t| p.type_id() == t))
            .filter(|p| node_id.map_or(true, |n| p.node_id() == n))
            .filter(|p| service_id.map_or(true, |s| p.owner_service_id == s))
            .cloned()
            .collect();
        policies.sort_by(|a, b| a.id.cmp(&b.id));
        policies
    }

    /// Remove a policy and its durable record
    pub async fn remove(&self, policy: &Policy) -> Option<Arc<Policy>> {
        self.remove_by_id(&policy.id).await
    }

    pub async fn remove_by_id(&self, id: &str) -> Option<Arc<Policy>> {
        let _writes = self.writes.lock().await;
        let removed = self.index.lock().remove(id)?;
        if !removed.is_transient {
            self.forget(id).await;
        }
        debug!(policy_id = %id, node_id = %removed.node_id(), "Policy removed");
        Some(removed)
    }

    /// Remove every policy on a node
    pub async fn remove_for_node(&self, node_id: &str) -> Vec<Arc<Policy>> {
        let _writes = self.writes.lock().await;
        let removed = self.take_all(|index| {
            index
                .by_node
                .get(node_id)
                .map(|b| b.keys().cloned().collect())
                .unwrap_or_default()
        });
        self.forget_all(&removed).await;
        if !removed.is_empty() {
            info!(node_id = %node_id, count = removed.len(), "Removed policies of node");
        }
        removed
    }

    /// Remove every policy owned by a service
    pub async fn remove_for_service(&self, service_id: &str) -> Vec<Arc<Policy>> {
        let _writes = self.writes.lock().await;
        let removed = self.take_all(|index| {
            index
                .by_service
                .get(service_id)
                .map(|b| b.keys().cloned().collect())
                .unwrap_or_default()
        });
        self.forget_all(&removed).await;
        removed
    }

    /// Drop every policy from memory; durable records are left alone
    pub fn clear(&self) {
        *self.index.lock() = PolicyIndex::default();
    }

    pub fn size(&self) -> usize {
        self.index.lock().by_id.len()
    }

    pub fn list(&self) -> Vec<Arc<Policy>> {
        self.filter(None, None, None)
    }

    /// Reload persisted policies.
    ///
    /// Records naming an unknown node or type are skipped. Must run after
    /// nodes and types are in place.
    pub async fn restore(&self, nodes: &Nodes, types: &PolicyTypes) -> usize {
        let names = match self.store.list_objects(PREFIX).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to list persisted policies");
                return 0;
            }
        };

        let mut restored = 0;
        for name in names {
            let record = match self.store.read_object(&name).await {
                Ok(data) => match serde_json::from_slice::<PolicyRecord>(&data) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(object = %name, error = %e, "Skipping corrupt policy record");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(object = %name, error = %e, "Failed to read persisted policy");
                    continue;
                }
            };

            let policy_id = record.id.clone();
            match Policy::from_record(record, nodes, types) {
                Ok(policy) => {
                    self.index.lock().insert(Arc::new(policy));
                    restored += 1;
                }
                Err(e) => warn!(policy_id = %policy_id, error = %e, "Skipping persisted policy"),
            }
        }
        debug!(count = restored, "Restored policies");
        restored
    }

    fn take_all<F>(&self, select: F) -> Vec<Arc<Policy>>
    where
        F: FnOnce(&PolicyIndex) -> Vec<String>,
    {
        let mut index = self.index.lock();
        let ids = select(&*index);
        let mut removed: Vec<Arc<Policy>> =
            ids.iter().filter_map(|id| index.remove(id)).collect();
        removed.sort_by(|a, b| a.id.cmp(&b.id));
        removed
    }

    async fn persist(&self, policy: &Policy) {
        let name = object_name(PREFIX, &policy.id);
        match serde_json::to_vec(&policy.to_record()) {
            Ok(data) => {
                if let Err(e) = self.store.write_object(&name, &data).await {
                    warn!(policy_id = %policy.id, error = %e, "Failed to persist policy");
                }
            }
            Err(e) => warn!(policy_id = %policy.id, error = %e, "Failed to encode policy"),
        }
    }

    async fn forget(&self, id: &str) {
        if let Err(e) = self.store.delete_object(&object_name(PREFIX, id)).await {
            warn!(policy_id = %id, error = %e, "Failed to delete persisted policy");
        }
    }

    async fn forget_all(&self, removed: &[Arc<Policy>]) {
        for policy in removed.iter().filter(|p| !p.is_transient) {
            self.forget(&policy.id).await;
        }
    }

    #[cfg(test)]
    fn assert_indices_consistent(&self) {
        let index = self.index.lock();
        for secondary in [&index.by_node, &index.by_service, &index.by_type] {
            let total: usize = secondary.values().map(|b| b.len()).sum();
            assert_eq!(total, index.by_id.len());
            for bucket in secondary.values() {
                assert!(!bucket.is_empty());
                for id in bucket.keys() {
                    assert!(index.by_id.contains_key(id));
                }
            }
        }
    }
}

impl fmt::Debug for Policies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policies").field("size", &self.size()).finish()
    }
}
