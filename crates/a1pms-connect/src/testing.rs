//! In-memory stand-ins for remote nodes and service callbacks
//!
//! Used by the tests of this crate and of the crates built on it. The fakes
//! record every call and can be told to fail.

use crate::client::{A1Client, ClientProvider};
use crate::error::{A1Error, A1Result};
use crate::notifier::ServiceNotifier;
use a1pms_core_registry::{Node, Policy};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct FakeRemote {
    types: BTreeMap<String, String>,
    policies: BTreeMap<String, String>,
    unreachable: bool,
    delete_all_failures: usize,
    fail_puts: bool,
    fail_deletes: bool,
    delay: Option<Duration>,
    delete_all_calls: usize,
    put_calls: usize,
    delete_calls: usize,
    schema_calls: usize,
}

/// A remote node kept in memory
pub struct FakeA1Client {
    node_id: String,
    remote: Mutex<FakeRemote>,
}

impl FakeA1Client {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            remote: Mutex::new(FakeRemote::default()),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn add_type(&self, type_id: &str, schema: &str) {
        self.remote
            .lock()
            .types
            .insert(type_id.to_string(), schema.to_string());
    }

    pub fn remove_type(&self, type_id: &str) {
        self.remote.lock().types.remove(type_id);
    }

    pub fn add_policy(&self, policy_id: &str, json: &str) {
        self.remote
            .lock()
            .policies
            .insert(policy_id.to_string(), json.to_string());
    }

    pub fn policy_ids(&self) -> Vec<String> {
        self.remote.lock().policies.keys().cloned().collect()
    }

    pub fn policy_json(&self, policy_id: &str) -> Option<String> {
        self.remote.lock().policies.get(policy_id).cloned()
    }

    pub fn type_ids(&self) -> Vec<String> {
        self.remote.lock().types.keys().cloned().collect()
    }

    /// Make every call fail as if the node were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.remote.lock().unreachable = unreachable;
    }

    /// Fail the next `times` delete-all requests
    pub fn fail_delete_all(&self, times: usize) {
        self.remote.lock().delete_all_failures = times;
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.remote.lock().fail_puts = fail;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.remote.lock().fail_deletes = fail;
    }

    /// Sleep this long inside every async call
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.remote.lock().delay = delay;
    }

    pub fn delete_all_calls(&self) -> usize {
        self.remote.lock().delete_all_calls
    }

    pub fn put_calls(&self) -> usize {
        self.remote.lock().put_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.remote.lock().delete_calls
    }

    pub fn schema_calls(&self) -> usize {
        self.remote.lock().schema_calls
    }

    fn unreachable(&self) -> A1Error {
        A1Error::Other(format!("node {} unreachable", self.node_id))
    }

    async fn pause(&self) {
        let delay = self.remote.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn take_all(&self) -> A1Result<Vec<String>> {
        let mut remote = self.remote.lock();
        remote.delete_all_calls += 1;
        if remote.unreachable {
            return Err(self.unreachable());
        }
        if remote.delete_all_failures > 0 {
            remote.delete_all_failures -= 1;
            return Err(A1Error::Status {
                node_id: self.node_id.clone(),
                status: 503,
                body: "injected delete-all failure".to_string(),
            });
        }
        Ok(std::mem::take(&mut remote.policies).into_keys().collect())
    }
}

#[async_trait]
impl A1Client for FakeA1Client {
    async fn get_policy_type_identities(&self) -> A1Result<Vec<String>> {
        self.pause().await;
        let remote = self.remote.lock();
        if remote.unreachable {
            return Err(self.unreachable());
        }
        Ok(remote.types.keys().cloned().collect())
    }

    async fn get_policy_identities(&self) -> A1Result<Vec<String>> {
        self.pause().await;
        let remote = self.remote.lock();
        if remote.unreachable {
            return Err(self.unreachable());
        }
        Ok(remote.policies.keys().cloned().collect())
    }

    async fn get_policy_type_schema(&self, type_id: &str) -> A1Result<String> {
        self.pause().await;
        let mut remote = self.remote.lock();
        remote.schema_calls += 1;
        if remote.unreachable {
            return Err(self.unreachable());
        }
        remote.types.get(type_id).cloned().ok_or_else(|| A1Error::Status {
            node_id: self.node_id.clone(),
            status: 404,
            body: format!("no policy type {}", type_id),
        })
    }

    async fn put_policy(&self, policy: &Policy) -> A1Result<String> {
        self.pause().await;
        let mut remote = self.remote.lock();
        remote.put_calls += 1;
        if remote.unreachable || remote.fail_puts {
            return Err(self.unreachable());
        }
        remote
            .policies
            .insert(policy.id.clone(), policy.json.clone());
        Ok(String::new())
    }

    async fn delete_policy(&self, policy: &Policy) -> A1Result<String> {
        self.pause().await;
        let mut remote = self.remote.lock();
        remote.delete_calls += 1;
        if remote.unreachable || remote.fail_deletes {
            return Err(self.unreachable());
        }
        remote.policies.remove(&policy.id);
        Ok(String::new())
    }

    fn delete_all_policies(&self) -> BoxStream<'_, A1Result<String>> {
        stream::once(async move {
            self.pause().await;
            self.take_all()
        })
        .flat_map(|deleted| match deleted {
            Ok(ids) => stream::iter(ids.into_iter().map(Ok)).boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        })
        .boxed()
    }
}

/// Hands out one [`FakeA1Client`] per node, creating them on first use
#[derive(Default)]
pub struct FakeClientProvider {
    clients: Mutex<HashMap<String, Arc<FakeA1Client>>>,
    failing: Mutex<HashSet<String>>,
    requests: AtomicUsize,
}

impl FakeClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fake behind `node_id`, created if needed
    pub fn client(&self, node_id: &str) -> Arc<FakeA1Client> {
        self.clients
            .lock()
            .entry(node_id.to_string())
            .or_insert_with(|| Arc::new(FakeA1Client::new(node_id)))
            .clone()
    }

    /// Make client acquisition itself fail for a node
    pub fn set_failing(&self, node_id: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(node_id.to_string());
        } else {
            set.remove(node_id);
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientProvider for FakeClientProvider {
    async fn client_for(&self, node: &Arc<Node>) -> A1Result<Arc<dyn A1Client>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(node.id()) {
            return Err(A1Error::NoDialect {
                node_id: node.id().to_string(),
            });
        }
        Ok(self.client(node.id()) as Arc<dyn A1Client>)
    }
}

/// Records every notification instead of sending it
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(callback_url, node_id)` pairs, in delivery order
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ServiceNotifier for RecordingNotifier {
    async fn notify_node_available(&self, callback_url: &str, node_id: &str) -> A1Result<()> {
        self.sent
            .lock()
            .push((callback_url.to_string(), node_id.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(A1Error::Other(format!("callback {} refused", callback_url)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_delete_all_failure_leaves_policies() {
        let fake = FakeA1Client::new("ric1");
        fake.add_policy("p1", "{}");
        fake.fail_delete_all(1);

        let first: A1Result<Vec<String>> = fake.delete_all_policies().try_collect().await;
        assert!(first.is_err());
        assert_eq!(fake.policy_ids(), vec!["p1"]);

        let second: Vec<String> = fake.delete_all_policies().try_collect().await.unwrap();
        assert_eq!(second, vec!["p1"]);
        assert!(fake.policy_ids().is_empty());
        assert_eq!(fake.delete_all_calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_failure_injection() {
        let provider = FakeClientProvider::new();
        let node = Arc::new(Node::new(a1pms_core_registry::NodeConfig::new(
            "ric1",
            "http://ric1",
        )));

        tokio_test::assert_ok!(provider.client_for(&node).await.map(|_| ()));
        provider.set_failing("ric1", true);
        tokio_test::assert_err!(provider.client_for(&node).await.map(|_| ()));
        assert_eq!(provider.requests(), 2);
    }
}
