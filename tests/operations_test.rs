//! Request-side policy and service operations against in-memory nodes

use a1pms::{ErrorStatus, PmsApp, PmsConfig, PutOutcome, PutPolicy};
use a1pms_connect::testing::{FakeClientProvider, RecordingNotifier};
use a1pms_core_lock::LockType;
use a1pms_core_registry::{MemoryStore, NodeConfig, NodeState, PolicyType};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    app: PmsApp,
    provider: Arc<FakeClientProvider>,
}

/// Two AVAILABLE nodes; ric1 supports t1, ric2 supports t1 and t2
async fn fixture() -> Fixture {
    a1pms::logging::init_test_logging();

    let mut config = PmsConfig::default();
    config.nodes.push(NodeConfig::new("ric1", "http://ric1"));
    config.nodes.push(NodeConfig::new("ric2", "http://ric2"));

    let provider = Arc::new(FakeClientProvider::new());
    let app = PmsApp::with_parts(
        config,
        Arc::new(MemoryStore::new()),
        provider.clone(),
        Arc::new(RecordingNotifier::new()),
    );

    let ctx = app.context();
    for id in ["t1", "t2"] {
        ctx.policy_types
            .put(Arc::new(PolicyType::new(id, "{}")))
            .await;
    }
    let ric1 = ctx.nodes.get("ric1").unwrap();
    ric1.set_supported_types(vec!["t1".to_string()]);
    ric1.set_state(NodeState::Available);
    let ric2 = ctx.nodes.get("ric2").unwrap();
    ric2.set_supported_types(vec!["t1".to_string(), "t2".to_string()]);
    ric2.set_state(NodeState::Available);

    Fixture { app, provider }
}

fn request(policy_id: &str, node_id: &str, type_id: &str) -> PutPolicy {
    PutPolicy {
        policy_id: policy_id.to_string(),
        node_id: node_id.to_string(),
        policy_type_id: type_id.to_string(),
        service_id: "svc1".to_string(),
        json: r#"{"threshold":1}"#.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_put_creates_then_updates() {
    let f = fixture().await;
    let ops = f.app.operations();

    let created = ops.put_policy(request("p1", "ric1", "t1")).await.unwrap();
    assert_eq!(created, PutOutcome::Created);

    let mut update = request("p1", "ric1", "t1");
    update.json = r#"{"threshold":2}"#.to_string();
    assert_eq!(ops.put_policy(update).await.unwrap(), PutOutcome::Updated);

    let remote = f.provider.client("ric1");
    assert_eq!(
        remote.policy_json("p1").as_deref(),
        Some(r#"{"threshold":2}"#)
    );
    assert_eq!(ops.get_policy("p1").unwrap().json, r#"{"threshold":2}"#);
    assert_eq!(
        f.app.context().nodes.get("ric1").unwrap().lock().holder_count(),
        0
    );
}

#[tokio::test]
async fn test_put_rejected_unless_available() {
    let f = fixture().await;
    let ric1 = f.app.context().nodes.get("ric1").unwrap();

    for state in [
        NodeState::Unavailable,
        NodeState::Synchronizing,
        NodeState::ConsistencyCheck,
    ] {
        ric1.set_state(state);
        let err = f
            .app
            .operations()
            .put_policy(request("p1", "ric1", "t1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), ErrorStatus::Locked, "state {}", state);
    }
    assert_eq!(f.provider.client("ric1").put_calls(), 0);
    assert_eq!(ric1.lock().holder_count(), 0);
}

#[tokio::test]
async fn test_put_unknown_node_or_type() {
    let f = fixture().await;
    let ops = f.app.operations();

    let err = ops.put_policy(request("p1", "nope", "t1")).await.unwrap_err();
    assert_eq!(err.status(), ErrorStatus::NotFound);

    let err = ops.put_policy(request("p1", "ric1", "nope")).await.unwrap_err();
    assert_eq!(err.status(), ErrorStatus::NotFound);
}

#[tokio::test]
async fn test_put_unsupported_type_is_bad_request() {
    let f = fixture().await;
    let err = f
        .app
        .operations()
        .put_policy(request("p1", "ric1", "t2"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), ErrorStatus::BadRequest);
}

#[tokio::test]
async fn test_moving_policy_between_nodes_conflicts() {
    let f = fixture().await;
    let ops = f.app.operations();
    ops.put_policy(request("p1", "ric1", "t1")).await.unwrap();

    let err = ops.put_policy(request("p1", "ric2", "t1")).await.unwrap_err();
    assert_eq!(err.status(), ErrorStatus::Conflict);
    assert!(f.provider.client("ric2").policy_ids().is_empty());
}

#[tokio::test]
async fn test_remote_refusal_leaves_registry_unchanged() {
    let f = fixture().await;
    f.provider.client("ric1").set_fail_puts(true);

    let err = f
        .app
        .operations()
        .put_policy(request("p1", "ric1", "t1"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), ErrorStatus::BadGateway);
    assert!(!f.app.context().policies.contains("p1"));
}

#[tokio::test]
async fn test_delete_policy() {
    let f = fixture().await;
    let ops = f.app.operations();
    ops.put_policy(request("p1", "ric1", "t1")).await.unwrap();

    ops.delete_policy("p1").await.unwrap();
    assert!(!f.app.context().policies.contains("p1"));
    assert!(f.provider.client("ric1").policy_ids().is_empty());

    let err = ops.delete_policy("p1").await.unwrap_err();
    assert_eq!(err.status(), ErrorStatus::NotFound);
}

#[tokio::test]
async fn test_mutation_waits_for_exclusive_holder() {
    let f = fixture().await;
    let ric1 = f.app.context().nodes.get("ric1").unwrap();
    let grant = ric1.lock().acquire(LockType::Exclusive).await.unwrap();

    let ops = f.app.operations().clone();
    let put = tokio::spawn(async move { ops.put_policy(request("p1", "ric1", "t1")).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!put.is_finished());
    assert_eq!(f.provider.client("ric1").put_calls(), 0);

    grant.unlock();
    let outcome = put.await.unwrap().unwrap();
    assert_eq!(outcome, PutOutcome::Created);
}

#[tokio::test]
async fn test_shared_mutations_run_together() {
    let f = fixture().await;
    f.provider
        .client("ric1")
        .set_delay(Some(Duration::from_millis(50)));
    let ops = f.app.operations();

    let (a, b) = tokio::join!(
        ops.put_policy(request("p1", "ric1", "t1")),
        ops.put_policy(request("p2", "ric1", "t1"))
    );
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(f.app.context().policies.ids_for_node("ric1").len(), 2);
}

#[tokio::test]
async fn test_service_lifecycle() {
    let f = fixture().await;
    let ops = f.app.operations();

    let outcome = ops
        .register_service("svc1", Duration::from_secs(60), None)
        .await
        .unwrap();
    assert_eq!(outcome, PutOutcome::Created);
    let outcome = ops
        .register_service(
            "svc1",
            Duration::from_secs(120),
            Some("http://svc1/cb".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(outcome, PutOutcome::Updated);
    ops.keep_alive("svc1").unwrap();

    ops.put_policy(request("p1", "ric1", "t1")).await.unwrap();
    ops.put_policy(request("p2", "ric2", "t2")).await.unwrap();

    let cascade = ops.deregister_service("svc1").await.unwrap();
    assert_eq!(cascade.policies_removed, 2);
    assert_eq!(cascade.remote_delete_failures, 0);
    assert!(f.app.context().policies.list().is_empty());
    assert!(f.provider.client("ric2").policy_ids().is_empty());

    assert_eq!(
        ops.keep_alive("svc1").unwrap_err().status(),
        ErrorStatus::NotFound
    );
    assert_eq!(
        ops.deregister_service("svc1").await.unwrap_err().status(),
        ErrorStatus::NotFound
    );
}

#[tokio::test]
async fn test_service_registration_validation() {
    let f = fixture().await;
    let ops = f.app.operations();

    let err = ops
        .register_service("", Duration::from_secs(1), None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), ErrorStatus::BadRequest);

    let err = ops
        .register_service("svc", Duration::from_secs(1), Some("::bad".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), ErrorStatus::BadRequest);
}

#[tokio::test]
async fn test_read_helpers() {
    let f = fixture().await;
    let ops = f.app.operations();
    ops.put_policy(request("p1", "ric1", "t1")).await.unwrap();
    ops.put_policy(request("p2", "ric2", "t1")).await.unwrap();
    ops.put_policy(request("p3", "ric2", "t2")).await.unwrap();

    let ids = |policies: Vec<Arc<a1pms_core_registry::Policy>>| {
        policies.iter().map(|p| p.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(ops.policies_for(Some("t1"), None, None)), vec!["p1", "p2"]);
    assert_eq!(ids(ops.policies_for(None, Some("ric2"), None)), vec!["p2", "p3"]);
    assert_eq!(ids(ops.policies_for(None, None, Some("svc1"))).len(), 3);

    assert_eq!(ops.policy_types(None, None).unwrap().len(), 2);
    let err = ops.policy_types(None, Some("1.0.0")).unwrap_err();
    assert_eq!(err.status(), ErrorStatus::BadRequest);
}

#[tokio::test]
async fn test_node_for_managed_element() {
    a1pms::logging::init_test_logging();
    let mut config = PmsConfig::default();
    let mut ric = NodeConfig::new("ric1", "http://ric1");
    ric.managed_element_ids = vec!["me1".to_string()];
    config.nodes.push(ric);

    let app = PmsApp::with_parts(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(FakeClientProvider::new()),
        Arc::new(RecordingNotifier::new()),
    );
    assert_eq!(
        app.operations().node_for_managed_element("me1").unwrap().id(),
        "ric1"
    );
    assert_eq!(
        app.operations()
            .node_for_managed_element("me9")
            .unwrap_err()
            .status(),
        ErrorStatus::NotFound
    );
}
