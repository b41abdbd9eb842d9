//! Application wiring: restore, configuration refresh and supervision

use a1pms::{NodeConfigChange, PmsApp, PmsConfig, PutPolicy};
use a1pms_connect::testing::{FakeClientProvider, RecordingNotifier};
use a1pms_core_registry::{FileStore, MemoryStore, NodeConfig, NodeState, PolicyType};
use a1pms_sentinel::SupervisionPolicy;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn config_with(nodes: &[(&str, &str)]) -> PmsConfig {
    let mut config = PmsConfig::default();
    for (id, url) in nodes {
        config.nodes.push(NodeConfig::new(*id, *url));
    }
    config
}

fn app_on(dir: &Path, config: PmsConfig, provider: Arc<FakeClientProvider>) -> PmsApp {
    PmsApp::with_parts(
        config,
        Arc::new(FileStore::new(dir)),
        provider,
        Arc::new(RecordingNotifier::new()),
    )
}

async fn seed_policy(app: &PmsApp, policy_id: &str, node_id: &str, transient: bool) {
    let node = app.context().nodes.get(node_id).unwrap();
    node.set_supported_types(vec!["t1".to_string()]);
    node.set_state(NodeState::Available);
    app.operations()
        .put_policy(PutPolicy {
            policy_id: policy_id.to_string(),
            node_id: node_id.to_string(),
            policy_type_id: "t1".to_string(),
            service_id: "svc1".to_string(),
            json: "{}".to_string(),
            transient,
            status_notification_uri: None,
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_restore_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeClientProvider::new());
    let config = config_with(&[("ric1", "http://ric1")]);

    {
        let app = app_on(dir.path(), config.clone(), provider.clone());
        app.context()
            .policy_types
            .put(Arc::new(PolicyType::new("t1", "{}")))
            .await;
        app.operations()
            .register_service("svc1", Duration::from_secs(30), None)
            .await
            .unwrap();
        seed_policy(&app, "durable", "ric1", false).await;
        seed_policy(&app, "volatile", "ric1", true).await;
    }

    let app = app_on(dir.path(), config, provider);
    let stats = app.restore().await;
    assert_eq!(stats.policy_types, 1);
    assert_eq!(stats.services, 1);
    assert_eq!(stats.policies, 1);

    let restored = app.operations().get_policy("durable").unwrap();
    assert_eq!(restored.node_id(), "ric1");
    assert_eq!(restored.owner_service_id, "svc1");
    assert!(app.operations().get_policy("volatile").is_err());
    assert_eq!(
        app.context().nodes.get("ric1").unwrap().state(),
        NodeState::Unavailable
    );
}

#[tokio::test]
async fn test_restore_skips_policies_of_unconfigured_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(FakeClientProvider::new());

    {
        let app = app_on(
            dir.path(),
            config_with(&[("ric1", "http://ric1"), ("ric2", "http://ric2")]),
            provider.clone(),
        );
        app.context()
            .policy_types
            .put(Arc::new(PolicyType::new("t1", "{}")))
            .await;
        seed_policy(&app, "p1", "ric1", false).await;
        seed_policy(&app, "p2", "ric2", false).await;
    }

    let app = app_on(dir.path(), config_with(&[("ric1", "http://ric1")]), provider);
    let stats = app.restore().await;
    assert_eq!(stats.policies, 1);
    assert!(app.context().policies.contains("p1"));
    assert!(!app.context().policies.contains("p2"));
}

#[tokio::test]
async fn test_apply_node_config() {
    let provider = Arc::new(FakeClientProvider::new());
    let app = PmsApp::with_parts(
        config_with(&[("keep", "http://keep"), ("move", "http://old"), ("drop", "http://drop")]),
        Arc::new(MemoryStore::new()),
        provider,
        Arc::new(RecordingNotifier::new()),
    );
    app.context()
        .policy_types
        .put(Arc::new(PolicyType::new("t1", "{}")))
        .await;
    seed_policy(&app, "moved", "move", false).await;
    seed_policy(&app, "dropped", "drop", false).await;
    let kept = app.context().nodes.get("keep").unwrap();
    kept.set_state(NodeState::Available);

    let changes = app
        .apply_node_config(config_with(&[
            ("keep", "http://keep"),
            ("move", "http://new"),
            ("fresh", "http://fresh"),
        ]))
        .await
        .unwrap();
    assert_eq!(changes.len(), 3);
    assert!(changes.contains(&NodeConfigChange::Removed("drop".to_string())));

    let nodes = &app.context().nodes;
    assert!(nodes.find("drop").is_none());
    assert!(!app.context().policies.contains("dropped"));

    let moved = nodes.get("move").unwrap();
    assert_eq!(moved.base_url(), "http://new");
    assert_eq!(moved.state(), NodeState::Unavailable);
    let policy = app.context().policies.get("moved").unwrap();
    assert!(Arc::ptr_eq(&policy.node, &moved));

    assert_eq!(nodes.get("fresh").unwrap().state(), NodeState::Unavailable);
    assert!(Arc::ptr_eq(&nodes.get("keep").unwrap(), &kept));
    assert_eq!(kept.state(), NodeState::Available);
    assert_eq!(app.config().nodes.len(), 3);
}

#[tokio::test]
async fn test_invalid_refresh_is_rejected() {
    let app = PmsApp::with_parts(
        config_with(&[("ric1", "http://ric1")]),
        Arc::new(MemoryStore::new()),
        Arc::new(FakeClientProvider::new()),
        Arc::new(RecordingNotifier::new()),
    );
    let result = app
        .apply_node_config(config_with(&[("ric1", "http://a"), ("ric1", "http://b")]))
        .await;
    assert!(result.is_err());
    assert_eq!(app.context().nodes.get("ric1").unwrap().base_url(), "http://ric1");
}

#[tokio::test]
async fn test_supervisor_brings_configured_nodes_up() {
    let provider = Arc::new(FakeClientProvider::new());
    provider.client("ric1").add_type("t1", "{}");
    let mut config = config_with(&[("ric1", "http://ric1")]);
    config.supervision = SupervisionPolicy {
        node_interval_s: 1,
        service_interval_s: 1,
    };
    let app = PmsApp::with_parts(
        config,
        Arc::new(MemoryStore::new()),
        provider,
        Arc::new(RecordingNotifier::new()),
    );

    let handle = app.start_supervisor().unwrap();
    let node = app.context().nodes.get("ric1").unwrap();
    for _ in 0..500 {
        if node.state() == NodeState::Available {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(node.state(), NodeState::Available);
    assert!(node.supports_type("t1"));
    assert!(app.context().policy_types.find("t1").is_some());

    handle.shutdown().await;
}

#[test]
fn test_new_rejects_invalid_config() {
    let mut config = PmsConfig::default();
    config.supervision.node_interval_s = 0;
    assert!(PmsApp::new(config).is_err());
}
