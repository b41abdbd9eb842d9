//! Integration tests for a1pms-connect
//!
//! These run the HTTP adapters against a mock node.

use a1pms_connect::{
    A1Client, A1ClientFactory, A1Error, ClientProvider, HttpA1Client, HttpServiceNotifier,
    ServiceNotifier,
};
use a1pms_core_registry::{A1Dialect, Node, NodeConfig, Policy, PolicyType};
use futures::TryStreamExt;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn node(base_url: &str) -> Arc<Node> {
    Arc::new(Node::new(NodeConfig::new("ric1", base_url)))
}

async fn mount_get(server: &MockServer, at: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_std_v2_reads() {
    let server = MockServer::start().await;
    mount_get(&server, "/A1-P/v2/policytypes", json!(["t1"])).await;
    mount_get(
        &server,
        "/A1-P/v2/policytypes/t1",
        json!({"policySchema": {"type": "object"}}),
    )
    .await;
    mount_get(&server, "/A1-P/v2/policytypes/t1/policies", json!(["p1", "p2"])).await;

    let client = HttpA1Client::new(reqwest::Client::new(), "ric1", server.uri(), A1Dialect::StdV2);

    assert_eq!(client.get_policy_type_identities().await.unwrap(), vec!["t1"]);
    assert_eq!(client.get_policy_identities().await.unwrap(), vec!["p1", "p2"]);

    let schema: serde_json::Value =
        serde_json::from_str(&client.get_policy_type_schema("t1").await.unwrap()).unwrap();
    assert_eq!(schema, json!({"type": "object"}));
}

#[tokio::test]
async fn test_osc_v1_schema_field() {
    let server = MockServer::start().await;
    mount_get(&server, "/a1-p/policytypes", json!([20008])).await;
    mount_get(
        &server,
        "/a1-p/policytypes/20008",
        json!({"name": "tsapolicy", "create_schema": {"type": "object"}}),
    )
    .await;

    let client = HttpA1Client::new(reqwest::Client::new(), "ric1", server.uri(), A1Dialect::OscV1);
    assert_eq!(client.get_policy_type_identities().await.unwrap(), vec!["20008"]);
    assert!(client.get_policy_type_schema("20008").await.is_ok());
}

#[tokio::test]
async fn test_put_and_delete_policy() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/A1-P/v2/policytypes/t1/policies/p1"))
        .and(body_json(json!({"threshold": 5})))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/A1-P/v2/policytypes/t1/policies/p1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let ric = node(&server.uri());
    let policy = Policy::new(
        "p1",
        Arc::new(PolicyType::new("t1", "{}")),
        ric,
        r#"{"threshold": 5}"#,
    );
    let client = HttpA1Client::new(reqwest::Client::new(), "ric1", server.uri(), A1Dialect::StdV2);

    client.put_policy(&policy).await.unwrap();
    // Deleting an already-deleted policy succeeds
    client.delete_policy(&policy).await.unwrap();
}

#[tokio::test]
async fn test_delete_all_policies_streams_ids() {
    let server = MockServer::start().await;
    mount_get(&server, "/A1-P/v2/policytypes", json!(["t1"])).await;
    mount_get(&server, "/A1-P/v2/policytypes/t1/policies", json!(["p1", "p2"])).await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let client = HttpA1Client::new(reqwest::Client::new(), "ric1", server.uri(), A1Dialect::StdV2);
    let deleted: Vec<String> = client.delete_all_policies().try_collect().await.unwrap();
    assert_eq!(deleted, vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let client = HttpA1Client::new(reqwest::Client::new(), "ric1", server.uri(), A1Dialect::StdV2);
    let err = client.get_policy_type_identities().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
    assert!(matches!(err, A1Error::Status { ref body, .. } if body == "busy"));

    let listing: Result<Vec<String>, A1Error> = client.delete_all_policies().try_collect().await;
    assert!(listing.is_err());
}

#[tokio::test]
async fn test_factory_probes_osc_when_std_missing() {
    let server = MockServer::start().await;
    mount_get(&server, "/a1-p/policytypes", json!([])).await;

    let factory = A1ClientFactory::new(reqwest::Client::new(), A1Dialect::ALL.to_vec());
    let ric = node(&server.uri());

    let client = factory.client_for(&ric).await.unwrap();
    assert!(client.get_policy_type_identities().await.unwrap().is_empty());
    assert_eq!(ric.dialect(), Some(A1Dialect::OscV1));
}

#[tokio::test]
async fn test_service_notification_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/callbacks/svc1"))
        .and(body_json(json!({"ric_id": "ric1", "event_type": "AVAILABLE"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = HttpServiceNotifier::new(reqwest::Client::new());
    let callback = format!("{}/callbacks/svc1", server.uri());
    notifier.notify_node_available(&callback, "ric1").await.unwrap();

    let refused = format!("{}/nowhere", server.uri());
    assert!(notifier.notify_node_available(&refused, "ric1").await.is_err());
}
