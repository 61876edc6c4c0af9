//! ConnectionService lifecycle tests
//!
//! - Connect success, failure and timeout, and what each leaves in the store and pool
//! - Idempotent disconnect
//! - Pass-through calls on live and dead connections
//! - Pool drain on shutdown

use std::collections::HashMap;
use std::time::Duration;

use mcphub_core::ConnectionStatus;
use mcphub_gateway::GatewayError;
use pretty_assertions::assert_eq;
use serde_json::json;
use tests::fixtures::{args, test_connector, text_result};
use tests::{FakeBackend, FakeClientFactory, GatewayTestHarness};
use uuid::Uuid;

fn harness() -> GatewayTestHarness {
    GatewayTestHarness::new(vec![test_connector("alpha"), test_connector("beta")])
}

// ============================================================================
// Connect
// ============================================================================

#[tokio::test]
async fn test_connect_by_name_registers_live_handle() {
    let harness = harness();

    let record = harness
        .connections
        .connect_by_name("alpha", "alice", &HashMap::new())
        .await
        .unwrap();

    assert_eq!(record.status, ConnectionStatus::Connected);
    assert_eq!(record.connector_name, "alpha");
    assert_eq!(record.user_id, "alice");
    assert!(record.connected_at.is_some());
    assert!(harness.pool.contains(&record.id));

    let stored = harness.record(&record.id).await;
    assert_eq!(stored.status, ConnectionStatus::Connected);
}

#[tokio::test]
async fn test_connect_by_id() {
    let connector = test_connector("alpha");
    let connector_id = connector.id;
    let harness = GatewayTestHarness::new(vec![connector]);

    let record = harness
        .connections
        .connect(&connector_id, "alice", &HashMap::new())
        .await
        .unwrap();
    assert_eq!(record.connector_id, connector_id);

    let missing = harness
        .connections
        .connect(&Uuid::new_v4(), "alice", &HashMap::new())
        .await;
    assert!(matches!(missing, Err(GatewayError::NotFound(_))));
}

#[tokio::test]
async fn test_connect_unknown_connector_is_not_found() {
    let harness = harness();

    let result = harness
        .connections
        .connect_by_name("missing", "alice", &HashMap::new())
        .await;

    assert!(matches!(result, Err(GatewayError::NotFound(_))));
    assert!(harness.records_for("alice").await.is_empty());
    assert_eq!(harness.factory.total_connects(), 0);
}

#[tokio::test]
async fn test_failed_connect_leaves_disconnected_record() {
    let harness = GatewayTestHarness::with_factory(
        vec![test_connector("broken")],
        FakeClientFactory::new().with_failing("broken"),
    );

    let result = harness
        .connections
        .connect_by_name("broken", "alice", &HashMap::new())
        .await;
    assert!(matches!(result, Err(GatewayError::Connect(_))));

    let records = harness.records_for("alice").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ConnectionStatus::Disconnected);
    assert!(records[0]
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("spawn failed"));
    assert_eq!(harness.pool.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_within_deadline_records_timeout() {
    let harness = GatewayTestHarness::with_factory(
        vec![test_connector("alpha")],
        FakeClientFactory::new().with_connect_delay(Duration::from_secs(60)),
    );
    let connector = test_connector("alpha");

    let result = harness
        .connections
        .connect_within(&connector, "alice", &HashMap::new(), Duration::from_secs(30))
        .await;

    assert!(matches!(result, Err(GatewayError::Timeout { operation: "connect", .. })));
    let records = harness.records_for("alice").await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ConnectionStatus::Disconnected);
    assert!(records[0]
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
    assert_eq!(harness.pool.count(), 0);
}

#[tokio::test]
async fn test_connect_passes_env_overlay() {
    let harness = harness();
    let mut env = HashMap::new();
    env.insert("API_TOKEN".to_string(), "secret".to_string());

    let record = harness
        .connections
        .connect_by_name("alpha", "alice", &env)
        .await
        .unwrap();

    assert_eq!(harness.factory.last_env("alpha"), Some(env));
    assert_eq!(record.env_config, json!({ "API_TOKEN": "secret" }));
}

#[tokio::test]
async fn test_each_connect_gets_a_fresh_record() {
    let harness = harness();
    let env = HashMap::new();

    let first = harness
        .connections
        .connect_by_name("alpha", "alice", &env)
        .await
        .unwrap();
    let second = harness
        .connections
        .connect_by_name("alpha", "alice", &env)
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(harness.pool.count(), 2);
    assert_eq!(harness.connections.user_connections("alice").await.unwrap().len(), 2);
}

// ============================================================================
// Disconnect
// ============================================================================

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let harness = harness();
    let record = harness
        .connections
        .connect_by_name("alpha", "alice", &HashMap::new())
        .await
        .unwrap();

    harness.connections.disconnect(&record.id).await.unwrap();
    harness.connections.disconnect(&record.id).await.unwrap();

    assert!(!harness.pool.contains(&record.id));
    assert_eq!(harness.factory.backend("alpha").close_count(), 1);

    let stored = harness.record(&record.id).await;
    assert_eq!(stored.status, ConnectionStatus::Disconnected);
    assert!(stored.connected_at.is_none());
}

#[tokio::test]
async fn test_disconnect_unknown_connection() {
    let harness = harness();
    let result = harness.connections.disconnect(&Uuid::new_v4()).await;
    assert!(matches!(result, Err(GatewayError::NotFound(_))));
}

#[tokio::test]
async fn test_disconnect_all_drains_pool() {
    let harness = harness();
    let env = HashMap::new();
    let a = harness
        .connections
        .connect_by_name("alpha", "alice", &env)
        .await
        .unwrap();
    let b = harness
        .connections
        .connect_by_name("beta", "bob", &env)
        .await
        .unwrap();

    let drained = harness.connections.disconnect_all().await;

    assert_eq!(drained, 2);
    assert_eq!(harness.pool.count(), 0);
    assert_eq!(harness.record(&a.id).await.status, ConnectionStatus::Disconnected);
    assert_eq!(harness.record(&b.id).await.status, ConnectionStatus::Disconnected);
    assert_eq!(harness.connections.disconnect_all().await, 0);
}

// ============================================================================
// Status and pass-through calls
// ============================================================================

#[tokio::test]
async fn test_status_requires_live_handle() {
    let harness = harness();
    let record = harness
        .connections
        .connect_by_name("alpha", "alice", &HashMap::new())
        .await
        .unwrap();

    let status = harness.connections.status(&record.id).await.unwrap();
    assert_eq!(status.status, ConnectionStatus::Connected);

    // Handle gone while the record still claims CONNECTED
    harness.pool.remove(&record.id);
    let result = harness.connections.status(&record.id).await;
    assert!(matches!(result, Err(GatewayError::NotActive(id)) if id == record.id));
}

#[tokio::test]
async fn test_list_and_call_through_live_handle() {
    let factory = FakeClientFactory::new().with_backend(
        "alpha",
        FakeBackend::new("alpha")
            .with_tool("search", "Search things")
            .with_result("search", text_result("3 hits")),
    );
    let harness = GatewayTestHarness::with_factory(vec![test_connector("alpha")], factory);
    let record = harness
        .connections
        .connect_by_name("alpha", "alice", &HashMap::new())
        .await
        .unwrap();

    let tools = harness.connections.list_tools(&record.id).await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "search");

    let result = harness
        .connections
        .call_tool(&record.id, "search", Some(args(json!({ "q": "rust" }))))
        .await
        .unwrap();
    assert_eq!(result.is_error, Some(false));

    let calls = harness.factory.backend("alpha").calls_to("search");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].arguments, Some(args(json!({ "q": "rust" }))));

    // Successful calls stamp last use
    assert!(harness.record(&record.id).await.last_used_at.is_some());
}

#[tokio::test]
async fn test_calls_on_disconnected_connection_are_not_active() {
    let harness = harness();
    let record = harness
        .connections
        .connect_by_name("alpha", "alice", &HashMap::new())
        .await
        .unwrap();
    harness.connections.disconnect(&record.id).await.unwrap();

    let list = harness.connections.list_tools(&record.id).await;
    assert!(matches!(list, Err(GatewayError::NotActive(_))));

    let call = harness.connections.call_tool(&record.id, "echo", None).await;
    assert!(matches!(call, Err(GatewayError::NotActive(_))));
}

#[tokio::test(start_paused = true)]
async fn test_list_tools_times_out() {
    let factory = FakeClientFactory::new().with_backend(
        "slow",
        FakeBackend::new("slow")
            .with_tool("echo", "Echo")
            .with_list_delay(Duration::from_secs(60)),
    );
    let catalog = vec![test_connector("slow")];
    let harness = GatewayTestHarness::with_factory(catalog, factory);
    let connections = mcphub_gateway::ConnectionService::new(
        harness.catalog.clone(),
        harness.store.clone(),
        harness.pool.clone(),
        harness.factory.clone(),
    )
    .with_list_timeout(Duration::from_secs(2));

    let record = connections
        .connect_by_name("slow", "alice", &HashMap::new())
        .await
        .unwrap();
    let result = connections.list_tools(&record.id).await;

    assert!(matches!(result, Err(GatewayError::Timeout { operation: "listTools", .. })));
}
