//! STDIO transport failure tests
//!
//! Real child processes, no MCP server: these cover the paths where the
//! spawn or the handshake fails and nothing may be left behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcphub_core::{ConnectorSpec, TransportKind};
use mcphub_gateway::{ClientFactory, ConnectionService, GatewayError, TransportFactory};
use pretty_assertions::assert_eq;
use tests::async_helpers::with_timeout;
use tests::{ConnectionStatus, InMemoryConnectionStore, InMemoryConnectorCatalog};

fn factory() -> TransportFactory {
    TransportFactory::new().with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_missing_command_fails_before_spawn() {
    let connector = ConnectorSpec::stdio("ghost", "mcphub-definitely-not-installed");

    let result = factory().connect(&connector, &HashMap::new()).await;

    match result {
        Err(GatewayError::Connect(message)) => assert!(message.contains("Command not found")),
        Err(other) => panic!("expected connect error, got {other}"),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_stdio_without_command_is_configuration_error() {
    let connector = ConnectorSpec::new("empty", TransportKind::Stdio);

    let result = factory().connect(&connector, &HashMap::new()).await;
    assert!(matches!(result, Err(GatewayError::Configuration(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_exiting_before_handshake_fails() {
    // `true` exits immediately without speaking MCP
    let connector = ConnectorSpec::stdio("quitter", "true");

    let result = with_timeout(
        Duration::from_secs(10),
        factory().connect(&connector, &HashMap::new()),
    )
    .await;
    assert!(matches!(result, Err(GatewayError::Connect(_))));
}

#[cfg(unix)]
#[tokio::test(start_paused = true)]
async fn test_silent_process_times_out() {
    // `sleep` stays alive but never answers initialize
    let connector = ConnectorSpec::stdio("mute", "sleep").with_args("30");
    let factory = TransportFactory::new().with_timeout(Duration::from_secs(1));

    let result = factory.connect(&connector, &HashMap::new()).await;
    match result {
        Err(GatewayError::Connect(message)) => assert!(message.contains("timeout")),
        Err(other) => panic!("expected connect error, got {other}"),
        Ok(_) => panic!("connect should fail"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_failed_spawn_recorded_on_connection() {
    let connector = ConnectorSpec::stdio("quitter", "true");
    let catalog = Arc::new(InMemoryConnectorCatalog::new().with_connector(connector));
    let store = Arc::new(InMemoryConnectionStore::new());
    let connections = ConnectionService::new(
        catalog,
        store,
        Arc::new(mcphub_gateway::ConnectionPool::new()),
        Arc::new(factory()),
    );

    let result = with_timeout(
        Duration::from_secs(10),
        connections.connect_by_name("quitter", "alice", &HashMap::new()),
    )
    .await;
    assert!(result.is_err());

    let records = connections.user_connections("alice").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ConnectionStatus::Disconnected);
    assert!(records[0].last_error.is_some());
    assert_eq!(connections.pool().count(), 0);
}
