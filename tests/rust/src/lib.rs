//! Shared test utilities and fixtures for McpHub integration tests.

pub use mcphub_core::{
    ConnectionRecord, ConnectionStatus, ConnectorSpec, InMemoryConnectionStore,
    InMemoryConnectorCatalog, InMemoryUsageLog, ToolUsageRecord, TransportKind,
};

pub use mocks::{FailingUsageLogger, FakeBackend, FakeClientFactory};

pub use services::GatewayTestHarness;

/// Test fixture utilities
pub mod fixtures {
    use std::sync::Arc;

    use mcphub_core::ConnectorSpec;
    use mcphub_gateway::JsonRpcRequest;
    use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
    use serde_json::{json, Value};
    use uuid::Uuid;

    /// STDIO connector whose command is never spawned under the fake factory
    pub fn test_connector(name: &str) -> ConnectorSpec {
        ConnectorSpec::stdio(name, "npx")
            .with_args(format!("-y @test/{}", name))
            .with_description(format!("Test connector: {}", name))
    }

    pub fn disabled_connector(name: &str) -> ConnectorSpec {
        test_connector(name).with_enabled(false)
    }

    /// Tool with an empty object schema
    pub fn test_tool(name: &str, description: &str) -> Tool {
        let schema: JsonObject = serde_json::from_value(json!({
            "type": "object",
            "properties": {}
        }))
        .expect("static schema");
        Tool::new(name.to_string(), description.to_string(), Arc::new(schema))
    }

    pub fn text_result(text: &str) -> CallToolResult {
        CallToolResult::success(vec![Content::text(text)])
    }

    pub fn error_result(text: &str) -> CallToolResult {
        CallToolResult::error(vec![Content::text(text)])
    }

    pub fn args(value: Value) -> JsonObject {
        value.as_object().cloned().expect("arguments must be an object")
    }

    pub fn initialize(id: i64) -> JsonRpcRequest {
        JsonRpcRequest::new(
            id,
            "initialize",
            Some(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {},
                "clientInfo": { "name": "test-client", "version": "1.0.0" }
            })),
        )
    }

    pub fn tools_list(id: i64) -> JsonRpcRequest {
        JsonRpcRequest::new(id, "tools/list", None)
    }

    pub fn tools_call(id: i64, name: &str, arguments: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(
            id,
            "tools/call",
            Some(json!({ "name": name, "arguments": arguments })),
        )
    }

    /// Names of the tools in a `tools/list` result
    pub fn tool_names(result: &Value) -> Vec<String> {
        result["tools"]
            .as_array()
            .map(|tools| {
                tools
                    .iter()
                    .filter_map(|t| t["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Generate a random UUID string
    pub fn random_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Async test helpers
pub mod async_helpers {
    use std::time::Duration;
    use tokio::time::timeout;

    /// Run an async operation with a timeout
    pub async fn with_timeout<F, T>(duration: Duration, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        timeout(duration, f).await.expect("Operation timed out")
    }

    /// Poll `condition` until it holds or `DEFAULT_TIMEOUT` passes.
    ///
    /// Session cleanup runs on a spawned task, so assertions about it need
    /// to wait a little.
    pub async fn eventually<F>(mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    /// Default test timeout (5 seconds)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
