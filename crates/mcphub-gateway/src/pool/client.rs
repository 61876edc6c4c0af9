//! Live backend handles
//!
//! `BackendClient` is the capability every pooled handle exposes. The rmcp
//! implementation wraps a running client service; tests substitute fakes.

use async_trait::async_trait;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo, Implementation,
    JsonObject, Tool,
};
use rmcp::service::{Peer, RunningService};
use rmcp::RoleClient;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{GatewayError, GatewayResult};

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, McpClientHandler>;

/// Capability of a live backend connection
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// List every tool the backend exposes
    async fn list_tools(&self) -> GatewayResult<Vec<Tool>>;

    /// Invoke a tool by its bare name
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> GatewayResult<CallToolResult>;

    /// Close the transport. Calling it twice is a no-op.
    async fn close(&self) -> GatewayResult<()>;

    /// Short description for logging (e.g. `stdio:npx`)
    fn description(&self) -> String;
}

/// Client handler for backend connections
#[derive(Debug, Clone)]
pub struct McpClientHandler {
    info: ClientInfo,
}

impl McpClientHandler {
    pub fn new(connector_name: &str) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("mcphub-{}", connector_name),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("McpHub Gateway".to_string()),
                    icons: None,
                    website_url: None,
                    ..Default::default()
                },
                meta: None,
            },
        }
    }
}

impl rmcp::ClientHandler for McpClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }
}

/// rmcp-backed handle
///
/// The peer is cloned out of the running service so calls never contend
/// with `close`, which takes the service out of its slot.
pub struct RmcpBackend {
    description: String,
    peer: Peer<RoleClient>,
    client: Mutex<Option<McpClient>>,
    /// Stops helper tasks a transport runs beside the service
    transport_tasks: Option<CancellationToken>,
}

impl RmcpBackend {
    pub fn new(description: impl Into<String>, client: McpClient) -> Self {
        let peer = client.peer().clone();
        Self {
            description: description.into(),
            peer,
            client: Mutex::new(Some(client)),
            transport_tasks: None,
        }
    }

    pub fn with_transport_tasks(mut self, token: CancellationToken) -> Self {
        self.transport_tasks = Some(token);
        self
    }
}

impl Drop for RmcpBackend {
    fn drop(&mut self) {
        if let Some(token) = &self.transport_tasks {
            token.cancel();
        }
    }
}

#[async_trait]
impl BackendClient for RmcpBackend {
    async fn list_tools(&self) -> GatewayResult<Vec<Tool>> {
        self.peer
            .list_all_tools()
            .await
            .map_err(|e| GatewayError::Backend(format!("tools/list failed: {}", e)))
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> GatewayResult<CallToolResult> {
        debug!(backend = %self.description, tool = %name, "Calling tool");
        self.peer
            .call_tool(CallToolRequestParams {
                name: name.to_string().into(),
                arguments,
                task: None,
                meta: None,
            })
            .await
            .map_err(|e| GatewayError::Backend(format!("tools/call failed: {}", e)))
    }

    async fn close(&self) -> GatewayResult<()> {
        let client = self.client.lock().await.take();
        let cancelled = match client {
            Some(client) => {
                info!(backend = %self.description, "Closing backend connection");
                client.cancel().await.map(|_| ())
            }
            None => Ok(()),
        };
        // Helper tasks stop even when the service cancel fails
        if let Some(token) = &self.transport_tasks {
            token.cancel();
        }
        cancelled.map_err(|e| GatewayError::Internal(format!("Failed to cancel service: {}", e)))
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}
