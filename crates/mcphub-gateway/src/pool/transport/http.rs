//! HTTP transport for MCP servers
//!
//! Handles connecting to MCP servers over Streamable HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcphub_core::TransportKind;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use tracing::{error, info};
use url::Url;

use super::Transport;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::client::{BackendClient, McpClientHandler, RmcpBackend};

/// HTTP transport for Streamable HTTP MCP servers
pub struct StreamableHttpTransport {
    connector_name: String,
    url: Url,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl StreamableHttpTransport {
    pub fn new(
        connector_name: String,
        url: Url,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            connector_name,
            url,
            connect_timeout,
            request_timeout,
        }
    }

    fn build_http_client(&self) -> GatewayResult<reqwest::Client> {
        // No total request timeout: the server may hold a long-lived event
        // stream open on the same client. Per-call timeouts live upstream.
        reqwest::Client::builder()
            .connect_timeout(self.request_timeout)
            .build()
            .map_err(|e| {
                let err = format!("Failed to build HTTP client: {}", e);
                error!(connector = %self.connector_name, "{}", err);
                GatewayError::Connect(err)
            })
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn connect(&self) -> GatewayResult<Arc<dyn BackendClient>> {
        info!(
            connector = %self.connector_name,
            url = %self.url,
            "Connecting to Streamable HTTP server"
        );

        let client = self.build_http_client()?;
        let transport_config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        let transport = StreamableHttpClientTransport::with_client(client, transport_config);

        let client_handler = McpClientHandler::new(&self.connector_name);

        let connect_future = client_handler.serve(transport);
        match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => {
                info!(connector = %self.connector_name, "HTTP server connected");
                Ok(Arc::new(RmcpBackend::new(self.description(), client)))
            }
            Ok(Err(e)) => {
                let err = format!("HTTP connection failed: {}", e);
                error!(connector = %self.connector_name, "{}", err);
                Err(GatewayError::Connect(err))
            }
            Err(_) => {
                let err = format!("Connection timeout ({:?})", self.connect_timeout);
                error!(connector = %self.connector_name, "{}", err);
                Err(GatewayError::Connect(err))
            }
        }
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    fn description(&self) -> String {
        format!("http:{}", self.url)
    }
}
