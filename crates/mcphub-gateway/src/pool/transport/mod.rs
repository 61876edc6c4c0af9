//! Transport abstraction for backend connections
//!
//! Provides a Transport trait with one implementation per transport kind and
//! a factory that resolves a connector definition into a live handle. New
//! transports can be added without touching the lifecycle manager.

mod http;
pub mod resolution;
mod sse;
mod stdio;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcphub_core::{ConnectorSpec, TransportKind};
use tracing::{debug, info};

pub use http::StreamableHttpTransport;
pub use resolution::ResolvedTransport;
pub use sse::SseTransport;
pub use stdio::{configure_child_process_platform, StdioTransport};

use super::client::BackendClient;
use crate::error::GatewayResult;

/// Default handshake timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP connect timeout for network transports
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport trait for backend connections
///
/// Each implementation spawns or opens its channel, runs the `initialize`
/// handshake within its timeout, and hands back a live handle. A failed
/// attempt must not leave a process or socket behind.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self) -> GatewayResult<Arc<dyn BackendClient>>;

    fn transport_kind(&self) -> TransportKind;

    /// Get a description for logging
    fn description(&self) -> String;
}

/// Builds live handles from connector definitions
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn connect(
        &self,
        connector: &ConnectorSpec,
        env: &HashMap<String, String>,
    ) -> GatewayResult<Arc<dyn BackendClient>>;
}

/// Production factory over stdio, SSE and streamable HTTP
#[derive(Debug, Clone)]
pub struct TransportFactory {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Default for TransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Create a transport from a connector definition.
    ///
    /// Configuration problems (no command, blank or invalid URL) surface here,
    /// before anything is spawned.
    pub fn create(
        &self,
        connector: &ConnectorSpec,
        env: &HashMap<String, String>,
    ) -> GatewayResult<Box<dyn Transport>> {
        let resolved = resolution::resolve(connector, env)?;
        debug!(
            connector = %connector.name,
            transport = %resolved.transport_kind(),
            "[TransportFactory] Resolved transport"
        );

        let transport: Box<dyn Transport> = match resolved {
            ResolvedTransport::Stdio { command, args, env } => Box::new(StdioTransport::new(
                connector.name.clone(),
                command,
                args,
                env,
                self.connect_timeout,
            )),
            ResolvedTransport::Sse { url } => Box::new(SseTransport::new(
                connector.name.clone(),
                url,
                self.connect_timeout,
                self.request_timeout,
            )),
            ResolvedTransport::StreamableHttp { url } => {
                Box::new(StreamableHttpTransport::new(
                    connector.name.clone(),
                    url,
                    self.connect_timeout,
                    self.request_timeout,
                ))
            }
        };
        Ok(transport)
    }
}

#[async_trait]
impl ClientFactory for TransportFactory {
    async fn connect(
        &self,
        connector: &ConnectorSpec,
        env: &HashMap<String, String>,
    ) -> GatewayResult<Arc<dyn BackendClient>> {
        let transport = self.create(connector, env)?;
        info!(
            connector = %connector.name,
            transport = %transport.description(),
            "[TransportFactory] Connecting"
        );
        transport.connect().await
    }
}
