//! McpHub Gateway
//!
//! MCP gateway that provides:
//! - A pool of live backend connections over stdio, SSE and streamable HTTP
//! - Connection records with a DISCONNECTED / CONNECTED lifecycle
//! - A direct proxy exposing one connector per session
//! - A unified proxy aggregating every enabled connector as `connector__tool`
//! - Per-tool argument enrichment before dispatch

pub mod error;
pub mod logging;
pub mod pool;
pub mod proxy;
pub mod server;

pub use error::{GatewayError, GatewayResult};
pub use server::{GatewayConfig, GatewayDependencies, GatewayServer, ProxyTimeouts};

pub use pool::{
    BackendClient, ClientFactory, ConnectionPool, ConnectionService, McpClient, McpClientHandler,
    PoolStats, ResolvedTransport, RmcpBackend, Transport, TransportFactory,
};

pub use proxy::{
    ArgumentEnricher, DirectProxyService, EnricherRegistry, EnrichmentContext, JsonRpcRequest,
    JsonRpcResponse, SessionHandle, StreamEvent, UnifiedProxyService,
};
