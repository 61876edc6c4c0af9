//! Backend connection management
//!
//! - **ConnectionPool**: live handles keyed by connection ID
//! - **TransportFactory**: creates handles over stdio, SSE or streamable HTTP
//! - **ConnectionService**: connection record lifecycle on top of both

mod client;
mod connection;
mod registry;
pub mod transport;

pub use client::{BackendClient, McpClient, McpClientHandler, RmcpBackend};
pub use connection::{ConnectionService, DEFAULT_CALL_TIMEOUT, DEFAULT_LIST_TIMEOUT};
pub use registry::{ConnectionPool, PoolStats, DEFAULT_CLOSE_TIMEOUT};
pub use transport::{ClientFactory, ResolvedTransport, Transport, TransportFactory};
