//! Gateway error taxonomy

use std::time::Duration;

use uuid::Uuid;

/// Errors raised by the pool, transports and lifecycle manager.
///
/// Protocol errors (unknown method, malformed tool name) never appear here;
/// the proxy layer produces those directly as JSON-RPC error objects.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Bad or missing connector parameters. Not retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Spawn or handshake failure
    #[error("MCP connection failed: {0}")]
    Connect(String),

    /// No live handle in the pool for this connection
    #[error("Connection not active: {0}")]
    NotActive(Uuid),

    #[error("{0}")]
    NotFound(String),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// The backend rejected a request at the protocol level
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Whether the error means the target session or connection is not there
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::NotActive(_) | Self::NotFound(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
