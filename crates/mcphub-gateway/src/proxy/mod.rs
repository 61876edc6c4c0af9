//! MCP proxy sessions
//!
//! - **DirectProxyService**: one connector per session, tools passed through
//! - **UnifiedProxyService**: every enabled connector, tools namespaced as
//!   `connector__tool`
//! - **stream**: session event channels and their SSE lifecycle
//! - **enrichment**: per-tool argument rewriting before dispatch

mod direct;
pub mod enrichment;
pub mod jsonrpc;
pub mod stream;
mod unified;

pub use direct::{DirectProxyService, DirectSessionInfo, DIRECT_SERVER_NAME};
pub use enrichment::{ArgumentEnricher, EnricherRegistry, EnrichmentContext, NotionParentPageEnricher};
pub use jsonrpc::{error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use stream::{
    session_stream, CleanupGuard, SessionChannel, SessionHandle, StreamEvent,
    DEFAULT_SESSION_CEILING,
};
pub use unified::{
    temp_session_id, EnvLookup, UnifiedProxyService, UnifiedSessionInfo, UnifiedStatus,
    DEFAULT_LAZY_CONNECT_TIMEOUT, UNIFIED_SERVER_NAME,
};
