//! Gateway Server
//!
//! HTTP server exposing the unified and direct proxies over SSE streams plus
//! posted JSON-RPC messages. Self-contained with dependency injection.

mod config;
mod dependencies;
pub mod handlers;
pub mod logging_middleware;

pub use config::{GatewayConfig, ProxyTimeouts, DEFAULT_HOST, DEFAULT_PORT};
pub use dependencies::GatewayDependencies;
pub use handlers::{AppState, ANONYMOUS_USER, SESSION_ID_HEADER, USER_ID_HEADER};

use std::future::Future;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pool::{ClientFactory, ConnectionPool, ConnectionService, TransportFactory};
use crate::proxy::{DirectProxyService, UnifiedProxyService};

/// MCP Gateway Server
pub struct GatewayServer {
    config: GatewayConfig,
    connections: Arc<ConnectionService>,
    direct: Arc<DirectProxyService>,
    unified: Arc<UnifiedProxyService>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, dependencies: GatewayDependencies) -> Self {
        info!("[Gateway] Initializing with dependency injection...");
        let timeouts = &config.timeouts;

        let factory: Arc<dyn ClientFactory> = match dependencies.factory {
            Some(factory) => factory,
            None => Arc::new(
                TransportFactory::new()
                    .with_timeout(timeouts.handshake)
                    .with_request_timeout(timeouts.request),
            ),
        };

        let connections = Arc::new(
            ConnectionService::new(
                dependencies.catalog,
                dependencies.store,
                Arc::new(ConnectionPool::new()),
                factory,
            )
            .with_list_timeout(timeouts.list)
            .with_call_timeout(timeouts.call),
        );

        let direct = Arc::new(
            DirectProxyService::new(connections.clone(), dependencies.usage.clone())
                .with_session_ceiling(timeouts.session_ceiling),
        );
        let unified = Arc::new(
            UnifiedProxyService::new(connections.clone(), dependencies.usage)
                .with_session_ceiling(timeouts.session_ceiling)
                .with_connect_timeout(timeouts.lazy_connect),
        );

        info!("[Gateway] Services initialized successfully");

        Self {
            config,
            connections,
            direct,
            unified,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn connection_service(&self) -> Arc<ConnectionService> {
        self.connections.clone()
    }

    pub fn direct_proxy(&self) -> Arc<DirectProxyService> {
        self.direct.clone()
    }

    pub fn unified_proxy(&self) -> Arc<UnifiedProxyService> {
        self.unified.clone()
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let app_state = AppState {
            connections: self.connections.clone(),
            direct: self.direct.clone(),
            unified: self.unified.clone(),
            base_url: self.config.base_url(),
        };

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            // Unified proxy
            .route(
                "/mcp/sse",
                get(handlers::unified_stream).post(handlers::unified_message),
            )
            .route("/mcp/message", post(handlers::unified_message))
            .route("/mcp/status", get(handlers::unified_status))
            // Direct proxy
            .route("/api/v1/mcp/proxy/status", get(handlers::direct_status))
            .route("/api/v1/mcp/proxy/connectors", get(handlers::list_connectors))
            .route(
                "/api/v1/mcp/proxy/{connector}/sse",
                get(handlers::direct_stream),
            )
            .route(
                "/api/v1/mcp/proxy/{connector}/message",
                post(handlers::direct_message),
            )
            .with_state(app_state)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(
                logging_middleware::http_logging_middleware,
            ));

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Run until Ctrl-C, then end sessions and drain the pool
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on `listener` until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!("[Gateway] Starting on {}", addr);
        info!(
            "[Gateway] CORS: {}",
            if self.config.enable_cors {
                "enabled"
            } else {
                "disabled"
            }
        );

        let router = self.router();
        info!("[Gateway] Ready to accept connections");

        // Open streams keep their connections alive, so sessions must end
        // before graceful shutdown can finish
        let direct = self.direct.clone();
        let unified = self.unified.clone();
        let signal = async move {
            shutdown.await;
            direct.shutdown().await;
            unified.shutdown().await;
        };

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await;

        self.shutdown().await;
        served?;
        Ok(())
    }

    /// End every session and drain the pool. Failures are logged only.
    pub async fn shutdown(&self) {
        info!("[Gateway] Shutting down...");
        let direct = self.direct.shutdown().await;
        let unified = self.unified.shutdown().await;
        let drained = self.connections.disconnect_all().await;
        info!(
            direct_sessions = direct,
            unified_sessions = unified,
            drained_connections = drained,
            "[Gateway] Shutdown complete"
        );
    }

    /// Start the server in the background
    pub fn spawn(self) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("[Gateway] Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("[Gateway] Ctrl-C received");
}
