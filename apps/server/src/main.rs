//! McpHub gateway binary
//!
//! Loads `.env`, reads `MCPHUB_*` configuration, loads the connector catalog
//! and serves until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use mcphub_core::InMemoryConnectorCatalog;
use mcphub_gateway::{GatewayConfig, GatewayDependencies, GatewayServer};
use tracing::{info, warn};

const LOG_PREFIX: &str = "mcphub";

/// Logs directory: `MCPHUB_LOG_DIR` or `<data dir>/mcphub/logs`
fn logs_dir(config: &GatewayConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("mcphub")
            .join("logs")
    })
}

/// Console plus daily rolling file. Falls back to console only if the log
/// directory is unusable.
fn init_tracing(config: &GatewayConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let logs_dir = logs_dir(config);
    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
    }

    // Creates files like: mcphub.2026-01-22.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(&logs_dir);

    let (file_layer, guard) = match file_appender {
        Ok(appender) => {
            let (non_blocking_file, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("Warning: File logging disabled: {}", e);
            (None, None)
        }
    };

    // RUST_LOG takes precedence
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mcphub_core=debug,mcphub_gateway=debug,mcphub=debug"));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    guard
}

async fn load_catalog(config: &GatewayConfig) -> anyhow::Result<InMemoryConnectorCatalog> {
    match &config.connectors_file {
        Some(path) => InMemoryConnectorCatalog::from_json_file(path)
            .await
            .with_context(|| format!("Failed to load connectors from {}", path.display())),
        None => {
            warn!("MCPHUB_CONNECTORS_FILE not set, starting with an empty catalog");
            Ok(InMemoryConnectorCatalog::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = GatewayConfig::from_env()?;
    let _guard = init_tracing(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting McpHub");

    let catalog = load_catalog(&config).await?;
    let server = GatewayServer::new(config, GatewayDependencies::in_memory(Arc::new(catalog)));
    server.run().await
}
