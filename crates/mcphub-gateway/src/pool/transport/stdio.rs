//! STDIO transport for MCP servers
//!
//! Handles connecting to MCP servers that run as child processes
//! communicating over stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mcphub_core::TransportKind;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::Transport;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::client::{BackendClient, McpClientHandler, RmcpBackend};

/// Platform-specific child process isolation.
///
/// Windows: suppress the console window a console-subsystem child would get.
/// Unix: put the child in its own process group so terminal signals sent to
/// the gateway do not reach backend servers.
pub fn configure_child_process_platform(cmd: &mut Command) {
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(unix)]
    {
        cmd.process_group(0);
    }
}

/// STDIO transport for child process MCP servers
pub struct StdioTransport {
    connector_name: String,
    command: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    connect_timeout: Duration,
}

impl StdioTransport {
    pub fn new(
        connector_name: String,
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector_name,
            command,
            args,
            env,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> GatewayResult<Arc<dyn BackendClient>> {
        info!(
            connector = %self.connector_name,
            command = %self.command,
            args = ?self.args,
            "Connecting to STDIO server"
        );

        // Validate command exists
        let command_path = which::which(&self.command)
            .or_else(|_| which::which(format!("{}.exe", &self.command)))
            .map_err(|_| {
                let err = format!(
                    "Command not found: {}. Ensure it's installed and in PATH.",
                    self.command
                );
                error!(connector = %self.connector_name, "{}", err);
                GatewayError::Connect(err)
            })?;

        debug!(
            connector = %self.connector_name,
            path = ?command_path,
            "Found command"
        );

        let args = self.args.clone();
        let env = self.env.clone();

        // kill_on_drop: a handshake failure or timeout drops the transport,
        // which takes the child process down with it.
        let transport =
            TokioChildProcess::new(Command::new(&command_path).configure(move |cmd| {
                cmd.args(&args)
                    .envs(&env)
                    .stderr(Stdio::null())
                    .kill_on_drop(true);
                configure_child_process_platform(cmd);
            }))
            .map_err(|e| {
                let err = format!("Failed to spawn process: {}", e);
                error!(connector = %self.connector_name, "{}", err);
                GatewayError::Connect(err)
            })?;

        let client_handler = McpClientHandler::new(&self.connector_name);

        // Connect with timeout
        let connect_future = client_handler.serve(transport);
        let client = match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                let err = format!("MCP handshake failed: {}", e);
                error!(connector = %self.connector_name, "{}", err);
                return Err(GatewayError::Connect(err));
            }
            Err(_) => {
                let err = format!("Connection timeout ({:?})", self.connect_timeout);
                error!(connector = %self.connector_name, "{}", err);
                return Err(GatewayError::Connect(err));
            }
        };

        info!(connector = %self.connector_name, "STDIO server connected");

        Ok(Arc::new(RmcpBackend::new(self.description(), client)))
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
