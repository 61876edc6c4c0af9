//! Gateway configuration
//!
//! Defaults suit a local single-user gateway. `from_env` overlays
//! `MCPHUB_*` variables; invalid values are rejected rather than ignored.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};
use crate::pool::transport::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::pool::{DEFAULT_CALL_TIMEOUT, DEFAULT_LIST_TIMEOUT};
use crate::proxy::{DEFAULT_LAZY_CONNECT_TIMEOUT, DEFAULT_SESSION_CEILING};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8870;

pub const ENV_HOST: &str = "MCPHUB_HOST";
pub const ENV_PORT: &str = "MCPHUB_PORT";
pub const ENV_ENABLE_CORS: &str = "MCPHUB_ENABLE_CORS";
pub const ENV_CONNECTORS_FILE: &str = "MCPHUB_CONNECTORS_FILE";
pub const ENV_HANDSHAKE_TIMEOUT: &str = "MCPHUB_HANDSHAKE_TIMEOUT_SECS";
pub const ENV_LIST_TIMEOUT: &str = "MCPHUB_LIST_TIMEOUT_SECS";
pub const ENV_CALL_TIMEOUT: &str = "MCPHUB_CALL_TIMEOUT_SECS";
pub const ENV_SESSION_CEILING: &str = "MCPHUB_SESSION_CEILING_SECS";
pub const ENV_LOG_DIR: &str = "MCPHUB_LOG_DIR";

/// Timeouts applied across the proxy stack
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyTimeouts {
    /// Transport handshake
    pub handshake: Duration,
    /// HTTP connect for network transports
    pub request: Duration,
    /// Backend `tools/list`
    pub list: Duration,
    /// Backend `tools/call`
    pub call: Duration,
    /// Lazy connect inside a unified session
    pub lazy_connect: Duration,
    /// Hard ceiling on a session stream
    pub session_ceiling: Duration,
}

impl Default for ProxyTimeouts {
    fn default() -> Self {
        Self {
            handshake: DEFAULT_CONNECT_TIMEOUT,
            request: DEFAULT_REQUEST_TIMEOUT,
            list: DEFAULT_LIST_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
            lazy_connect: DEFAULT_LAZY_CONNECT_TIMEOUT,
            session_ceiling: DEFAULT_SESSION_CEILING,
        }
    }
}

/// Gateway server configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Enable CORS for browser access
    pub enable_cors: bool,
    pub timeouts: ProxyTimeouts,
    /// JSON connector catalog loaded at startup
    pub connectors_file: Option<PathBuf>,
    /// Directory for rolling log files; platform data dir when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            enable_cors: true,
            timeouts: ProxyTimeouts::default(),
            connectors_file: None,
            log_dir: None,
        }
    }
}

impl GatewayConfig {
    /// Defaults overlaid with `MCPHUB_*` process environment variables
    pub fn from_env() -> GatewayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`
    pub fn from_lookup<F>(lookup: F) -> GatewayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(host) = get(ENV_HOST) {
            config.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            config.port = port
                .parse()
                .map_err(|_| invalid(ENV_PORT, &port))?;
        }
        if let Some(cors) = get(ENV_ENABLE_CORS) {
            config.enable_cors = parse_bool(&cors).ok_or_else(|| invalid(ENV_ENABLE_CORS, &cors))?;
        }
        config.connectors_file = get(ENV_CONNECTORS_FILE).map(PathBuf::from);
        config.log_dir = get(ENV_LOG_DIR).map(PathBuf::from);

        let secs = |key: &str| -> GatewayResult<Option<Duration>> {
            match get(key) {
                Some(value) => value
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .map(|s| Some(Duration::from_secs(s)))
                    .ok_or_else(|| invalid(key, &value)),
                None => Ok(None),
            }
        };
        if let Some(timeout) = secs(ENV_HANDSHAKE_TIMEOUT)? {
            config.timeouts.handshake = timeout;
            config.timeouts.lazy_connect = timeout;
        }
        if let Some(timeout) = secs(ENV_LIST_TIMEOUT)? {
            config.timeouts.list = timeout;
        }
        if let Some(timeout) = secs(ENV_CALL_TIMEOUT)? {
            config.timeouts.call = timeout;
        }
        if let Some(timeout) = secs(ENV_SESSION_CEILING)? {
            config.timeouts.session_ceiling = timeout;
        }

        Ok(config)
    }

    pub fn addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                GatewayError::Configuration(format!(
                    "Invalid bind address {}:{}: {}",
                    self.host, self.port, e
                ))
            })
    }

    /// Base URL clients use to reach this gateway
    pub fn base_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "127.0.0.1" => "localhost",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}

fn invalid(key: &str, value: &str) -> GatewayError {
    GatewayError::Configuration(format!("Invalid value for {}: {:?}", key, value))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
