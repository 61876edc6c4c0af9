//! Transport configuration resolution
//!
//! Turns a connector definition plus an environment overlay into the runtime
//! transport configuration: parsed arguments, host shell wrapping, and
//! validated server URLs.

use std::collections::HashMap;

use mcphub_core::{ConnectorSpec, TransportKind};
use url::Url;

use crate::error::{GatewayError, GatewayResult};

/// Shell used to launch commands on hosts that need one
const WINDOWS_SHELL: &str = "cmd.exe";

/// Runtime transport configuration ready for connection
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTransport {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Sse {
        url: Url,
    },
    StreamableHttp {
        url: Url,
    },
}

impl ResolvedTransport {
    pub fn transport_kind(&self) -> TransportKind {
        match self {
            ResolvedTransport::Stdio { .. } => TransportKind::Stdio,
            ResolvedTransport::Sse { .. } => TransportKind::Sse,
            ResolvedTransport::StreamableHttp { .. } => TransportKind::StreamableHttp,
        }
    }
}

/// Build the runtime transport config for a connector
pub fn resolve(
    connector: &ConnectorSpec,
    env: &HashMap<String, String>,
) -> GatewayResult<ResolvedTransport> {
    match connector.transport {
        TransportKind::Stdio => {
            let command = connector
                .command
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    GatewayError::Configuration(format!(
                        "STDIO connector '{}' has no command",
                        connector.name
                    ))
                })?;
            let args = parse_args(connector.args.as_deref().unwrap_or_default());
            let (command, args) = wrap_for_host(command, args);

            tracing::debug!(
                "[TransportResolution] {} → {} {:?} ({} env vars)",
                connector.name,
                command,
                args,
                env.len()
            );

            Ok(ResolvedTransport::Stdio {
                command,
                args,
                env: env.clone(),
            })
        }
        TransportKind::Sse => Ok(ResolvedTransport::Sse {
            url: validate_server_url(connector)?,
        }),
        TransportKind::StreamableHttp => Ok(ResolvedTransport::StreamableHttp {
            url: validate_server_url(connector)?,
        }),
    }
}

/// Parse a raw argument string.
///
/// A JSON array of strings is taken as-is; anything else is split on
/// whitespace.
pub fn parse_args(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<String>>(trimmed) {
        Ok(args) => args,
        Err(_) => trimmed.split_whitespace().map(str::to_string).collect(),
    }
}

/// Wrap the invocation in the host shell where the process launcher needs it
pub fn wrap_for_host(command: &str, args: Vec<String>) -> (String, Vec<String>) {
    if cfg!(windows) {
        wrap_with_shell(command, args)
    } else {
        (command.to_string(), args)
    }
}

/// `cmd.exe /c <command> <args...>`
pub fn wrap_with_shell(command: &str, args: Vec<String>) -> (String, Vec<String>) {
    let mut wrapped = Vec::with_capacity(args.len() + 2);
    wrapped.push("/c".to_string());
    wrapped.push(command.to_string());
    wrapped.extend(args);
    (WINDOWS_SHELL.to_string(), wrapped)
}

/// Require a non-blank http(s) URL on a network connector
pub fn validate_server_url(connector: &ConnectorSpec) -> GatewayResult<Url> {
    let raw = connector
        .server_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            GatewayError::Configuration(format!(
                "serverUrl is required for {} connector '{}'",
                connector.transport, connector.name
            ))
        })?;

    let url = Url::parse(raw).map_err(|e| {
        GatewayError::Configuration(format!(
            "Invalid serverUrl for connector '{}': {}",
            connector.name, e
        ))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(GatewayError::Configuration(format!(
            "Unsupported serverUrl scheme '{}' for connector '{}'",
            scheme, connector.name
        ))),
    }
}
