//! Connector entity - definition of a backend MCP tool server

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// How the gateway reaches a backend server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportKind {
    /// Local child process speaking over stdin/stdout
    Stdio,
    /// Legacy Server-Sent Events transport (GET stream + POST endpoint)
    Sse,
    /// Streamable HTTP transport
    StreamableHttp,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Stdio => "STDIO",
            TransportKind::Sse => "SSE",
            TransportKind::StreamableHttp => "STREAMABLE_HTTP",
        }
    }

    /// Whether this transport needs a server URL
    pub fn is_network(&self) -> bool {
        !matches!(self, TransportKind::Stdio)
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a connector definition comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorType {
    #[default]
    Official,
    Custom,
}

/// Immutable description of a backend tool server.
///
/// `name` is unique across the catalog and doubles as the namespace prefix
/// for tools exposed through the unified endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSpec {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, rename = "type")]
    pub connector_type: ConnectorType,

    #[serde(rename = "transportType")]
    pub transport: TransportKind,

    /// Executable for STDIO connectors
    #[serde(default)]
    pub command: Option<String>,

    /// Raw argument string: a JSON array, or whitespace separated words.
    /// A JSON array in the catalog file is accepted and kept in its JSON form.
    #[serde(default, deserialize_with = "args_from_string_or_list")]
    pub args: Option<String>,

    /// Environment variables the server expects. An empty value means the
    /// variable has no default and must be supplied from elsewhere.
    #[serde(default)]
    pub env_template: HashMap<String, String>,

    /// Endpoint for SSE / STREAMABLE_HTTP connectors
    #[serde(default)]
    pub server_url: Option<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

fn args_from_string_or_list<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawArgs {
        Text(String),
        List(Vec<String>),
    }

    match Option::<RawArgs>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawArgs::Text(text)) => Ok(Some(text)),
        Some(RawArgs::List(list)) => serde_json::to_string(&list)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl ConnectorSpec {
    /// Create a STDIO connector
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, TransportKind::Stdio).with_command(command)
    }

    /// Create a network connector (SSE or STREAMABLE_HTTP)
    pub fn remote(name: impl Into<String>, transport: TransportKind, url: impl Into<String>) -> Self {
        Self::new(name, transport).with_server_url(url)
    }

    pub fn new(name: impl Into<String>, transport: TransportKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            connector_type: ConnectorType::Official,
            transport,
            command: None,
            args: None,
            env_template: HashMap::new(),
            server_url: None,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = Some(args.into());
        self
    }

    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    pub fn with_env_var(mut self, key: impl Into<String>, default: impl Into<String>) -> Self {
        self.env_template.insert(key.into(), default.into());
        self
    }

    pub fn with_type(mut self, connector_type: ConnectorType) -> Self {
        self.connector_type = connector_type;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build an environment overlay from the template.
    ///
    /// Each template key takes the value returned by `lookup` when it is set
    /// and non-empty, otherwise the template default when non-empty. Keys with
    /// neither are left out.
    pub fn resolve_env<F>(&self, lookup: F) -> HashMap<String, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.env_template
            .iter()
            .filter_map(|(key, default)| {
                lookup(key)
                    .filter(|v| !v.is_empty())
                    .or_else(|| (!default.is_empty()).then(|| default.clone()))
                    .map(|value| (key.clone(), value))
            })
            .collect()
    }
}
