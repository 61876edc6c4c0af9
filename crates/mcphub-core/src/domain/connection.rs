//! Connection record - one binding of a user to a connector

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ConnectorSpec;

/// Persisted connection status.
///
/// Failed connect attempts settle back to `Disconnected` with `last_error` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => f.write_str("DISCONNECTED"),
            ConnectionStatus::Connected => f.write_str("CONNECTED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Stable for the lifetime of the record
    pub id: Uuid,

    pub connector_id: Uuid,

    /// Denormalized for logging and status output
    pub connector_name: String,

    pub user_id: String,

    /// Environment overlay used for the connect, as a JSON object
    pub env_config: serde_json::Value,

    pub status: ConnectionStatus,

    pub connected_at: Option<DateTime<Utc>>,

    pub last_used_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl ConnectionRecord {
    /// Create a fresh record in `Disconnected` state
    pub fn new(
        connector: &ConnectorSpec,
        user_id: impl Into<String>,
        env: &HashMap<String, String>,
    ) -> Self {
        let env_config = serde_json::Value::Object(
            env.iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        );

        Self {
            id: Uuid::new_v4(),
            connector_id: connector.id,
            connector_name: connector.name.clone(),
            user_id: user_id.into(),
            env_config,
            status: ConnectionStatus::Disconnected,
            connected_at: None,
            last_used_at: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn mark_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.connected_at = Some(Utc::now());
        self.last_error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ConnectionStatus::Disconnected;
        self.last_error = Some(error.into());
    }

    pub fn mark_disconnected(&mut self) {
        self.status = ConnectionStatus::Disconnected;
        self.connected_at = None;
    }

    pub fn touch(&mut self) {
        self.last_used_at = Some(Utc::now());
    }
}
