//! Tool usage record - one logged tool invocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsageRecord {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub connector_name: String,
    /// Bare tool name, or the JSON-RPC method for direct sessions
    pub tool_name: String,
    pub tool_parameters: Value,
    pub tool_response: Value,
    pub request_raw: Value,
    pub response_raw: Value,
    pub duration_ms: u64,
    pub is_error: bool,
    pub executed_at: DateTime<Utc>,
}

impl ToolUsageRecord {
    pub fn new(
        connection_id: Uuid,
        connector_name: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id,
            connector_name: connector_name.into(),
            tool_name: tool_name.into(),
            tool_parameters: Value::Null,
            tool_response: Value::Null,
            request_raw: Value::Null,
            response_raw: Value::Null,
            duration_ms: 0,
            is_error: false,
            executed_at: Utc::now(),
        }
    }

    pub fn with_request(mut self, parameters: Value, raw: Value) -> Self {
        self.tool_parameters = parameters;
        self.request_raw = raw;
        self
    }

    pub fn with_response(mut self, response: Value, raw: Value) -> Self {
        self.tool_response = response;
        self.response_raw = raw;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_error(mut self, is_error: bool) -> Self {
        self.is_error = is_error;
        self
    }
}
