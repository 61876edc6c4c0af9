//! JSON-RPC 2.0 framing for the proxy message endpoints
//!
//! Requests are parsed leniently: a missing `method` is reported as an
//! invalid request rather than a parse error, and a present-but-null `id` is
//! kept distinct from an absent one so it can be echoed back verbatim.

use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::GatewayError;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version advertised by both proxies
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Separator between connector name and tool name in unified tool names
pub const TOOL_NAME_SEPARATOR: &str = "__";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const NOTIFICATION_INITIALIZED: &str = "notifications/initialized";
pub const NOTIFICATION_CANCELLED: &str = "notifications/cancelled";

pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Session or connector is not connected
    pub const NOT_CONNECTED: i32 = -32002;
}

/// Deserialize a field that is present, keeping an explicit `null`
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Incoming JSON-RPC request or notification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: Some(id.into()),
            method: Some(method.into()),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: None,
            method: Some(method.into()),
            params: None,
        }
    }

    /// Parse a raw body. Malformed JSON yields a ready-to-send parse error.
    pub fn parse(body: &str) -> Result<Self, JsonRpcResponse> {
        serde_json::from_str(body).map_err(|e| {
            JsonRpcResponse::error(
                None,
                error_codes::PARSE_ERROR,
                format!("Parse error: {}", e),
            )
        })
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn is_notification(&self) -> bool {
        self.method()
            .map(|m| m.starts_with("notifications/"))
            .unwrap_or(false)
    }

    /// Response for a request that carried no method
    pub fn missing_method(&self) -> JsonRpcResponse {
        JsonRpcResponse::error(
            self.id.clone(),
            error_codes::INVALID_REQUEST,
            "Invalid request: missing method",
        )
    }

    pub fn method_not_found(&self, method: &str) -> JsonRpcResponse {
        JsonRpcResponse::error(
            self.id.clone(),
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing JSON-RPC response
///
/// `id` is `None` only for notification acknowledgements; any other response
/// to an id-less request carries `"id": null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.unwrap_or(Value::Null)),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.unwrap_or(Value::Null)),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// `-32603` wrapping a gateway failure
    pub fn internal_error(id: Option<Value>, err: &GatewayError) -> Self {
        Self::error(
            id,
            error_codes::INTERNAL_ERROR,
            format!("Internal error: {}", err),
        )
    }

    /// Bare acknowledgement for notifications
    pub fn ack() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            result: None,
            error: None,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.id.is_none() && self.result.is_none() && self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `initialize` result for a proxy named `server_name`
pub fn initialize_result(server_name: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": server_name,
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}

/// Tool descriptor as sent to clients
pub fn shape_tool(tool: &Tool) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description.as_deref().unwrap_or(""),
        "inputSchema": Value::Object(tool.input_schema.as_ref().clone()),
    })
}

/// Tool descriptor under the unified namespace: `connector__tool`, with the
/// description tagged by connector
pub fn shape_namespaced_tool(connector: &str, tool: &Tool) -> Value {
    json!({
        "name": namespaced_tool_name(connector, &tool.name),
        "description": format!("[{}] {}", connector, tool.description.as_deref().unwrap_or("")),
        "inputSchema": Value::Object(tool.input_schema.as_ref().clone()),
    })
}

/// `tools/call` result as sent to clients
pub fn shape_call_result(result: &CallToolResult) -> Value {
    let mut shaped = json!({
        "content": serde_json::to_value(&result.content).unwrap_or_else(|_| json!([])),
        "isError": result.is_error.unwrap_or(false),
    });
    if let (Some(structured), Some(obj)) = (&result.structured_content, shaped.as_object_mut()) {
        obj.insert("structuredContent".to_string(), structured.clone());
    }
    shaped
}

/// Extract `name` and `arguments` from `tools/call` params
pub fn parse_call_params(params: Option<&Value>) -> Result<(String, Option<JsonObject>), String> {
    let params = params
        .and_then(Value::as_object)
        .ok_or_else(|| "Invalid params: expected an object".to_string())?;

    let name = params
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "Invalid params: missing tool name".to_string())?;

    let arguments = match params.get("arguments") {
        None | Some(Value::Null) => None,
        Some(Value::Object(args)) => Some(args.clone()),
        Some(_) => return Err("Invalid params: arguments must be an object".to_string()),
    };

    Ok((name.to_string(), arguments))
}

/// Split `connector__tool` at the first separator. Both halves must be non-empty.
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(TOOL_NAME_SEPARATOR)
        .filter(|(connector, tool)| !connector.is_empty() && !tool.is_empty())
}

pub fn namespaced_tool_name(connector: &str, tool: &str) -> String {
    format!("{}{}{}", connector, TOOL_NAME_SEPARATOR, tool)
}
