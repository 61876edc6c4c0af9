//! HTTP request/response logging middleware
//!
//! One entry and one exit line per request under a trace-ID span. JSON-RPC
//! message bodies are summarized at DEBUG. Event-stream responses are never
//! buffered: they stay open for the life of the session.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, Method, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use tracing::{debug, warn, Instrument};

use super::handlers::{SESSION_ID_HEADER, USER_ID_HEADER};
use crate::logging::{RequestSpan, TraceContext};

/// Bodies above this size are logged by length only
const MAX_BODY_LOG_SIZE: usize = 1024 * 1024;

/// Format a body compactly: the JSON-RPC method if present, else compact JSON
pub fn format_body(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "[empty]".to_string();
    }
    if bytes.len() > MAX_BODY_LOG_SIZE {
        return format!("[{} bytes]", bytes.len());
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
                if let Some(method) = json.get("method").and_then(|m| m.as_str()) {
                    return method.to_string();
                }
                return serde_json::to_string(&json).unwrap_or_else(|_| text.to_string());
            }
            match text.char_indices().nth(200) {
                Some((idx, _)) => format!("{}...", &text[..idx]),
                None => text.to_string(),
            }
        }
        Err(_) => format!("[binary: {} bytes]", bytes.len()),
    }
}

/// One-line summary of a JSON-RPC response body
pub fn format_rpc_response(bytes: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(bytes).ok()?;

    if let Some(error) = json.get("error") {
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        return Some(format!("error: {} ({})", message, code));
    }

    let result = json.get("result")?;
    if let Some(tools) = result.get("tools").and_then(|t| t.as_array()) {
        return Some(format!("tools: {}", tools.len()));
    }
    if let Some(content) = result.get("content").and_then(|c| c.as_array()) {
        let is_error = result
            .get("isError")
            .and_then(|e| e.as_bool())
            .unwrap_or(false);
        return Some(format!(
            "content: {} items{}",
            content.len(),
            if is_error { " (isError)" } else { "" }
        ));
    }
    if let Some(version) = result.get("protocolVersion").and_then(|v| v.as_str()) {
        let name = result
            .get("serverInfo")
            .and_then(|s| s.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("?");
        return Some(format!("initialized: {} ({})", name, version));
    }
    Some("ok".to_string())
}

pub fn extract_rpc_method(bytes: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    json.get("method").and_then(|m| m.as_str()).map(String::from)
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// GET requests on stream routes hold their response open
fn is_event_stream(method: &Method, path: &str, headers: &HeaderMap) -> bool {
    let accepts_stream = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("text/event-stream"))
        .unwrap_or(false);
    *method == Method::GET && (path.ends_with("/sse") || accepts_stream)
}

pub async fn http_logging_middleware(request: Request, next: Next) -> Result<Response, StatusCode> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let headers = request.headers().clone();

    let ctx = TraceContext::new(method.as_str(), &path).with_caller(
        header_value(&headers, USER_ID_HEADER),
        header_value(&headers, SESSION_ID_HEADER),
    );
    let span = RequestSpan::enter(&ctx);

    if is_event_stream(&method, &path, &headers) {
        return async move {
            RequestSpan::log_entry(&ctx);
            let response = next.run(request).await;
            RequestSpan::log_exit(&ctx, response.status().as_u16(), Some("stream opened"));
            Ok(response)
        }
        .instrument(span)
        .await;
    }

    async move {
        let (parts, body) = request.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, "Failed to read request body: {}", e);
                return Err(StatusCode::BAD_REQUEST);
            }
        };

        let ctx = ctx.with_rpc_method(extract_rpc_method(&body_bytes));
        RequestSpan::log_entry(&ctx);
        if !body_bytes.is_empty() {
            debug!(trace_id = %ctx.trace_id, body = %format_body(&body_bytes), "Request body");
        }

        let request = Request::from_parts(parts, Body::from(body_bytes));
        let response = next.run(request).await;

        let (parts, body) = response.into_parts();
        let body_bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(trace_id = %ctx.trace_id, "Failed to read response body: {}", e);
                return Err(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let summary = if ctx.rpc_method.is_some() {
            format_rpc_response(&body_bytes)
        } else {
            None
        };
        if let Some(summary) = &summary {
            debug!(trace_id = %ctx.trace_id, response = %summary, "JSON-RPC response");
        }

        RequestSpan::log_exit(&ctx, parts.status.as_u16(), None);
        Ok(Response::from_parts(parts, Body::from(body_bytes)))
    }
    .instrument(span)
    .await
}
