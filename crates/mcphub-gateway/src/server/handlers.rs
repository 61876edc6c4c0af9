//! HTTP handlers for the gateway server

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::pool::ConnectionService;
use crate::proxy::{
    DirectProxyService, JsonRpcRequest, StreamEvent, UnifiedProxyService, UnifiedStatus,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Caller identity when no `X-User-Id` header is sent
pub const ANONYMOUS_USER: &str = "anonymous";

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionService>,
    pub direct: Arc<DirectProxyService>,
    pub unified: Arc<UnifiedProxyService>,
    pub base_url: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Session correlation via query string, for clients that cannot set headers
#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_USER)
        .to_string()
}

fn session_id(headers: &HeaderMap, query: &MessageQuery) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.session_id.clone())
        .filter(|v| !v.is_empty())
}

fn sse_response(
    stream: BoxStream<'static, StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream.map(|e| Ok(Event::default().event(e.event).data(e.data)));
    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_ID_HEADER, value);
    }
    response
}

// ============================================================================
// Unified proxy
// ============================================================================

/// `GET /mcp/sse`
pub async fn unified_stream(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_id = user_id(&headers);
    let session = state.unified.open_session(&user_id);
    let session_id = session.session_id.clone();
    with_session_header(sse_response(session.stream).into_response(), &session_id)
}

/// `POST /mcp/sse`, `POST /mcp/message`
pub async fn unified_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = match JsonRpcRequest::parse(&body) {
        Ok(request) => request,
        Err(response) => return Json(response).into_response(),
    };
    let user_id = user_id(&headers);
    let session_id = session_id(&headers, &query);

    let response = state
        .unified
        .handle_message(session_id.as_deref(), &user_id, request)
        .await;
    Json(response).into_response()
}

/// `GET /mcp/status`
pub async fn unified_status(State(state): State<AppState>) -> Json<UnifiedStatus> {
    Json(state.unified.status())
}

// ============================================================================
// Direct proxy
// ============================================================================

/// `GET /api/v1/mcp/proxy/{connector}/sse`
///
/// Query parameters become the connection's environment overlay. A failed
/// connect is reported as a single `error` event on a stream that then ends.
pub async fn direct_stream(
    State(state): State<AppState>,
    Path(connector): Path<String>,
    Query(env): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let user_id = user_id(&headers);

    match state.direct.open_session(&connector, &user_id, &env).await {
        Ok(session) => {
            let session_id = session.session_id.clone();
            with_session_header(sse_response(session.stream).into_response(), &session_id)
        }
        Err(e) => {
            warn!(
                connector = %connector,
                user_id = %user_id,
                error = %e,
                "[Gateway] Direct proxy connect failed"
            );
            let message = e.to_string();
            let events = stream::once(async move { StreamEvent::error(&message) }).boxed();
            sse_response(events).into_response()
        }
    }
}

/// `POST /api/v1/mcp/proxy/{connector}/message`
pub async fn direct_message(
    State(state): State<AppState>,
    Path(connector): Path<String>,
    Query(query): Query<MessageQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request = match JsonRpcRequest::parse(&body) {
        Ok(request) => request,
        Err(response) => return Json(response).into_response(),
    };
    let session_id = session_id(&headers, &query);

    let response = state
        .direct
        .handle_message(session_id.as_deref(), Some(&connector), request)
        .await;
    Json(response).into_response()
}

/// `GET /api/v1/mcp/proxy/status`
pub async fn direct_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.direct.status())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSummary {
    pub name: String,
    pub description: String,
    pub sse_url: String,
    pub env_template: HashMap<String, String>,
}

/// `GET /api/v1/mcp/proxy/connectors`
pub async fn list_connectors(State(state): State<AppState>) -> Response {
    match state.connections.catalog().list_enabled().await {
        Ok(connectors) => {
            let connectors: Vec<ConnectorSummary> = connectors
                .into_iter()
                .map(|c| ConnectorSummary {
                    sse_url: format!("{}/api/v1/mcp/proxy/{}/sse", state.base_url, c.name),
                    name: c.name,
                    description: c.description,
                    env_template: c.env_template,
                })
                .collect();
            Json(json!({ "success": true, "connectors": connectors })).into_response()
        }
        Err(e) => {
            error!(error = %e, "[Gateway] Failed to list connectors");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
