//! Direct proxy - one connector per session
//!
//! Opening a session connects the caller to a single connector and streams
//! the session ID back. Messages posted against that session are dispatched
//! to the one backend without any tool-name namespacing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use mcphub_core::{ToolUsageRecord, UsageLogger};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::jsonrpc::{
    error_codes, initialize_result, parse_call_params, shape_call_result, shape_tool,
    JsonRpcRequest, JsonRpcResponse, METHOD_INITIALIZE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    NOTIFICATION_CANCELLED, NOTIFICATION_INITIALIZED,
};
use super::stream::{
    spawn_cleanup, CleanupGuard, SessionChannel, SessionHandle, StreamEvent,
    DEFAULT_SESSION_CEILING,
};
use crate::error::GatewayResult;
use crate::pool::ConnectionService;

pub const DIRECT_SERVER_NAME: &str = "mcphub-proxy";

struct DirectSession {
    user_id: String,
    connector_name: String,
    connection_id: Uuid,
    channel: Arc<SessionChannel>,
    created_at: DateTime<Utc>,
}

/// Operational view of a direct session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectSessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub connector_name: String,
    pub connection_id: Uuid,
    pub created_at: DateTime<Utc>,
}

pub struct DirectProxyService {
    connections: Arc<ConnectionService>,
    usage: Arc<dyn UsageLogger>,
    sessions: DashMap<String, Arc<DirectSession>>,
    session_ceiling: Duration,
}

impl DirectProxyService {
    pub fn new(connections: Arc<ConnectionService>, usage: Arc<dyn UsageLogger>) -> Self {
        Self {
            connections,
            usage,
            sessions: DashMap::new(),
            session_ceiling: DEFAULT_SESSION_CEILING,
        }
    }

    pub fn with_session_ceiling(mut self, ceiling: Duration) -> Self {
        self.session_ceiling = ceiling;
        self
    }

    /// Connect to `connector_name` and open a session stream for it.
    ///
    /// The connect happens before the session exists, so a failure leaves
    /// nothing registered.
    pub async fn open_session(
        self: &Arc<Self>,
        connector_name: &str,
        user_id: &str,
        env: &HashMap<String, String>,
    ) -> GatewayResult<SessionHandle> {
        let record = self
            .connections
            .connect_by_name(connector_name, user_id, env)
            .await?;

        let session_id = Uuid::new_v4().to_string();
        let channel = SessionChannel::new();
        channel.emit(StreamEvent::session_established(&session_id));

        self.sessions.insert(
            session_id.clone(),
            Arc::new(DirectSession {
                user_id: user_id.to_string(),
                connector_name: connector_name.to_string(),
                connection_id: record.id,
                channel: channel.clone(),
                created_at: Utc::now(),
            }),
        );

        info!(
            session_id = %session_id,
            connector = %connector_name,
            user_id = %user_id,
            connection_id = %record.id,
            "[DirectProxy] Session opened"
        );

        let guard = {
            let this = Arc::clone(self);
            let session_id = session_id.clone();
            CleanupGuard::new(move || {
                spawn_cleanup(async move {
                    this.end_session(&session_id).await;
                })
            })
        };

        Ok(SessionHandle::new(session_id, channel, self.session_ceiling, guard))
    }

    /// Deregister a session and disconnect its connection.
    ///
    /// Returns `false` if the session was already gone.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return false;
        };
        session.channel.close();

        if let Err(e) = self.connections.disconnect(&session.connection_id).await {
            warn!(
                session_id = %session_id,
                connection_id = %session.connection_id,
                error = %e,
                "[DirectProxy] Disconnect failed during session cleanup"
            );
        }

        info!(
            session_id = %session_id,
            connector = %session.connector_name,
            "[DirectProxy] Session ended"
        );
        true
    }

    /// Dispatch a message posted against a session.
    ///
    /// When `connector_name` is given the session must belong to it.
    pub async fn handle_message(
        &self,
        session_id: Option<&str>,
        connector_name: Option<&str>,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        let Some(session_id) = session_id else {
            return JsonRpcResponse::error(
                request.id.clone(),
                error_codes::NOT_CONNECTED,
                "Missing session ID",
            );
        };

        let session = match self.sessions.get(session_id) {
            Some(entry) => entry.value().clone(),
            None => {
                return JsonRpcResponse::error(
                    request.id.clone(),
                    error_codes::NOT_CONNECTED,
                    format!("Session not found: {}", session_id),
                )
            }
        };

        if let Some(expected) = connector_name {
            if expected != session.connector_name {
                return JsonRpcResponse::error(
                    request.id.clone(),
                    error_codes::NOT_CONNECTED,
                    format!(
                        "Session {} is not bound to connector {}",
                        session_id, expected
                    ),
                );
            }
        }

        let started = Instant::now();
        let response = self.dispatch(&session, &request).await;
        if response.is_ack() {
            return response;
        }
        // Every method-bearing request is recorded, unknown methods included
        if let Some(method) = request.method() {
            self.record_usage(&session, method, &request, &response, started)
                .await;
        }
        session.channel.emit(StreamEvent::message(&response));
        response
    }

    async fn dispatch(&self, session: &DirectSession, request: &JsonRpcRequest) -> JsonRpcResponse {
        let Some(method) = request.method() else {
            return request.missing_method();
        };
        debug!(
            connector = %session.connector_name,
            method = %method,
            "[DirectProxy] Dispatching"
        );

        match method {
            METHOD_INITIALIZE => {
                JsonRpcResponse::success(request.id.clone(), initialize_result(DIRECT_SERVER_NAME))
            }
            NOTIFICATION_INITIALIZED | NOTIFICATION_CANCELLED => JsonRpcResponse::ack(),
            METHOD_TOOLS_LIST => match self.connections.list_tools(&session.connection_id).await {
                Ok(tools) => JsonRpcResponse::success(
                    request.id.clone(),
                    json!({ "tools": tools.iter().map(shape_tool).collect::<Vec<_>>() }),
                ),
                Err(e) => JsonRpcResponse::internal_error(request.id.clone(), &e),
            },
            METHOD_TOOLS_CALL => match parse_call_params(request.params.as_ref()) {
                Err(message) => {
                    JsonRpcResponse::error(request.id.clone(), error_codes::INVALID_PARAMS, message)
                }
                Ok((name, arguments)) => {
                    match self
                        .connections
                        .call_tool(&session.connection_id, &name, arguments)
                        .await
                    {
                        Ok(result) => {
                            JsonRpcResponse::success(request.id.clone(), shape_call_result(&result))
                        }
                        Err(e) => JsonRpcResponse::internal_error(request.id.clone(), &e),
                    }
                }
            },
            other => request.method_not_found(other),
        }
    }

    async fn record_usage(
        &self,
        session: &DirectSession,
        method: &str,
        request: &JsonRpcRequest,
        response: &JsonRpcResponse,
        started: Instant,
    ) {
        let is_error = response.is_error()
            || response
                .result
                .as_ref()
                .and_then(|r| r.get("isError"))
                .and_then(Value::as_bool)
                .unwrap_or(false);

        let record = ToolUsageRecord::new(session.connection_id, &session.connector_name, method)
            .with_request(
                request.params.clone().unwrap_or(Value::Null),
                serde_json::to_value(request).unwrap_or(Value::Null),
            )
            .with_response(
                response.result.clone().unwrap_or(Value::Null),
                response.to_value(),
            )
            .with_duration_ms(started.elapsed().as_millis() as u64)
            .with_error(is_error);

        if let Err(e) = self.usage.record(record).await {
            warn!(
                connector = %session.connector_name,
                method = %method,
                error = %e,
                "[DirectProxy] Failed to record usage"
            );
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn sessions(&self) -> Vec<DirectSessionInfo> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| DirectSessionInfo {
                session_id: entry.key().clone(),
                user_id: entry.user_id.clone(),
                connector_name: entry.connector_name.clone(),
                connection_id: entry.connection_id,
                created_at: entry.created_at,
            })
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// `{success, activeProxies, proxies}`
    pub fn status(&self) -> Value {
        json!({
            "success": true,
            "activeProxies": self.session_count(),
            "proxies": self.sessions(),
        })
    }

    /// End every session. Used on process shutdown.
    pub async fn shutdown(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut ended = 0;
        for id in ids {
            if self.end_session(&id).await {
                ended += 1;
            }
        }
        if ended > 0 {
            info!(sessions = ended, "[DirectProxy] Shut down sessions");
        }
        ended
    }
}
