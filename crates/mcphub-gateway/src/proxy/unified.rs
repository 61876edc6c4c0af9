//! Unified proxy - every enabled connector behind one namespace
//!
//! Tools are exposed as `connector__tool`. A session lazily connects to each
//! connector the first time `tools/list` visits it and reuses that connection
//! afterwards. Sessions are either stream-bound (opened via the SSE endpoint)
//! or user-scoped temporaries created for clients that post without one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use mcphub_core::{ConnectorSpec, ToolUsageRecord, UsageLogger};
use rmcp::model::JsonObject;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::enrichment::{EnricherRegistry, EnrichmentContext};
use super::jsonrpc::{
    error_codes, initialize_result, parse_call_params, shape_call_result, shape_namespaced_tool,
    split_tool_name, JsonRpcRequest, JsonRpcResponse, METHOD_INITIALIZE, METHOD_TOOLS_CALL,
    METHOD_TOOLS_LIST, NOTIFICATION_CANCELLED, NOTIFICATION_INITIALIZED,
};
use super::stream::{
    spawn_cleanup, CleanupGuard, SessionChannel, SessionHandle, StreamEvent,
    DEFAULT_SESSION_CEILING,
};
use crate::error::{GatewayError, GatewayResult};
use crate::pool::ConnectionService;

pub const UNIFIED_SERVER_NAME: &str = "mcphub-unified";

/// Upper bound on lazily connecting one connector inside a session
pub const DEFAULT_LAZY_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const TEMP_SESSION_PREFIX: &str = "temp-";

/// Resolves environment variable values for connector env templates
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Key of the fallback session for a user posting without a session ID.
///
/// Temporary sessions have no stream whose end could close them. They keep
/// their connections until `shutdown`, and a user only ever has one.
pub fn temp_session_id(user_id: &str) -> String {
    format!("{}{}", TEMP_SESSION_PREFIX, user_id)
}

struct UnifiedSession {
    session_id: String,
    user_id: String,
    /// Connector name to connection ID. An uninitialized cell means the
    /// connect is in flight or last failed.
    connections: DashMap<String, Arc<OnceCell<Uuid>>>,
    /// `None` for temporary sessions, which have no stream
    channel: Option<Arc<SessionChannel>>,
    created_at: DateTime<Utc>,
}

impl UnifiedSession {
    fn new(session_id: String, user_id: &str, channel: Option<Arc<SessionChannel>>) -> Self {
        Self {
            session_id,
            user_id: user_id.to_string(),
            connections: DashMap::new(),
            channel,
            created_at: Utc::now(),
        }
    }

    fn is_temporary(&self) -> bool {
        self.channel.is_none()
    }

    fn connection_for(&self, connector_name: &str) -> Option<Uuid> {
        self.connections
            .get(connector_name)
            .and_then(|cell| cell.get().copied())
    }

    fn connection_ids(&self) -> Vec<Uuid> {
        self.connections
            .iter()
            .filter_map(|entry| entry.value().get().copied())
            .collect()
    }
}

/// Operational view of a unified session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedSessionInfo {
    pub session_id: String,
    pub user_id: String,
    pub connections: usize,
    pub temporary: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedStatus {
    pub success: bool,
    pub active_sessions: usize,
    pub active_connections: usize,
    pub sessions: Vec<UnifiedSessionInfo>,
}

pub struct UnifiedProxyService {
    connections: Arc<ConnectionService>,
    usage: Arc<dyn UsageLogger>,
    enrichers: EnricherRegistry,
    sessions: DashMap<String, Arc<UnifiedSession>>,
    env_lookup: EnvLookup,
    session_ceiling: Duration,
    connect_timeout: Duration,
}

impl UnifiedProxyService {
    pub fn new(connections: Arc<ConnectionService>, usage: Arc<dyn UsageLogger>) -> Self {
        Self {
            connections,
            usage,
            enrichers: EnricherRegistry::with_defaults(),
            sessions: DashMap::new(),
            env_lookup: Arc::new(|key| std::env::var(key).ok()),
            session_ceiling: DEFAULT_SESSION_CEILING,
            connect_timeout: DEFAULT_LAZY_CONNECT_TIMEOUT,
        }
    }

    pub fn with_enrichers(mut self, enrichers: EnricherRegistry) -> Self {
        self.enrichers = enrichers;
        self
    }

    pub fn with_env_lookup(mut self, lookup: EnvLookup) -> Self {
        self.env_lookup = lookup;
        self
    }

    pub fn with_session_ceiling(mut self, ceiling: Duration) -> Self {
        self.session_ceiling = ceiling;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Open a stream-bound session. Connectors are connected lazily.
    pub fn open_session(self: &Arc<Self>, user_id: &str) -> SessionHandle {
        let session_id = Uuid::new_v4().to_string();
        let channel = SessionChannel::new();
        channel.emit(StreamEvent::session_established(&session_id));

        self.sessions.insert(
            session_id.clone(),
            Arc::new(UnifiedSession::new(
                session_id.clone(),
                user_id,
                Some(channel.clone()),
            )),
        );

        info!(
            session_id = %session_id,
            user_id = %user_id,
            "[UnifiedProxy] Session opened"
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

        SessionHandle::new(session_id, channel, self.session_ceiling, guard)
    }

    /// Deregister a session and disconnect every connection it opened.
    ///
    /// Returns `false` if the session was already gone.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return false;
        };
        if let Some(channel) = &session.channel {
            channel.close();
        }

        let connection_ids = session.connection_ids();
        let disconnects = connection_ids.iter().map(|id| async move {
            if let Err(e) = self.connections.disconnect(id).await {
                warn!(
                    session_id = %session_id,
                    connection_id = %id,
                    error = %e,
                    "[UnifiedProxy] Disconnect failed during session cleanup"
                );
            }
        });
        join_all(disconnects).await;

        info!(
            session_id = %session_id,
            connections = connection_ids.len(),
            "[UnifiedProxy] Session ended"
        );
        true
    }

    /// Dispatch a message. Without a session ID the user's existing session is
    /// used, or a temporary one is created for tool methods.
    pub async fn handle_message(
        &self,
        session_id: Option<&str>,
        user_id: &str,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        let Some(method) = request.method().map(str::to_string) else {
            return request.missing_method();
        };

        let needs_session = method == METHOD_TOOLS_LIST || method == METHOD_TOOLS_CALL;
        let session = match self.resolve_session(session_id, user_id, &method) {
            Ok(session) => session,
            Err(message) if needs_session => {
                return JsonRpcResponse::error(
                    request.id.clone(),
                    error_codes::NOT_CONNECTED,
                    message,
                )
            }
            // initialize and notifications answer without a session
            Err(_) => None,
        };

        debug!(
            session_id = session.as_ref().map(|s| s.session_id.as_str()).unwrap_or("-"),
            method = %method,
            "[UnifiedProxy] Dispatching"
        );

        let response = match method.as_str() {
            METHOD_INITIALIZE => {
                JsonRpcResponse::success(request.id.clone(), initialize_result(UNIFIED_SERVER_NAME))
            }
            NOTIFICATION_INITIALIZED | NOTIFICATION_CANCELLED => JsonRpcResponse::ack(),
            METHOD_TOOLS_LIST | METHOD_TOOLS_CALL => match &session {
                Some(session) if method == METHOD_TOOLS_LIST => {
                    self.list_tools(session, &request).await
                }
                Some(session) => self.call_tool(session, &request).await,
                None => JsonRpcResponse::error(
                    request.id.clone(),
                    error_codes::NOT_CONNECTED,
                    "No session available",
                ),
            },
            other => request.method_not_found(other),
        };

        if let Some(channel) = session.as_ref().and_then(|s| s.channel.as_ref()) {
            if !response.is_ack() {
                channel.emit(StreamEvent::message(&response));
            }
        }
        response
    }

    fn resolve_session(
        &self,
        session_id: Option<&str>,
        user_id: &str,
        method: &str,
    ) -> Result<Option<Arc<UnifiedSession>>, String> {
        if let Some(session_id) = session_id {
            return self
                .sessions
                .get(session_id)
                .map(|entry| Some(entry.value().clone()))
                .ok_or_else(|| format!("Session not found: {}", session_id));
        }

        // Prefer the user's oldest stream-bound session, then their temporary one
        let existing = self
            .sessions
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .min_by_key(|entry| (entry.is_temporary(), entry.created_at))
            .map(|entry| entry.value().clone());
        if existing.is_some() {
            return Ok(existing);
        }

        if method != METHOD_TOOLS_LIST && method != METHOD_TOOLS_CALL {
            return Ok(None);
        }

        // Lives until shutdown
        let key = temp_session_id(user_id);
        let session = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| {
                info!(session_id = %key, user_id = %user_id, "[UnifiedProxy] Created temporary session");
                Arc::new(UnifiedSession::new(key.clone(), user_id, None))
            })
            .value()
            .clone();
        Ok(Some(session))
    }

    async fn list_tools(&self, session: &Arc<UnifiedSession>, request: &JsonRpcRequest) -> JsonRpcResponse {
        let connectors = match self.connections.catalog().list_enabled().await {
            Ok(connectors) => connectors,
            Err(e) => {
                return JsonRpcResponse::internal_error(request.id.clone(), &GatewayError::Store(e))
            }
        };

        let per_connector = connectors
            .iter()
            .map(|connector| self.connector_tools(session, connector));
        let tools: Vec<Value> = join_all(per_connector).await.into_iter().flatten().collect();

        info!(
            session_id = %session.session_id,
            connectors = connectors.len(),
            tools = tools.len(),
            "[UnifiedProxy] Aggregated tools"
        );
        JsonRpcResponse::success(request.id.clone(), json!({ "tools": tools }))
    }

    /// Tools of one connector. Any failure yields none.
    async fn connector_tools(&self, session: &Arc<UnifiedSession>, connector: &ConnectorSpec) -> Vec<Value> {
        let connection_id = match self.ensure_connection(session, connector).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    connector = %connector.name,
                    error = %e,
                    "[UnifiedProxy] Skipping connector: connect failed"
                );
                return Vec::new();
            }
        };

        match self.connections.list_tools(&connection_id).await {
            Ok(tools) => tools
                .iter()
                .map(|tool| shape_namespaced_tool(&connector.name, tool))
                .collect(),
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    connector = %connector.name,
                    error = %e,
                    "[UnifiedProxy] Skipping connector: tools/list failed"
                );
                Vec::new()
            }
        }
    }

    /// Connection for `connector` in this session, connecting on first use.
    ///
    /// Concurrent callers share one connect attempt. A failed attempt is not
    /// remembered, so the next call retries.
    async fn ensure_connection(
        &self,
        session: &Arc<UnifiedSession>,
        connector: &ConnectorSpec,
    ) -> GatewayResult<Uuid> {
        let cell = session
            .connections
            .entry(connector.name.clone())
            .or_default()
            .value()
            .clone();

        if let Some(id) = cell.get() {
            return Ok(*id);
        }

        let id = *cell
            .get_or_try_init(|| async {
                let env = connector.resolve_env(|key| (self.env_lookup)(key));
                self.connections
                    .connect_within(connector, &session.user_id, &env, self.connect_timeout)
                    .await
                    .map(|record| record.id)
            })
            .await?;

        // The session may have ended while the connect was in flight
        if !self.is_registered(session) {
            warn!(
                session_id = %session.session_id,
                connector = %connector.name,
                "[UnifiedProxy] Session ended during connect, dropping connection"
            );
            if let Err(e) = self.connections.disconnect(&id).await {
                warn!(connection_id = %id, error = %e, "[UnifiedProxy] Disconnect failed");
            }
            return Err(GatewayError::Internal(format!(
                "Session ended: {}",
                session.session_id
            )));
        }

        Ok(id)
    }

    fn is_registered(&self, session: &Arc<UnifiedSession>) -> bool {
        self.sessions
            .get(&session.session_id)
            .map(|entry| Arc::ptr_eq(entry.value(), session))
            .unwrap_or(false)
    }

    async fn call_tool(&self, session: &Arc<UnifiedSession>, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        let (name, arguments) = match parse_call_params(request.params.as_ref()) {
            Ok(parsed) => parsed,
            Err(message) => return JsonRpcResponse::error(id, error_codes::INVALID_PARAMS, message),
        };

        let Some((connector_name, tool_name)) = split_tool_name(&name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                format!(
                    "Invalid tool name format. Expected: connector__toolName, got: {}",
                    name
                ),
            );
        };

        let Some(connection_id) = session.connection_for(connector_name) else {
            return JsonRpcResponse::error(
                id,
                error_codes::NOT_CONNECTED,
                format!("Connector not connected: {}", connector_name),
            );
        };

        let ctx = EnrichmentContext {
            connector_name,
            tool_name,
            connection_id,
            connections: self.connections.as_ref(),
        };
        let arguments = self.enrichers.apply(&ctx, arguments).await;

        let started = Instant::now();
        let outcome = self
            .connections
            .call_tool(&connection_id, tool_name, arguments.clone())
            .await;

        let response = match &outcome {
            Ok(result) => JsonRpcResponse::success(id, shape_call_result(result)),
            Err(e) if e.is_unreachable() => {
                JsonRpcResponse::error(id, error_codes::NOT_CONNECTED, e.to_string())
            }
            Err(e) => JsonRpcResponse::internal_error(id, e),
        };

        self.record_usage(
            connection_id,
            connector_name,
            tool_name,
            arguments,
            &response,
            started,
        )
        .await;
        response
    }

    async fn record_usage(
        &self,
        connection_id: Uuid,
        connector_name: &str,
        tool_name: &str,
        arguments: Option<JsonObject>,
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

        let parameters = arguments.map(Value::Object).unwrap_or(Value::Null);
        let record = ToolUsageRecord::new(connection_id, connector_name, tool_name)
            .with_request(
                parameters.clone(),
                json!({
                    "name": tool_name,
                    "arguments": parameters,
                }),
            )
            .with_response(
                response
                    .result
                    .as_ref()
                    .and_then(|r| r.get("content"))
                    .cloned()
                    .unwrap_or(Value::Null),
                response.to_value(),
            )
            .with_duration_ms(started.elapsed().as_millis() as u64)
            .with_error(is_error);

        if let Err(e) = self.usage.record(record).await {
            warn!(
                connector = %connector_name,
                tool = %tool_name,
                error = %e,
                "[UnifiedProxy] Failed to record usage"
            );
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Live connections a session holds, by connector name
    pub fn session_connections(&self, session_id: &str) -> Vec<(String, Uuid)> {
        let Some(session) = self.sessions.get(session_id).map(|e| e.value().clone()) else {
            return Vec::new();
        };
        let mut connections: Vec<_> = session
            .connections
            .iter()
            .filter_map(|entry| entry.value().get().map(|id| (entry.key().clone(), *id)))
            .collect();
        connections.sort();
        connections
    }

    pub fn status(&self) -> UnifiedStatus {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| {
                (
                    entry.created_at,
                    UnifiedSessionInfo {
                        session_id: entry.session_id.clone(),
                        user_id: entry.user_id.clone(),
                        connections: entry.connection_ids().len(),
                        temporary: entry.is_temporary(),
                    },
                )
            })
            .collect();
        sessions.sort_by_key(|(created_at, _)| *created_at);

        UnifiedStatus {
            success: true,
            active_sessions: sessions.len(),
            active_connections: self.connections.pool().count(),
            sessions: sessions.into_iter().map(|(_, info)| info).collect(),
        }
    }

    /// End every session, temporaries included. Used on process shutdown.
    pub async fn shutdown(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut ended = 0;
        for id in ids {
            if self.end_session(&id).await {
                ended += 1;
            }
        }
        if ended > 0 {
            info!(sessions = ended, "[UnifiedProxy] Shut down sessions");
        }
        ended
    }
}
