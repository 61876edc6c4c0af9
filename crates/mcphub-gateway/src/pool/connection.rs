//! Connection Service - connection record lifecycle
//!
//! ConnectionService is responsible for:
//! - Persisting connect attempts and their outcome as connection records
//! - Registering live handles in the ConnectionPool on success
//! - Tearing handles down on disconnect, idempotently
//! - Bounded pass-through `list_tools` / `call_tool` on live handles
//!
//! Uses the ClientFactory for transport creation and the ConnectionStore for
//! persistence. The pool, not the record, decides whether a connection is
//! usable: a record claiming CONNECTED with no pooled handle is not active.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcphub_core::{ConnectionRecord, ConnectionStore, ConnectorCatalog, ConnectorSpec};
use rmcp::model::{CallToolResult, JsonObject, Tool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::BackendClient;
use super::registry::{ConnectionPool, DEFAULT_CLOSE_TIMEOUT};
use super::transport::ClientFactory;
use crate::error::{GatewayError, GatewayResult};

/// Default timeout for a backend `tools/list`
pub const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for a backend `tools/call`
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection Service handles the connection record state machine
pub struct ConnectionService {
    catalog: Arc<dyn ConnectorCatalog>,
    store: Arc<dyn ConnectionStore>,
    pool: Arc<ConnectionPool>,
    factory: Arc<dyn ClientFactory>,
    list_timeout: Duration,
    call_timeout: Duration,
}

impl ConnectionService {
    pub fn new(
        catalog: Arc<dyn ConnectorCatalog>,
        store: Arc<dyn ConnectionStore>,
        pool: Arc<ConnectionPool>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            catalog,
            store,
            pool,
            factory,
            list_timeout: DEFAULT_LIST_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_list_timeout(mut self, timeout: Duration) -> Self {
        self.list_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn pool(&self) -> Arc<ConnectionPool> {
        self.pool.clone()
    }

    pub fn catalog(&self) -> Arc<dyn ConnectorCatalog> {
        self.catalog.clone()
    }

    /// Connect a user to a connector by connector ID
    pub async fn connect(
        &self,
        connector_id: &Uuid,
        user_id: &str,
        env: &HashMap<String, String>,
    ) -> GatewayResult<ConnectionRecord> {
        let connector = self
            .catalog
            .find_by_id(connector_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("Connector not found: {}", connector_id)))?;
        self.connect_to(&connector, user_id, env).await
    }

    /// Connect a user to a connector by connector name
    pub async fn connect_by_name(
        &self,
        connector_name: &str,
        user_id: &str,
        env: &HashMap<String, String>,
    ) -> GatewayResult<ConnectionRecord> {
        let connector = self
            .catalog
            .find_by_name(connector_name)
            .await?
            .ok_or_else(|| {
                GatewayError::NotFound(format!("Connector not found: {}", connector_name))
            })?;
        self.connect_to(&connector, user_id, env).await
    }

    /// Create a record for `connector` and drive it to CONNECTED.
    ///
    /// On failure the record stays DISCONNECTED with `last_error` set and the
    /// error is returned.
    pub async fn connect_to(
        &self,
        connector: &ConnectorSpec,
        user_id: &str,
        env: &HashMap<String, String>,
    ) -> GatewayResult<ConnectionRecord> {
        self.establish(connector, user_id, env, None).await
    }

    /// `connect_to` with a deadline on the transport connect.
    ///
    /// Running out of time is a connect failure like any other: the record
    /// is left DISCONNECTED with the timeout as `last_error`.
    pub async fn connect_within(
        &self,
        connector: &ConnectorSpec,
        user_id: &str,
        env: &HashMap<String, String>,
        timeout: Duration,
    ) -> GatewayResult<ConnectionRecord> {
        self.establish(connector, user_id, env, Some(timeout)).await
    }

    async fn establish(
        &self,
        connector: &ConnectorSpec,
        user_id: &str,
        env: &HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> GatewayResult<ConnectionRecord> {
        let mut record = ConnectionRecord::new(connector, user_id, env);
        self.store.create(&record).await?;

        info!(
            connection_id = %record.id,
            connector = %connector.name,
            user_id = %user_id,
            transport = %connector.transport,
            "[ConnectionService] Connecting"
        );

        let connected = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.factory.connect(connector, env))
                .await
                .unwrap_or_else(|_| Err(GatewayError::timeout("connect", limit))),
            None => self.factory.connect(connector, env).await,
        };

        match connected {
            Ok(handle) => {
                if let Some(previous) = self.pool.put(record.id, handle) {
                    self.close_handle(&record.id, previous).await;
                }
                record.mark_connected();

                if let Err(e) = self.store.update(&record).await {
                    // Keep pool and record in agreement
                    if let Some(handle) = self.pool.remove(&record.id) {
                        self.close_handle(&record.id, handle).await;
                    }
                    return Err(e.into());
                }

                info!(
                    connection_id = %record.id,
                    connector = %connector.name,
                    "[ConnectionService] Connected"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(
                    connection_id = %record.id,
                    connector = %connector.name,
                    error = %e,
                    "[ConnectionService] Connect failed"
                );
                record.mark_failed(e.to_string());
                if let Err(store_err) = self.store.update(&record).await {
                    warn!(
                        connection_id = %record.id,
                        error = %store_err,
                        "[ConnectionService] Failed to record connect error"
                    );
                }
                Err(e)
            }
        }
    }

    /// Disconnect a connection. Repeated calls are no-ops.
    pub async fn disconnect(&self, connection_id: &Uuid) -> GatewayResult<()> {
        let mut record = self
            .store
            .get(connection_id)
            .await?
            .ok_or_else(|| {
                GatewayError::NotFound(format!("Connection not found: {}", connection_id))
            })?;

        if let Some(handle) = self.pool.remove(connection_id) {
            info!(
                connection_id = %connection_id,
                connector = %record.connector_name,
                "[ConnectionService] Disconnecting"
            );
            self.close_handle(connection_id, handle).await;
        }

        if record.is_connected() || record.connected_at.is_some() {
            record.mark_disconnected();
            self.store.update(&record).await?;
        } else {
            debug!(
                connection_id = %connection_id,
                "[ConnectionService] Already disconnected"
            );
        }
        Ok(())
    }

    /// Drain the pool and mark every drained record DISCONNECTED.
    ///
    /// Shutdown path: failures are logged, never returned.
    pub async fn disconnect_all(&self) -> usize {
        let drained = self.pool.drain_all().await;
        for id in &drained {
            match self.store.get(id).await {
                Ok(Some(mut record)) => {
                    record.mark_disconnected();
                    if let Err(e) = self.store.update(&record).await {
                        warn!(connection_id = %id, error = %e, "[ConnectionService] Failed to persist disconnect");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(connection_id = %id, error = %e, "[ConnectionService] Failed to load record")
                }
            }
        }
        drained.len()
    }

    /// Record for a live connection. Not active if the pool has no handle.
    pub async fn status(&self, connection_id: &Uuid) -> GatewayResult<ConnectionRecord> {
        if !self.pool.contains(connection_id) {
            return Err(GatewayError::NotActive(*connection_id));
        }
        self.store.get(connection_id).await?.ok_or_else(|| {
            GatewayError::NotFound(format!("Connection not found: {}", connection_id))
        })
    }

    pub async fn get_connection(&self, connection_id: &Uuid) -> GatewayResult<Option<ConnectionRecord>> {
        Ok(self.store.get(connection_id).await?)
    }

    pub async fn user_connections(&self, user_id: &str) -> GatewayResult<Vec<ConnectionRecord>> {
        Ok(self.store.list_for_user(user_id).await?)
    }

    pub async fn list_tools(&self, connection_id: &Uuid) -> GatewayResult<Vec<Tool>> {
        let handle = self.live_handle(connection_id)?;
        let tools = tokio::time::timeout(self.list_timeout, handle.list_tools())
            .await
            .map_err(|_| GatewayError::timeout("listTools", self.list_timeout))??;

        debug!(
            connection_id = %connection_id,
            tool_count = tools.len(),
            "[ConnectionService] Listed tools"
        );
        self.touch(connection_id).await;
        Ok(tools)
    }

    pub async fn call_tool(
        &self,
        connection_id: &Uuid,
        tool_name: &str,
        arguments: Option<JsonObject>,
    ) -> GatewayResult<CallToolResult> {
        let handle = self.live_handle(connection_id)?;
        let result = tokio::time::timeout(self.call_timeout, handle.call_tool(tool_name, arguments))
            .await
            .map_err(|_| GatewayError::timeout("callTool", self.call_timeout))??;

        self.touch(connection_id).await;
        Ok(result)
    }

    fn live_handle(&self, connection_id: &Uuid) -> GatewayResult<Arc<dyn BackendClient>> {
        self.pool
            .get(connection_id)
            .ok_or(GatewayError::NotActive(*connection_id))
    }

    /// Stamp `last_used_at`, best-effort
    async fn touch(&self, connection_id: &Uuid) {
        match self.store.get(connection_id).await {
            Ok(Some(mut record)) => {
                record.touch();
                if let Err(e) = self.store.update(&record).await {
                    debug!(connection_id = %connection_id, error = %e, "[ConnectionService] Failed to stamp last use");
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(connection_id = %connection_id, error = %e, "[ConnectionService] Failed to load record")
            }
        }
    }

    async fn close_handle(&self, connection_id: &Uuid, handle: Arc<dyn BackendClient>) {
        match tokio::time::timeout(DEFAULT_CLOSE_TIMEOUT, handle.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                connection_id = %connection_id,
                backend = %handle.description(),
                error = %e,
                "[ConnectionService] Close failed"
            ),
            Err(_) => warn!(
                connection_id = %connection_id,
                backend = %handle.description(),
                "[ConnectionService] Close timed out"
            ),
        }
    }
}
