//! Connection pool - live handles keyed by connection ID
//!
//! The pool is the single source of truth for whether a connection is usable
//! right now. It holds no locks across I/O: closes happen after removal.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use super::client::BackendClient;

/// Default per-handle close timeout for `drain_all`
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool statistics
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub active_connections: usize,
}

pub struct ConnectionPool {
    handles: DashMap<Uuid, Arc<dyn BackendClient>>,
    close_timeout: Duration,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Register a handle. Returns the handle it replaced, if any.
    pub fn put(&self, id: Uuid, handle: Arc<dyn BackendClient>) -> Option<Arc<dyn BackendClient>> {
        self.handles.insert(id, handle)
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<dyn BackendClient>> {
        self.handles.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<Arc<dyn BackendClient>> {
        self.handles.remove(id).map(|(_, handle)| handle)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.handles.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.handles.len()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.handles.iter().map(|entry| *entry.key()).collect()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active_connections: self.count(),
        }
    }

    /// Close every handle and empty the pool.
    ///
    /// Closes run concurrently, each bounded by the close timeout. Failures
    /// are logged, never propagated. Returns the IDs that were drained.
    pub async fn drain_all(&self) -> Vec<Uuid> {
        let drained: Vec<(Uuid, Arc<dyn BackendClient>)> = self
            .ids()
            .into_iter()
            .filter_map(|id| self.remove(&id).map(|handle| (id, handle)))
            .collect();

        if drained.is_empty() {
            return Vec::new();
        }

        info!(
            count = drained.len(),
            "[ConnectionPool] Draining all connections"
        );

        let close_timeout = self.close_timeout;
        let closes = drained.iter().map(|(id, handle)| async move {
            match tokio::time::timeout(close_timeout, handle.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    connection_id = %id,
                    backend = %handle.description(),
                    error = %e,
                    "[ConnectionPool] Failed to close connection"
                ),
                Err(_) => warn!(
                    connection_id = %id,
                    backend = %handle.description(),
                    "[ConnectionPool] Close timed out after {:?}", close_timeout
                ),
            }
        });
        join_all(closes).await;

        drained.into_iter().map(|(id, _)| id).collect()
    }
}
