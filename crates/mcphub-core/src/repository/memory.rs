//! In-memory repository implementations
//!
//! Back the gateway when no external store is wired in, and serve as the
//! reference behavior for the traits.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ConnectionStore, ConnectorCatalog, RepoResult, UsageLogger};
use crate::domain::{ConnectionRecord, ConnectorSpec, ToolUsageRecord};

/// Default number of usage records kept in memory
const DEFAULT_USAGE_CAPACITY: usize = 10_000;

// ============================================================================
// Connector catalog
// ============================================================================

/// Ordered connector catalog. Iteration order is insertion order.
#[derive(Default)]
pub struct InMemoryConnectorCatalog {
    connectors: RwLock<Vec<ConnectorSpec>>,
}

impl InMemoryConnectorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connector(mut self, connector: ConnectorSpec) -> Self {
        self.connectors.get_mut().push(connector);
        self
    }

    /// Build a catalog from connector definitions, rejecting duplicate names
    pub fn from_connectors(connectors: Vec<ConnectorSpec>) -> RepoResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for connector in &connectors {
            if !seen.insert(connector.name.as_str()) {
                bail!("Duplicate connector name: {}", connector.name);
            }
        }
        Ok(Self {
            connectors: RwLock::new(connectors),
        })
    }

    /// Load a catalog from a JSON array of connector definitions
    pub async fn from_json_file(path: &Path) -> RepoResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read connector catalog {}", path.display()))?;
        let connectors: Vec<ConnectorSpec> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid connector catalog {}", path.display()))?;

        info!(
            path = %path.display(),
            count = connectors.len(),
            "[ConnectorCatalog] Loaded connector definitions"
        );
        Self::from_connectors(connectors)
    }

    /// Add a connector at runtime
    pub async fn insert(&self, connector: ConnectorSpec) -> RepoResult<()> {
        let mut connectors = self.connectors.write().await;
        if connectors.iter().any(|c| c.name == connector.name) {
            bail!("Duplicate connector name: {}", connector.name);
        }
        connectors.push(connector);
        Ok(())
    }

    /// Toggle a connector's enabled flag; returns false if the name is unknown
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut connectors = self.connectors.write().await;
        match connectors.iter_mut().find(|c| c.name == name) {
            Some(connector) => {
                connector.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ConnectorCatalog for InMemoryConnectorCatalog {
    async fn find_by_id(&self, id: &Uuid) -> RepoResult<Option<ConnectorSpec>> {
        Ok(self
            .connectors
            .read()
            .await
            .iter()
            .find(|c| c.id == *id)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> RepoResult<Option<ConnectorSpec>> {
        Ok(self
            .connectors
            .read()
            .await
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_all(&self) -> RepoResult<Vec<ConnectorSpec>> {
        Ok(self.connectors.read().await.clone())
    }
}

// ============================================================================
// Connection store
// ============================================================================

#[derive(Default)]
pub struct InMemoryConnectionStore {
    records: RwLock<HashMap<Uuid, ConnectionRecord>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn create(&self, record: &ConnectionRecord) -> RepoResult<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            bail!("Connection record already exists: {}", record.id);
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get(&self, id: &Uuid) -> RepoResult<Option<ConnectionRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn update(&self, record: &ConnectionRecord) -> RepoResult<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => bail!("Connection record not found: {}", record.id),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<ConnectionRecord>> {
        let mut records: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

// ============================================================================
// Usage log
// ============================================================================

/// Bounded in-memory usage log. Oldest records are dropped first.
pub struct InMemoryUsageLog {
    records: RwLock<Vec<ToolUsageRecord>>,
    capacity: usize,
}

impl Default for InMemoryUsageLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_USAGE_CAPACITY)
    }
}

impl InMemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn records(&self) -> Vec<ToolUsageRecord> {
        self.records.read().await.clone()
    }

    pub async fn records_for_connection(&self, connection_id: &Uuid) -> Vec<ToolUsageRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.connection_id == *connection_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UsageLogger for InMemoryUsageLog {
    async fn record(&self, record: ToolUsageRecord) -> RepoResult<()> {
        debug!(
            connection_id = %record.connection_id,
            connector = %record.connector_name,
            tool = %record.tool_name,
            duration_ms = record.duration_ms,
            is_error = record.is_error,
            "[UsageLog] Tool invocation recorded"
        );

        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            let overflow = records.len() + 1 - self.capacity;
            records.drain(..overflow);
        }
        records.push(record);
        Ok(())
    }
}
