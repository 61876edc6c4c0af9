//! Repository traits for data access
//!
//! These traits define the collaborators the gateway consumes without
//! specifying the storage behind them. In-memory implementations live in
//! `memory` for standalone runs and tests.

mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{ConnectionRecord, ConnectorSpec, ConnectorType, ToolUsageRecord};

pub use memory::{InMemoryConnectionStore, InMemoryConnectorCatalog, InMemoryUsageLog};

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Read-only source of connector definitions
#[async_trait]
pub trait ConnectorCatalog: Send + Sync {
    /// Get a connector by ID
    async fn find_by_id(&self, id: &Uuid) -> RepoResult<Option<ConnectorSpec>>;

    /// Get a connector by its unique name
    async fn find_by_name(&self, name: &str) -> RepoResult<Option<ConnectorSpec>>;

    /// All connectors in catalog order
    async fn list_all(&self) -> RepoResult<Vec<ConnectorSpec>>;

    /// Enabled connectors in catalog order
    async fn list_enabled(&self) -> RepoResult<Vec<ConnectorSpec>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|c| c.enabled)
            .collect())
    }

    async fn list_by_type(&self, connector_type: ConnectorType) -> RepoResult<Vec<ConnectorSpec>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|c| c.connector_type == connector_type)
            .collect())
    }
}

/// Durable store for connection records
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Persist a new record
    async fn create(&self, record: &ConnectionRecord) -> RepoResult<()>;

    /// Get a record by ID
    async fn get(&self, id: &Uuid) -> RepoResult<Option<ConnectionRecord>>;

    /// Overwrite an existing record
    async fn update(&self, record: &ConnectionRecord) -> RepoResult<()>;

    /// All records owned by a user
    async fn list_for_user(&self, user_id: &str) -> RepoResult<Vec<ConnectionRecord>>;
}

/// Sink for tool invocation records
#[async_trait]
pub trait UsageLogger: Send + Sync {
    async fn record(&self, record: ToolUsageRecord) -> RepoResult<()>;
}
