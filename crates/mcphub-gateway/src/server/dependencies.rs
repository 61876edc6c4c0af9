//! Dependency container for the gateway
//!
//! Every collaborator is injected, so the server runs the same against
//! in-memory stores, test fakes, or anything else implementing the traits.

use std::sync::Arc;

use mcphub_core::{
    ConnectionStore, ConnectorCatalog, InMemoryConnectionStore, InMemoryUsageLog, UsageLogger,
};

use crate::pool::ClientFactory;

#[derive(Clone)]
pub struct GatewayDependencies {
    pub catalog: Arc<dyn ConnectorCatalog>,
    pub store: Arc<dyn ConnectionStore>,
    pub usage: Arc<dyn UsageLogger>,
    /// Transport factory; built from the config timeouts when `None`
    pub factory: Option<Arc<dyn ClientFactory>>,
}

impl GatewayDependencies {
    pub fn new(
        catalog: Arc<dyn ConnectorCatalog>,
        store: Arc<dyn ConnectionStore>,
        usage: Arc<dyn UsageLogger>,
    ) -> Self {
        Self {
            catalog,
            store,
            usage,
            factory: None,
        }
    }

    /// In-memory connection store and usage log around `catalog`
    pub fn in_memory(catalog: Arc<dyn ConnectorCatalog>) -> Self {
        Self::new(
            catalog,
            Arc::new(InMemoryConnectionStore::new()),
            Arc::new(InMemoryUsageLog::new()),
        )
    }

    pub fn with_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }
}
