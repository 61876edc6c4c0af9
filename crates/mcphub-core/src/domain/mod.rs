//! Domain entities and value objects
//!
//! - Entities (ConnectorSpec, ConnectionRecord, ToolUsageRecord)
//! - Value Objects (TransportKind, ConnectorType, ConnectionStatus)

mod connection;
mod connector;
mod usage;

pub use connection::{ConnectionRecord, ConnectionStatus};
pub use connector::{ConnectorSpec, ConnectorType, TransportKind};
pub use usage::ToolUsageRecord;
