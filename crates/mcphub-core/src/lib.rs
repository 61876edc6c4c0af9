//! # McpHub Core Library
//!
//! Domain types and collaborator interfaces for the McpHub gateway.
//!
//! ## Modules
//!
//! - `domain` - Connector specifications, connection records, usage records
//! - `repository` - Catalog, connection store and usage logger traits, with
//!   in-memory implementations for standalone runs and tests

pub mod domain;
pub mod repository;

// Re-export commonly used types
pub use domain::*;
pub use repository::*;
