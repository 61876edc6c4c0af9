//! Gateway integration tests
//!
//! Tests for the connection lifecycle, the pool and backend transports.

mod catalog;
mod connection_service;
mod stdio_transport;
