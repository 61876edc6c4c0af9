//! Logging infrastructure
//!
//! - Trace IDs for request correlation
//! - One entry/exit line per request, bodies summarized at DEBUG

mod trace_context;

pub use trace_context::{generate_trace_id, RequestSpan, TraceContext};
