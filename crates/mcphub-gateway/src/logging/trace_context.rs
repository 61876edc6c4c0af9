//! Trace Context - request correlation
//!
//! Generates short trace IDs and the span every request is logged under.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tracing::{info, info_span, warn, Span};

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Short, unique trace ID: 6 hex characters (e.g. "a1b2c3")
pub fn generate_trace_id() -> String {
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0);

    let mixed = counter.wrapping_add(timestamp);
    format!("{:06x}", mixed & 0xFFFFFF)
}

/// Correlation data for a single HTTP request
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub method: String,
    pub path: String,
    /// JSON-RPC method, when the body carried one
    pub rpc_method: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub started_at: Instant,
}

impl TraceContext {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method: method.to_string(),
            path: path.to_string(),
            rpc_method: None,
            user_id: None,
            session_id: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_rpc_method(mut self, method: Option<String>) -> Self {
        self.rpc_method = method;
        self
    }

    pub fn with_caller(mut self, user_id: Option<String>, session_id: Option<String>) -> Self {
        self.user_id = user_id;
        self.session_id = session_id;
        self
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// User ID for logging, "anon" when absent
    pub fn short_user(&self) -> &str {
        self.user_id
            .as_ref()
            .map(|u| truncate(u, 12))
            .unwrap_or("anon")
    }

    /// First 8 chars of the session ID
    pub fn short_session(&self) -> &str {
        self.session_id
            .as_ref()
            .map(|s| truncate(s, 8))
            .unwrap_or("-")
    }
}

/// Prefix of at most `max_chars` characters
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

pub struct RequestSpan;

impl RequestSpan {
    /// Span that tags every child log with the trace ID
    pub fn enter(ctx: &TraceContext) -> Span {
        info_span!(
            "request",
            trace_id = %ctx.trace_id,
            method = %ctx.method,
            path = %ctx.path,
        )
    }

    pub fn log_entry(ctx: &TraceContext) {
        match ctx.rpc_method.as_deref() {
            Some(rpc_method) => info!(
                trace_id = %ctx.trace_id,
                "→ {} {} {} user={} session={}",
                ctx.method,
                ctx.path,
                rpc_method,
                ctx.short_user(),
                ctx.short_session()
            ),
            None => info!(trace_id = %ctx.trace_id, "→ {} {}", ctx.method, ctx.path),
        }
    }

    pub fn log_exit(ctx: &TraceContext, status: u16, detail: Option<&str>) {
        let elapsed = ctx.elapsed_ms();
        if status >= 400 {
            warn!(
                trace_id = %ctx.trace_id,
                "← {} {} {}ms{}",
                status,
                ctx.path,
                elapsed,
                detail.map(|d| format!(" ({})", d)).unwrap_or_default()
            );
        } else {
            info!(
                trace_id = %ctx.trace_id,
                "← {} {} {}ms{}",
                status,
                ctx.path,
                elapsed,
                detail.map(|d| format!(" ({})", d)).unwrap_or_default()
            );
        }
    }
}
