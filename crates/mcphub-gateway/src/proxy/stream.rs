//! Session event streams
//!
//! Each proxy session owns a [`SessionChannel`], a hot multicast of
//! [`StreamEvent`]s. The HTTP layer turns a subscription into an SSE body via
//! [`session_stream`], which ends when the session channel closes, the
//! consumer goes away, or the session ceiling elapses. Whichever happens
//! first runs the session's [`CleanupGuard`]; later triggers are no-ops.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::jsonrpc::JsonRpcResponse;

/// Hard upper bound on a session stream's lifetime
pub const DEFAULT_SESSION_CEILING: Duration = Duration::from_secs(60 * 60);

/// Events buffered for the first subscriber before it attaches
const WARMUP_CAPACITY: usize = 256;

pub const EVENT_SESSION: &str = "session";
pub const EVENT_MESSAGE: &str = "message";
pub const EVENT_ERROR: &str = "error";

/// One named event on a session stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub event: String,
    pub data: String,
}

impl StreamEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// First event on every stream, announcing the session ID
    pub fn session_established(session_id: &str) -> Self {
        Self::new(
            EVENT_SESSION,
            json!({ "sessionId": session_id, "status": "connected" }).to_string(),
        )
    }

    pub fn message(response: &JsonRpcResponse) -> Self {
        Self::new(EVENT_MESSAGE, response.to_value().to_string())
    }

    pub fn error(message: &str) -> Self {
        Self::new(
            EVENT_ERROR,
            json!({ "status": "error", "message": message }).to_string(),
        )
    }
}

#[derive(Default)]
struct ChannelState {
    subscribers: Vec<mpsc::UnboundedSender<StreamEvent>>,
    warmup: VecDeque<StreamEvent>,
    subscribed: bool,
    closed: bool,
}

/// Hot multicast of session events
///
/// Subscribers only see events emitted after they subscribe, except the very
/// first subscriber, which also receives what was emitted before it attached.
#[derive(Default)]
pub struct SessionChannel {
    state: Mutex<ChannelState>,
}

impl SessionChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish an event. Returns `false` once the channel is closed.
    pub fn emit(&self, event: StreamEvent) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }

        if !state.subscribed {
            if state.warmup.len() == WARMUP_CAPACITY {
                warn!(event = %event.event, "[SessionChannel] Warm-up buffer full, dropping oldest event");
                state.warmup.pop_front();
            }
            state.warmup.push_back(event);
            return true;
        }

        state.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        true
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock();

        if !state.subscribed {
            state.subscribed = true;
            for event in state.warmup.drain(..) {
                let _ = tx.send(event);
            }
        }

        // A closed channel hands out a receiver that ends after any replay
        if !state.closed {
            state.subscribers.push(tx);
        }
        rx
    }

    /// Stop publishing; every subscription ends after draining
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.subscribers.clear();
            debug!("[SessionChannel] Closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }
}

type CleanupFn = Box<dyn FnOnce() + Send>;

/// Runs a cleanup closure at most once
///
/// Triggered explicitly via [`CleanupGuard::run`] or implicitly on drop.
pub struct CleanupGuard {
    cleanup: Mutex<Option<CleanupFn>>,
}

impl CleanupGuard {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cleanup: Mutex::new(Some(Box::new(cleanup))),
        }
    }

    /// Run the cleanup. Returns `false` if it already ran.
    pub fn run(&self) -> bool {
        let cleanup = self.cleanup.lock().take();
        match cleanup {
            Some(cleanup) => {
                cleanup();
                true
            }
            None => false,
        }
    }

    pub fn has_run(&self) -> bool {
        self.cleanup.lock().is_none()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.run();
    }
}

/// Spawn async cleanup work from a synchronous context
///
/// Outside a runtime (process teardown) the work is skipped.
pub fn spawn_cleanup<F>(work: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(work);
        }
        Err(_) => warn!("[SessionStream] No runtime available, cleanup skipped"),
    }
}

/// Subscribe to `channel` and yield its events until the channel closes,
/// the stream is dropped, or `ceiling` elapses. `guard` runs on the way out.
pub fn session_stream(
    channel: Arc<SessionChannel>,
    ceiling: Duration,
    guard: CleanupGuard,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    let mut events = channel.subscribe();

    async_stream::stream! {
        let _guard = guard;
        let deadline = tokio::time::sleep(ceiling);
        tokio::pin!(deadline);

        loop {
            let next = tokio::select! {
                _ = &mut deadline => {
                    info!(ceiling = ?ceiling, "[SessionStream] Session ceiling reached, ending stream");
                    None
                }
                event = events.recv() => event,
            };
            match next {
                Some(event) => yield event,
                None => break,
            }
        }
    }
}

/// A freshly opened proxy session
pub struct SessionHandle {
    pub session_id: String,
    pub stream: BoxStream<'static, StreamEvent>,
}

impl SessionHandle {
    pub fn new(
        session_id: String,
        channel: Arc<SessionChannel>,
        ceiling: Duration,
        guard: CleanupGuard,
    ) -> Self {
        Self {
            session_id,
            stream: session_stream(channel, ceiling, guard).boxed(),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}
