//! SSE transport for MCP servers
//!
//! Legacy two-channel transport: a long-lived `GET` event stream carries
//! server messages, and the first `endpoint` event names the URL that client
//! messages are `POST`ed to. The stream and the poster run as background
//! tasks bridged to rmcp through a channel pair.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::StreamExt;
use mcphub_core::TransportKind;
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::ServiceExt;
use sse_stream::{Sse, SseStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::Transport;
use crate::error::{GatewayError, GatewayResult};
use crate::pool::client::{BackendClient, McpClient, McpClientHandler, RmcpBackend};

const EVENT_ENDPOINT: &str = "endpoint";
const EVENT_MESSAGE: &str = "message";

type EventStream = BoxStream<'static, Result<Sse, sse_stream::Error>>;

/// Event type, `message` when the block has no `event:` field
fn event_type(event: &Sse) -> &str {
    event.event.as_deref().unwrap_or(EVENT_MESSAGE)
}

/// SSE transport for legacy MCP servers
pub struct SseTransport {
    connector_name: String,
    url: Url,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl SseTransport {
    pub fn new(
        connector_name: String,
        url: Url,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            connector_name,
            url,
            connect_timeout,
            request_timeout,
        }
    }

    /// Open the event stream and wait for the `endpoint` event
    async fn open_event_stream(&self, http: &reqwest::Client) -> GatewayResult<(Url, EventStream)> {
        let response = http
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GatewayError::Connect(format!("Failed to open event stream: {}", e)))?;

        let mut events: EventStream = SseStream::from_bytes_stream(response.bytes_stream()).boxed();
        while let Some(event) = events.next().await {
            let event = event
                .map_err(|e| GatewayError::Connect(format!("Event stream read error: {}", e)))?;
            match (event_type(&event), event.data.as_deref()) {
                (EVENT_ENDPOINT, Some(data)) => {
                    let endpoint = self.url.join(data.trim()).map_err(|e| {
                        GatewayError::Connect(format!("Invalid endpoint '{}': {}", data, e))
                    })?;
                    return Ok((endpoint, events));
                }
                (other, _) => debug!(
                    connector = %self.connector_name,
                    event = %other,
                    "Ignoring event before endpoint"
                ),
            }
        }

        Err(GatewayError::Connect(
            "Event stream closed before endpoint event".to_string(),
        ))
    }

    /// Open the stream, start the bridge tasks and run the MCP handshake.
    ///
    /// The bridge tasks stop when `shutdown` is cancelled.
    async fn open_and_handshake(
        &self,
        http: reqwest::Client,
        shutdown: &CancellationToken,
    ) -> GatewayResult<McpClient> {
        let (endpoint, events) = self.open_event_stream(&http).await?;
        debug!(connector = %self.connector_name, endpoint = %endpoint, "Received endpoint");

        let (outbound_tx, outbound_rx) = mpsc::unbounded::<ClientJsonRpcMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded::<ServerJsonRpcMessage>();

        tokio::spawn(run_reader(
            self.connector_name.clone(),
            events,
            inbound_tx,
            shutdown.clone(),
        ));
        tokio::spawn(run_writer(
            self.connector_name.clone(),
            http,
            endpoint,
            outbound_rx,
            shutdown.clone(),
        ));

        McpClientHandler::new(&self.connector_name)
            .serve((outbound_tx, inbound_rx))
            .await
            .map_err(|e| GatewayError::Connect(format!("MCP handshake failed: {}", e)))
    }
}

/// Forward server messages from the event stream into rmcp
async fn run_reader(
    connector_name: String,
    mut events: EventStream,
    inbound: mpsc::UnboundedSender<ServerJsonRpcMessage>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };
        match event {
            Some(Ok(event)) if event_type(&event) == EVENT_MESSAGE => {
                let Some(data) = event.data.as_deref() else {
                    continue;
                };
                match serde_json::from_str::<ServerJsonRpcMessage>(data) {
                    Ok(message) => {
                        if inbound.unbounded_send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(
                        connector = %connector_name,
                        error = %e,
                        "Dropping unparseable server message"
                    ),
                }
            }
            Some(Ok(event)) => {
                debug!(connector = %connector_name, event = %event_type(&event), "Ignoring event");
            }
            Some(Err(e)) => {
                warn!(connector = %connector_name, error = %e, "Event stream failed");
                break;
            }
            None => {
                debug!(connector = %connector_name, "Event stream ended");
                break;
            }
        }
    }
}

/// POST client messages from rmcp to the endpoint
async fn run_writer(
    connector_name: String,
    http: reqwest::Client,
    endpoint: Url,
    mut outbound: mpsc::UnboundedReceiver<ClientJsonRpcMessage>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = outbound.next() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let result = http
            .post(endpoint.clone())
            .json(&message)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(e) = result {
            warn!(connector = %connector_name, error = %e, "Failed to post message");
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self) -> GatewayResult<Arc<dyn BackendClient>> {
        info!(
            connector = %self.connector_name,
            url = %self.url,
            "Connecting to SSE server"
        );

        let http = reqwest::Client::builder()
            .connect_timeout(self.request_timeout)
            .build()
            .map_err(|e| GatewayError::Connect(format!("Failed to build HTTP client: {}", e)))?;

        // Until the handshake succeeds, leaving this future by any path
        // (error, timeout, or the caller dropping it) stops the bridge tasks
        let shutdown = CancellationToken::new();
        let guard = shutdown.clone().drop_guard();

        let opened = tokio::time::timeout(
            self.connect_timeout,
            self.open_and_handshake(http, &shutdown),
        )
        .await;
        let client = match opened {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                error!(connector = %self.connector_name, "{}", e);
                return Err(e);
            }
            Err(_) => {
                let err = format!("Connection timeout ({:?})", self.connect_timeout);
                error!(connector = %self.connector_name, "{}", err);
                return Err(GatewayError::Connect(err));
            }
        };
        guard.disarm();

        info!(connector = %self.connector_name, "SSE server connected");

        Ok(Arc::new(
            RmcpBackend::new(self.description(), client).with_transport_tasks(shutdown),
        ))
    }

    fn transport_kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    fn description(&self) -> String {
        format!("sse:{}", self.url)
    }
}
