//! Test: transport factory over real network servers
//!
//! Validates that:
//! 1. A streamable HTTP connector handshakes, lists, calls and closes
//! 2. A legacy SSE connector follows the `endpoint` event and posts messages
//! 3. Servers that never announce an endpoint or fail outright are rejected
//! 4. An abandoned or timed-out SSE connect closes its event stream

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use mcphub_core::{ConnectorSpec, TransportKind};
use mcphub_gateway::{ClientFactory, GatewayError, TransportFactory};
use parking_lot::Mutex;
use rmcp::{
    model::*,
    service::RequestContext,
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tests::async_helpers::eventually;
use tests::fixtures::args;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn factory() -> TransportFactory {
    TransportFactory::new()
        .with_timeout(Duration::from_secs(5))
        .with_request_timeout(Duration::from_secs(5))
}

// ============================================================================
// Streamable HTTP
// ============================================================================

/// Echo server: one tool that returns its `message` argument
#[derive(Clone)]
struct EchoHandler;

impl ServerHandler for EchoHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "echo-server".to_string(),
                version: "1.0.0".to_string(),
                ..Default::default()
            },
            instructions: None,
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let schema: Arc<serde_json::Map<String, Value>> = Arc::new(
            serde_json::from_value(json!({
                "type": "object",
                "properties": { "message": { "type": "string" } }
            }))
            .unwrap(),
        );
        Ok(ListToolsResult::with_all_items(vec![Tool::new(
            "echo",
            "Echo a message",
            schema,
        )]))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let message = params
            .arguments
            .as_ref()
            .and_then(|a| a.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(CallToolResult::success(vec![Content::text(format!(
            "echo: {}",
            message
        ))]))
    }
}

async fn start_echo_server() -> (String, CancellationToken) {
    let ct = CancellationToken::new();

    let service = StreamableHttpService::new(
        || Ok(EchoHandler),
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: Some(Duration::from_secs(15)),
            sse_retry: Some(Duration::from_secs(3)),
            cancellation_token: ct.child_token(),
        },
    );

    let router = Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let url = format!("http://127.0.0.1:{}/mcp", listener.local_addr().unwrap().port());

    let ct_clone = ct.clone();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { ct_clone.cancelled().await })
            .await
            .unwrap();
    });

    (url, ct)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_streamable_http_round_trip() {
    let (url, ct) = start_echo_server().await;
    let connector = ConnectorSpec::remote("echo", TransportKind::StreamableHttp, url);

    let client = factory()
        .connect(&connector, &HashMap::new())
        .await
        .expect("client should connect");

    let tools = client.list_tools().await.expect("list_tools should work");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    let result = client
        .call_tool("echo", Some(args(json!({ "message": "hello" }))))
        .await
        .expect("call_tool should work");
    let text = serde_json::to_value(&result).unwrap()["content"][0]["text"].clone();
    assert_eq!(text, "echo: hello");

    client.close().await.expect("close should work");
    // Second close is a no-op
    client.close().await.expect("second close should work");
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_streamable_http_server_error_fails_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let connector = ConnectorSpec::remote(
        "broken",
        TransportKind::StreamableHttp,
        format!("{}/mcp", server.uri()),
    );
    let result = factory().connect(&connector, &HashMap::new()).await;

    assert!(matches!(result, Err(GatewayError::Connect(_))));
}

// ============================================================================
// Legacy SSE
// ============================================================================

/// Minimal legacy SSE server
///
/// `GET /sse` announces `/messages` and then relays responses; `POST
/// /messages` answers `initialize`, `tools/list` and `tools/call` unless
/// the server is muted.
#[derive(Clone, Default)]
struct LegacySseServer {
    outbound: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    posted: Arc<Mutex<Vec<Value>>>,
    mute: bool,
    streams_opened: Arc<AtomicUsize>,
    open_streams: Arc<AtomicUsize>,
}

/// Counts an event stream as open until the response body is dropped
struct OpenStream(Arc<AtomicUsize>);

impl OpenStream {
    fn new(server: &LegacySseServer) -> Self {
        server.streams_opened.fetch_add(1, Ordering::SeqCst);
        server.open_streams.fetch_add(1, Ordering::SeqCst);
        Self(server.open_streams.clone())
    }
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LegacySseServer {
    /// Accepts posts but never answers them
    fn muted() -> Self {
        Self {
            mute: true,
            ..Default::default()
        }
    }

    fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    fn posted_methods(&self) -> Vec<String> {
        self.posted
            .lock()
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_string))
            .collect()
    }

    fn answer(request: &Value) -> Option<Value> {
        let id = request.get("id")?.clone();
        let result = match request["method"].as_str()? {
            "initialize" => json!({
                "protocolVersion": request["params"]["protocolVersion"].clone(),
                "capabilities": { "tools": {} },
                "serverInfo": { "name": "legacy-sse", "version": "1.0.0" }
            }),
            "tools/list" => json!({
                "tools": [{
                    "name": "ping",
                    "description": "Ping the server",
                    "inputSchema": { "type": "object" }
                }]
            }),
            "tools/call" => json!({
                "content": [{ "type": "text", "text": "pong" }],
                "isError": false
            }),
            _ => return None,
        };
        Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
    }
}

async fn legacy_stream(
    State(server): State<LegacySseServer>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (tx, rx) = mpsc::unbounded::<String>();
    *server.outbound.lock() = Some(tx);
    let open = OpenStream::new(&server);

    let endpoint = futures::stream::once(async { Event::default().event("endpoint").data("/messages") });
    let messages = rx.map(|data| Event::default().event("message").data(data));
    let events = endpoint.chain(messages).map(move |event| {
        let _open = &open;
        Ok(event)
    });
    // Keep-alives make a vanished client show up as a failed write
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_millis(50)))
}

async fn legacy_message(
    State(server): State<LegacySseServer>,
    Json(request): Json<Value>,
) -> StatusCode {
    server.posted.lock().push(request.clone());
    if server.mute {
        return StatusCode::ACCEPTED;
    }
    if let Some(response) = LegacySseServer::answer(&request) {
        if let Some(tx) = server.outbound.lock().as_ref() {
            let _ = tx.unbounded_send(response.to_string());
        }
    }
    StatusCode::ACCEPTED
}

async fn start_legacy_server(server: LegacySseServer) -> (String, CancellationToken) {
    let ct = CancellationToken::new();
    let router = Router::new()
        .route("/sse", get(legacy_stream))
        .route("/messages", post(legacy_message))
        .with_state(server);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let url = format!("http://127.0.0.1:{}/sse", listener.local_addr().unwrap().port());

    let ct_clone = ct.clone();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { ct_clone.cancelled().await })
            .await
            .unwrap();
    });

    (url, ct)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sse_round_trip() {
    let server = LegacySseServer::default();
    let (url, ct) = start_legacy_server(server.clone()).await;
    let connector = ConnectorSpec::remote("legacy", TransportKind::Sse, url);

    let client = factory()
        .connect(&connector, &HashMap::new())
        .await
        .expect("client should connect");

    let tools = client.list_tools().await.expect("list_tools should work");
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "ping");

    let result = client
        .call_tool("ping", None)
        .await
        .expect("call_tool should work");
    assert_eq!(result.is_error, Some(false));

    let methods = server.posted_methods();
    assert_eq!(methods[0], "initialize");
    assert!(methods.contains(&"notifications/initialized".to_string()));
    assert!(methods.contains(&"tools/call".to_string()));

    client.close().await.expect("close should work");
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abandoned_sse_connect_closes_event_stream() {
    let server = LegacySseServer::muted();
    let (url, ct) = start_legacy_server(server.clone()).await;
    let connector = ConnectorSpec::remote("mute", TransportKind::Sse, url);

    // The caller gives up while the handshake is still waiting for an answer
    let abandoned = tokio::time::timeout(
        Duration::from_millis(500),
        factory().connect(&connector, &HashMap::new()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(server.streams_opened(), 1);
    assert_eq!(server.posted_methods(), vec!["initialize"]);

    assert!(eventually(|| server.open_streams() == 0).await);
    ct.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sse_handshake_timeout_closes_event_stream() {
    let server = LegacySseServer::muted();
    let (url, ct) = start_legacy_server(server.clone()).await;
    let connector = ConnectorSpec::remote("mute", TransportKind::Sse, url);

    let result = TransportFactory::new()
        .with_timeout(Duration::from_millis(300))
        .connect(&connector, &HashMap::new())
        .await;

    match result {
        Err(GatewayError::Connect(message)) => assert!(message.contains("timeout")),
        Err(other) => panic!("expected connect error, got {other}"),
        Ok(_) => panic!("connect should fail"),
    }
    assert_eq!(server.streams_opened(), 1);
    assert!(eventually(|| server.open_streams() == 0).await);
    ct.cancel();
}

#[tokio::test]
async fn test_sse_without_endpoint_event_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("event: message\ndata: {}\n\n"),
        )
        .mount(&server)
        .await;

    let connector =
        ConnectorSpec::remote("silent", TransportKind::Sse, format!("{}/sse", server.uri()));
    let result = factory().connect(&connector, &HashMap::new()).await;

    match result {
        Err(GatewayError::Connect(message)) => assert!(message.contains("endpoint")),
        Err(other) => panic!("expected connect error, got {other}"),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_sse_http_error_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sse"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let connector =
        ConnectorSpec::remote("broken", TransportKind::Sse, format!("{}/sse", server.uri()));
    let result = factory().connect(&connector, &HashMap::new()).await;

    match result {
        Err(GatewayError::Connect(message)) => {
            assert!(message.contains("Failed to open event stream"))
        }
        Err(other) => panic!("expected connect error, got {other}"),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_invalid_remote_url_is_configuration_error() {
    let connector = ConnectorSpec::remote("bad", TransportKind::Sse, "not a url");

    let result = factory().connect(&connector, &HashMap::new()).await;
    assert!(matches!(result, Err(GatewayError::Configuration(_))));
}
