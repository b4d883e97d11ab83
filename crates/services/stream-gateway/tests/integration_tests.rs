//! Integration tests for the Stream Gateway
//!
//! Each test runs a mock device manager / RTMP server and a real gateway on
//! ephemeral ports, then talks to the gateway over HTTP and WebSocket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use stream_gateway::api::{build_router, AppState};
use stream_gateway::config::{Config, CorsConfig};
use stream_gateway::error::ErrorResponse;
use stream_gateway::stats::StreamDescriptor;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const STATS_BODY: &str = r#"[
    {"name":"cam2","status":"live","start_time":"2025-01-01T10:00:00Z","resolution":"1280x720","bitrate":2500000},
    {"name":"cam1","status":"idle"},
    {"name":"screen","status":"error"}
]"#;

/// One request the mock device manager received
#[derive(Debug, Clone)]
struct Forwarded {
    path: String,
    body: Bytes,
    content_type: Option<String>,
}

/// Mock device manager + RTMP server sharing one listener
#[derive(Clone)]
struct MockUpstream {
    stat_hits: Arc<AtomicUsize>,
    stat_body: Arc<Mutex<String>>,
    forwarded: Arc<Mutex<Vec<Forwarded>>>,
}

impl MockUpstream {
    fn new(stat_body: &str) -> Self {
        Self {
            stat_hits: Arc::new(AtomicUsize::new(0)),
            stat_body: Arc::new(Mutex::new(stat_body.to_string())),
            forwarded: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn set_stat_body(&self, body: &str) {
        *self.stat_body.lock().unwrap() = body.to_string();
    }

    fn stat_hits(&self) -> usize {
        self.stat_hits.load(Ordering::SeqCst)
    }

    fn forwarded(&self) -> Vec<Forwarded> {
        self.forwarded.lock().unwrap().clone()
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/stat", get(mock_stat))
            .route("/control/:name", post(mock_record))
            .route("/clip/:name", post(mock_record))
            .route("/devices", get(mock_devices))
            .route("/devices/:id/reconnect", post(mock_record))
            .route("/recordings", get(mock_recordings))
            .route("/recordings/:id", post(mock_record))
            .with_state(self.clone())
    }
}

/// `{hit}` in the configured body is replaced with the 1-based hit number
async fn mock_stat(State(mock): State<MockUpstream>) -> impl IntoResponse {
    let hit = mock.stat_hits.fetch_add(1, Ordering::SeqCst) + 1;
    let body = mock
        .stat_body
        .lock()
        .unwrap()
        .replace("{hit}", &hit.to_string());
    ([(header::CONTENT_TYPE, "application/json")], body)
}

async fn mock_record(
    State(mock): State<MockUpstream>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    mock.forwarded.lock().unwrap().push(Forwarded {
        path: uri.path().to_string(),
        body,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    (
        StatusCode::ACCEPTED,
        [(header::CONTENT_TYPE, "application/json")],
        format!(r#"{{"forwarded":"{}"}}"#, uri.path()),
    )
}

async fn mock_devices() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::CONTENT_TYPE, "text/plain")],
        r#"{"error":"x"}"#,
    )
}

async fn mock_recordings() -> impl IntoResponse {
    (StatusCode::OK, r#"[{"id":"rec-1","stream":"cam2"}]"#)
}

async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A closed local port
fn dead_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

struct TestGateway {
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TestGateway {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

fn config_for(device_manager: SocketAddr, streaming_server: SocketAddr) -> Config {
    let mut config = Config::default();
    config.upstream.device_manager_url = format!("http://{}", device_manager);
    config.upstream.streaming_server_url = format!("http://{}", streaming_server);
    config
}

async fn start_gateway_with(
    device_manager: SocketAddr,
    streaming_server: SocketAddr,
    cors: CorsConfig,
) -> TestGateway {
    let mut config = config_for(device_manager, streaming_server);
    config.cors = cors;
    start_gateway_from(config).await
}

async fn start_gateway_from(config: Config) -> TestGateway {
    let shutdown = CancellationToken::new();
    let state = AppState::new(Arc::new(config), reqwest::Client::new(), shutdown.clone())
        .expect("valid test config");
    let addr = spawn_server(build_router(state)).await;

    TestGateway { addr, shutdown }
}

/// Mock upstream plus a gateway pointed at it
async fn start(stat_body: &str) -> (MockUpstream, TestGateway) {
    let mock = MockUpstream::new(stat_body);
    let upstream = spawn_server(mock.router()).await;
    let gateway = start_gateway_with(upstream, upstream, CorsConfig::default()).await;
    (mock, gateway)
}

async fn connect(gateway: &TestGateway) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(gateway.ws_url())
        .await
        .expect("WebSocket handshake");
    ws
}

/// Next stream-list push, skipping control frames
async fn next_push(ws: &mut WsClient) -> Vec<StreamDescriptor> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("push within 3s")
            .expect("connection open")
            .expect("valid frame");

        match frame {
            Message::Text(text) => return serde_json::from_str(&text).expect("stream list"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

fn names(streams: &[StreamDescriptor]) -> Vec<&str> {
    streams.iter().map(|s| s.name.as_str()).collect()
}

// ============================================================================
// REST forwarding
// ============================================================================

#[tokio::test]
async fn test_stream_command_forwarded_once() {
    let (mock, gateway) = start(STATS_BODY).await;
    let body = r#"{"command":"restart"}"#;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/streams/cam2"))
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 202);
    assert_eq!(response.text().await.unwrap(), r#"{"forwarded":"/control/cam2"}"#);

    let forwarded = mock.forwarded();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].path, "/control/cam2");
    assert_eq!(&forwarded[0].body[..], body.as_bytes());
    assert_eq!(forwarded[0].content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_clip_request_forwarded_unmodified() {
    let (mock, gateway) = start(STATS_BODY).await;
    // Odd spacing and an extra field must survive untouched.
    let body = r#"{ "duration": 30,  "title": "Goal!", "extra": true }"#;

    let response = reqwest::Client::new()
        .post(gateway.url("/api/streams/cam1/clip"))
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 202);
    let forwarded = mock.forwarded();
    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].path, "/clip/cam1");
    assert_eq!(&forwarded[0].body[..], body.as_bytes());
}

#[tokio::test]
async fn test_malformed_bodies_never_reach_upstream() {
    let (mock, gateway) = start(STATS_BODY).await;
    let client = reqwest::Client::new();

    let cases = [
        ("/api/streams/cam1", "{not json"),
        ("/api/streams/cam1", r#"{"command":"explode"}"#),
        ("/api/streams/cam1", ""),
        ("/api/streams/cam1/clip", r#"{"duration":"thirty"}"#),
        ("/api/streams/cam1/clip", "[1,2,3]"),
    ];

    for (path, body) in cases {
        let response = client
            .post(gateway.url(path))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400, "{} with {:?}", path, body);

        let error: ErrorResponse = response.json().await.unwrap();
        assert_eq!(error.error, "malformed_input");
    }

    assert!(mock.forwarded().is_empty());
}

#[tokio::test]
async fn test_devices_error_status_relayed_verbatim() {
    let (_mock, gateway) = start(STATS_BODY).await;

    let response = reqwest::get(gateway.url("/api/devices")).await.unwrap();

    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(response.text().await.unwrap(), r#"{"error":"x"}"#);
}

#[tokio::test]
async fn test_device_and_recording_posts_forwarded() {
    let (mock, gateway) = start(STATS_BODY).await;
    let client = reqwest::Client::new();

    let response = client
        .post(gateway.url("/api/devices/cam%201/reconnect"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    let response = client
        .post(gateway.url("/api/recordings/rec-1"))
        .header("content-type", "application/json")
        .body(r#"{"operation":"delete"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/json"
    );

    let forwarded = mock.forwarded();
    assert_eq!(forwarded.len(), 2);
    assert_eq!(forwarded[0].path, "/devices/cam%201/reconnect");
    assert!(forwarded[0].body.is_empty());
    assert_eq!(forwarded[1].path, "/recordings/rec-1");
    assert_eq!(&forwarded[1].body[..], br#"{"operation":"delete"}"#);
    assert_eq!(forwarded[1].content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_recordings_listed() {
    let (_mock, gateway) = start(STATS_BODY).await;

    let response = reqwest::get(gateway.url("/api/recordings")).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "application/json"
    );
    assert_eq!(
        response.text().await.unwrap(),
        r#"[{"id":"rec-1","stream":"cam2"}]"#
    );
}

#[tokio::test]
async fn test_unreachable_device_manager_is_server_error() {
    let mock = MockUpstream::new(STATS_BODY);
    let streaming = spawn_server(mock.router()).await;
    let gateway = start_gateway_with(dead_addr(), streaming, CorsConfig::default()).await;

    let response = reqwest::get(gateway.url("/api/devices")).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.error, "upstream_unreachable");
    assert!(error.message.contains("/devices"));

    let response = reqwest::Client::new()
        .post(gateway.url("/api/streams/cam1"))
        .body(r#"{"command":"stop"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);
}

#[tokio::test]
async fn test_stalled_upstream_is_gateway_error() {
    let stalled = Router::new().route(
        "/devices",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            "[]"
        }),
    );
    let upstream = spawn_server(stalled).await;
    let mut config = config_for(upstream, upstream);
    config.server.request_timeout_seconds = 1;
    let gateway = start_gateway_from(config).await;

    let started = Instant::now();
    let response = reqwest::get(gateway.url("/api/devices")).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(2500));
    assert_eq!(response.status().as_u16(), 500);

    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.error, "upstream_timeout");
    assert_eq!(error.message, "no response within 1s");
}

#[tokio::test]
async fn test_unknown_routes_are_not_found() {
    let (mock, gateway) = start(STATS_BODY).await;
    let client = reqwest::Client::new();

    let response = client.get(gateway.url("/api/nothing")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = client
        .delete(gateway.url("/api/recordings/rec-1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    assert!(mock.forwarded().is_empty());
}

// ============================================================================
// Stream listing
// ============================================================================

#[tokio::test]
async fn test_list_streams_preserves_upstream_order() {
    let (mock, gateway) = start(STATS_BODY).await;

    let response = reqwest::get(gateway.url("/api/streams")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let streams: Vec<StreamDescriptor> = response.json().await.unwrap();
    assert_eq!(names(&streams), ["cam2", "cam1", "screen"]);
    assert_eq!(streams[0].status, "live");
    assert_eq!(streams[0].bitrate, Some(2_500_000));
    assert_eq!(streams[1].status, "idle");
    assert_eq!(streams[2].status, "error");
    assert_eq!(mock.stat_hits(), 1);
}

#[tokio::test]
async fn test_list_streams_is_idempotent_and_uncached() {
    let (mock, gateway) = start(STATS_BODY).await;

    let first = reqwest::get(gateway.url("/api/streams"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let second = reqwest::get(gateway.url("/api/streams"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(mock.stat_hits(), 2);
}

#[tokio::test]
async fn test_undecodable_stats_is_server_error() {
    let (_mock, gateway) = start(r#"{"streams": "maybe"}"#).await;

    let response = reqwest::get(gateway.url("/api/streams")).await.unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.error, "upstream_decode_failed");
}

#[tokio::test]
async fn test_get_single_stream() {
    let (_mock, gateway) = start(STATS_BODY).await;

    let response = reqwest::get(gateway.url("/api/streams/cam1")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let stream: StreamDescriptor = response.json().await.unwrap();
    assert_eq!(stream.name, "cam1");
    assert_eq!(stream.status, "idle");

    let response = reqwest::get(gateway.url("/api/streams/missing")).await.unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.error, "stream_not_found");
}

// ============================================================================
// WebSocket broadcast
// ============================================================================

#[tokio::test]
async fn test_websocket_pushes_once_per_second() {
    let (_mock, gateway) = start(STATS_BODY).await;
    let mut ws = connect(&gateway).await;

    let connected_at = Instant::now();
    let mut arrivals = Vec::new();
    for _ in 0..3 {
        let streams = next_push(&mut ws).await;
        arrivals.push(Instant::now());
        assert_eq!(names(&streams), ["cam2", "cam1", "screen"]);
    }

    // First push comes one interval after the upgrade, not immediately.
    assert!(arrivals[0] - connected_at >= Duration::from_millis(500));
    for pair in arrivals.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(500) && gap <= Duration::from_millis(1500),
            "push gap {:?}",
            gap
        );
    }
}

#[tokio::test]
async fn test_disconnect_stops_polling() {
    let (mock, gateway) = start(STATS_BODY).await;
    let mut ws = connect(&gateway).await;

    next_push(&mut ws).await;
    ws.close(None).await.unwrap();
    drop(ws);

    // Allow one interval for the session to notice and wind down.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let settled = mock.stat_hits();

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(mock.stat_hits(), settled, "session kept polling after disconnect");
}

#[tokio::test]
async fn test_failed_polls_skip_ticks_without_closing() {
    let (mock, gateway) = start("this is not json").await;
    let mut ws = connect(&gateway).await;

    // Nothing is pushed while the upstream is broken.
    let silent = tokio::time::timeout(Duration::from_millis(2200), ws.next()).await;
    assert!(silent.is_err(), "unexpected frame: {:?}", silent);
    assert!(mock.stat_hits() >= 1);

    mock.set_stat_body(STATS_BODY);
    let streams = next_push(&mut ws).await;
    assert_eq!(names(&streams), ["cam2", "cam1", "screen"]);
}

#[tokio::test]
async fn test_sessions_are_independent_and_ordered() {
    let (_mock, gateway) =
        start(r#"[{"name":"cam1","status":"live","bitrate":{hit}}]"#).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect(&gateway).await);
    }

    for ws in clients.iter_mut() {
        next_push(ws).await;
    }

    // Drop one session; the others keep receiving in order.
    let mut gone = clients.remove(0);
    gone.close(None).await.unwrap();
    drop(gone);

    for ws in clients.iter_mut() {
        let mut last = 0;
        for _ in 0..2 {
            let streams = next_push(ws).await;
            let hit = streams[0].bitrate.expect("hit counter");
            assert!(hit > last, "push out of order: {} after {}", hit, last);
            last = hit;
        }
    }
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    let (_mock, gateway) = start(STATS_BODY).await;
    let mut ws = connect(&gateway).await;
    next_push(&mut ws).await;

    gateway.shutdown.cancel();

    // The server drops the socket; the client sees the stream end.
    let ended = tokio::time::timeout(Duration::from_secs(3), async {
        while let Some(frame) = ws.next().await {
            if frame.is_err() || matches!(frame, Ok(Message::Close(_))) {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "session survived shutdown");
}

#[tokio::test]
async fn test_websocket_origin_policy() {
    let mock = MockUpstream::new(STATS_BODY);
    let upstream = spawn_server(mock.router()).await;
    let cors = CorsConfig {
        allow_any_origin: false,
        allowed_origins: vec!["http://dashboard.local:3000".to_string()],
    };
    let gateway = start_gateway_with(upstream, upstream, cors).await;

    let mut request = gateway.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", "http://evil.example".parse().unwrap());
    match tokio_tungstenite::connect_async(request).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status().as_u16(), 403),
        other => panic!("expected 403, got {:?}", other.map(|(_, r)| r.status())),
    }

    let mut request = gateway.ws_url().into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", "http://dashboard.local:3000".parse().unwrap());
    let (mut ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    next_push(&mut ws).await;
    ws.send(Message::Close(None)).await.unwrap();
}
