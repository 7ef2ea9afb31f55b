//! Shared utilities for integration testing: mock origin, mock decision
//! API, analytics collector, and a mediator wired to all three.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::IntoResponse,
    routing::{any, post},
    Json, Router,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use edge_mediator::{HttpServer, MediatorConfig, Shutdown};

pub const PAGE: &str = "<!doctype html><html><head><title>origin</title></head><body>origin page</body></html>";

/// A request as the mock origin saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Clone, Default)]
pub struct Recorder {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Recorder {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn for_path(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

async fn origin_handler(
    State(recorder): State<Recorder>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let gzip = headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    recorder.requests.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        headers,
        body,
    });

    let mut response = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(PAGE.as_bytes()).unwrap();
        let mut response = (StatusCode::OK, encoder.finish().unwrap()).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        response
    } else {
        (StatusCode::OK, PAGE).into_response()
    };
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    // Origins behind another mediator may echo the marker back.
    headers.insert("x-edge-mediated", HeaderValue::from_static("true"));
    response
}

/// Start an origin serving `PAGE` for every path and recording requests.
/// The page is gzipped whenever the request accepts it.
pub async fn start_mock_origin() -> (SocketAddr, Recorder) {
    let recorder = Recorder::default();
    let router = Router::new()
        .route("/", any(origin_handler))
        .route("/{*path}", any(origin_handler))
        .with_state(recorder.clone());
    (serve(router).await, recorder)
}

#[derive(Clone, Default)]
pub struct DecisionLog {
    pub calls: Arc<AtomicUsize>,
    pub bodies: Arc<Mutex<Vec<Value>>>,
}

impl DecisionLog {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// `/` redirects to `/landing-b` and reports the `landing` experiment,
/// paths under `/fail` answer 500, everything else is plain content.
async fn decide_handler(State(log): State<DecisionLog>, Json(body): Json<Value>) -> impl IntoResponse {
    log.calls.fetch_add(1, Ordering::SeqCst);
    let path = body["attributes"]["path"].as_str().unwrap_or_default().to_string();
    log.bodies.lock().unwrap().push(body);

    if path.starts_with("/fail") {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"})));
    }
    if path == "/" {
        return (
            StatusCode::OK,
            Json(json!({
                "redirect": {"url": "/landing-b"},
                "experiments": [{"key": "landing", "variation_id": 1, "value": "b"}],
            })),
        );
    }
    (StatusCode::OK, Json(json!({"experiments": [], "features": {"banner": true}})))
}

pub async fn start_mock_decision() -> (SocketAddr, DecisionLog) {
    let log = DecisionLog::default();
    let router = Router::new()
        .route("/api/edge/decide", post(decide_handler))
        .with_state(log.clone());
    (serve(router).await, log)
}

async fn collect_handler(State(events): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>) -> StatusCode {
    events.lock().unwrap().push(body);
    StatusCode::OK
}

/// Analytics endpoint collecting every posted body.
pub async fn start_collector() -> (SocketAddr, Arc<Mutex<Vec<Value>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let router = Router::new()
        .route("/track", post(collect_handler))
        .with_state(events.clone());
    (serve(router).await, events)
}

/// Everything a test needs to drive and observe one mediator.
pub struct Edge {
    pub addr: SocketAddr,
    pub origin: Recorder,
    pub decisions: DecisionLog,
    pub events: Arc<Mutex<Vec<Value>>>,
    pub shutdown: Shutdown,
}

impl Edge {
    pub fn url(&self, path: &str) -> url::Url {
        url::Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    /// Wait for at least `n` analytics events.
    pub async fn events(&self, n: usize) -> Vec<Value> {
        for _ in 0..100 {
            let events = self.events.lock().unwrap().clone();
            if events.len() >= n {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.events.lock().unwrap().clone()
    }
}

/// Start a mediator fronting a fresh mock origin, decision API and collector.
pub async fn start_edge() -> Edge {
    let (origin_addr, origin) = start_mock_origin().await;
    let (decision_addr, decisions) = start_mock_decision().await;
    let (collector_addr, events) = start_collector().await;

    let mut config = MediatorConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.origin.scheme = "http".into();
    config.origin.address = Some(origin_addr.to_string());
    config.decision.api_host = format!("http://{}", decision_addr);
    config.decision.client_key = "sdk-integration".into();
    config.analytics.endpoint = format!("http://{}/track", collector_addr);
    config.analytics.token = Some("test-token".into());
    config.analytics.environment = "test".into();
    config.analytics.max_attempts = 1;

    let server = HttpServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, signal).await;
    });

    Edge {
        addr,
        origin,
        decisions,
        events,
        shutdown,
    }
}

/// Plain client: no proxy, redirects surfaced to the caller.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
