//! Request mediation pipeline.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → OPTIONS?            → HeaderPolicy::preflight
//!     → loop marker?        → origin (unchanged) → [policy]
//!     → buffer body once    → IncomingRequest
//!     → augmented copy + ContextAttributes
//!     → DecisionService (decide call bounded by the decision deadline)
//!         → Redirect        → policy → client
//!         → Content         → [bootstrap into HTML] → policy → client
//!         → Err(Origin)     → 502 (the origin already had the request)
//!         → Err             → origin (unaugmented copy) → policy → client
//! ```
//!
//! # Design Decisions
//! - Each request is handled with values it owns; the mediator holds no per-request state
//! - Decision failures never reach the client; only buffering failures produce a 500
//! - The body reaches the origin at most once: a failed origin leg is never retried
//! - The loop marker is stripped from every response before it leaves

pub mod html;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, Response, StatusCode},
};

use crate::config::{MediatorConfig, OriginConfig};
use crate::decision::{Decision, DecisionError, DecisionService, EdgeHooks};
use crate::http::origin::Origin;
use crate::http::request::{ForwardedRequest, IncomingRequest, RequestError};
use crate::http::response::sanitize;
use crate::navigation::bootstrap::registration_snippet;
use crate::observability::metrics;
use crate::security::{HeaderPolicy, LoopGuard, PolicyExempt};

/// Failures that surface to the client as an internal error.
#[derive(Debug, thiserror::Error)]
pub enum MediatorError {
    #[error("could not prepare request: {0}")]
    Request(#[from] RequestError),
}

/// Which branch of the pipeline produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Preflight,
    Bypass,
    Redirect,
    Content,
    FailOpen,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Preflight => "preflight",
            Outcome::Bypass => "bypass",
            Outcome::Redirect => "redirect",
            Outcome::Content => "content",
            Outcome::FailOpen => "fail_open",
            Outcome::Error => "error",
        }
    }
}

/// Per-process settings the pipeline reads on every request.
#[derive(Debug, Clone)]
pub struct MediatorSettings {
    pub origin: OriginConfig,
    pub max_body_size: usize,
    pub apply_on_bypass: bool,
    /// Registration snippet to inject, `None` when injection is disabled.
    pub bootstrap: Option<String>,
}

impl MediatorSettings {
    pub fn from_config(config: &MediatorConfig) -> Self {
        let bootstrap = config.pipeline.inject_bootstrap.then(|| {
            registration_snippet(
                &config.pipeline.worker_script_path,
                &config.pipeline.worker_scope,
            )
        });

        Self {
            origin: config.origin.clone(),
            max_body_size: config.security.max_body_size,
            apply_on_bypass: config.policy.apply_on_bypass,
            bootstrap,
        }
    }
}

/// The edge request handler.
pub struct RequestMediator {
    settings: MediatorSettings,
    policy: HeaderPolicy,
    decision: Arc<dyn DecisionService>,
    origin: Arc<dyn Origin>,
    hooks: Arc<dyn EdgeHooks>,
}

impl RequestMediator {
    pub fn new(
        settings: MediatorSettings,
        policy: HeaderPolicy,
        decision: Arc<dyn DecisionService>,
        origin: Arc<dyn Origin>,
        hooks: Arc<dyn EdgeHooks>,
    ) -> Self {
        Self {
            settings,
            policy,
            decision,
            origin,
            hooks,
        }
    }

    pub fn policy(&self) -> &HeaderPolicy {
        &self.policy
    }

    /// Handle one request. Never fails: every error maps to a response.
    pub async fn handle(&self, request: Request<Body>) -> Response<Body> {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let (outcome, response) = self.dispatch(request).await;

        tracing::debug!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            outcome = outcome.as_str(),
            "Request mediated"
        );
        metrics::record_request(method.as_str(), response.status().as_u16(), outcome.as_str(), start);
        response
    }

    async fn dispatch(&self, request: Request<Body>) -> (Outcome, Response<Body>) {
        if request.method() == Method::OPTIONS {
            return (Outcome::Preflight, self.policy.preflight());
        }

        if LoopGuard::is_marked(request.headers()) {
            return (Outcome::Bypass, self.bypass(request).await);
        }

        let incoming = match self.prepare(request).await {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::error!(error = %e, "Failed to prepare request");
                return (Outcome::Error, self.internal_error());
            }
        };

        let augmented = incoming.augmented();
        let context = self.hooks.attributes(&augmented);

        match self.decision.evaluate(augmented, &context).await {
            Ok(Decision::Redirect { instruction, response }) => {
                tracing::debug!(location = %instruction.url, status = instruction.status, "Serving redirect");
                (Outcome::Redirect, self.finish(response))
            }
            Ok(Decision::Content(response)) => (Outcome::Content, self.content(response).await),
            Err(DecisionError::Origin(e)) => {
                metrics::record_decision_failure("origin");
                tracing::error!(error = %e, "Origin request failed during evaluation");
                (Outcome::Error, self.bad_gateway())
            }
            Err(e) => {
                metrics::record_decision_failure(e.kind());
                tracing::warn!(error = %e, host = %incoming.target.hostname(), "Decision failed, failing open");
                (Outcome::FailOpen, self.forward(incoming.unaugmented()).await)
            }
        }
    }

    async fn prepare(&self, request: Request<Body>) -> Result<IncomingRequest, MediatorError> {
        Ok(IncomingRequest::from_request(request, &self.settings.origin, self.settings.max_body_size).await?)
    }

    /// Loop-guard leg: straight to the origin, decision service untouched.
    async fn bypass(&self, request: Request<Body>) -> Response<Body> {
        let forwarded =
            match ForwardedRequest::passthrough(request, &self.settings.origin, self.settings.max_body_size).await {
                Ok(forwarded) => forwarded,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to buffer marked request");
                    return self.internal_error();
                }
            };

        if self.settings.apply_on_bypass {
            return self.forward(forwarded).await;
        }

        match self.origin.send(forwarded).await {
            Ok(mut response) => {
                sanitize(response.headers_mut());
                response.extensions_mut().insert(PolicyExempt);
                response
            }
            Err(e) => {
                tracing::error!(error = %e, "Origin request failed");
                self.bad_gateway()
            }
        }
    }

    /// Send to the origin; transport failure becomes 502.
    async fn forward(&self, request: ForwardedRequest) -> Response<Body> {
        match self.origin.send(request).await {
            Ok(response) => self.finish(response),
            Err(e) => {
                tracing::error!(error = %e, "Origin request failed");
                self.bad_gateway()
            }
        }
    }

    /// Origin-backed decision result, with the bootstrap injected into HTML.
    async fn content(&self, response: Response<Body>) -> Response<Body> {
        let Some(script) = self.settings.bootstrap.as_deref() else {
            return self.finish(response);
        };
        if !html::is_rewritable_html(response.headers()) {
            return self.finish(response);
        }

        let declared = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.settings.max_body_size) {
            tracing::debug!(length = ?declared, "HTML too large to rewrite");
            return self.finish(response);
        }

        let (mut parts, body) = response.into_parts();
        let bytes = match body::to_bytes(body, self.settings.max_body_size).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read HTML body");
                return self.bad_gateway();
            }
        };

        let body = match html::inject_bootstrap(&bytes, script) {
            Some(rewritten) => {
                parts.headers.remove(header::CONTENT_LENGTH);
                Body::from(rewritten)
            }
            None => Body::from(bytes),
        };
        self.finish(Response::from_parts(parts, body))
    }

    /// Strip the marker and connection headers, then apply the policy.
    fn finish(&self, mut response: Response<Body>) -> Response<Body> {
        sanitize(response.headers_mut());
        self.policy.apply_to(response)
    }

    fn bad_gateway(&self) -> Response<Body> {
        self.policy.text(StatusCode::BAD_GATEWAY, "Bad Gateway")
    }

    fn internal_error(&self) -> Response<Body> {
        self.policy
            .text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecisionConfig;
    use crate::context::ContextAttributes;
    use crate::decision::{MediatorHooks, RedirectInstruction, RemoteDecisionService};
    use crate::http::origin::OriginError;
    use crate::security::LOOP_MARKER;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const PAGE: &str = "<html><head><title>shop</title></head><body>hi</body></html>";

    /// Origin double recording every forwarded request.
    struct RecordingOrigin {
        seen: Mutex<Vec<ForwardedRequest>>,
        content_type: &'static str,
        fail: bool,
        delay: Duration,
    }

    impl RecordingOrigin {
        fn serving(content_type: &'static str) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                content_type,
                fail: false,
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                content_type: "text/html",
                fail: false,
                delay,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                content_type: "text/plain",
                fail: true,
                delay: Duration::ZERO,
            })
        }

        fn seen(&self) -> Vec<ForwardedRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Origin for RecordingOrigin {
        async fn send(&self, request: ForwardedRequest) -> Result<Response<Body>, OriginError> {
            self.seen.lock().unwrap().push(request);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                let err = reqwest::Client::new().get("http://[::1").build().unwrap_err();
                return Err(OriginError::Transport(err));
            }
            let mut response = Response::new(Body::from(PAGE));
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(PAGE.len()));
            headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
            headers.insert(LOOP_MARKER, HeaderValue::from_static("true"));
            Ok(response)
        }
    }

    enum Behavior {
        Redirect(&'static str),
        Content,
        Fail,
    }

    /// Decision double; content decisions go through the shared origin.
    struct StubDecision {
        behavior: Behavior,
        origin: Arc<RecordingOrigin>,
        calls: AtomicUsize,
        contexts: Mutex<Vec<ContextAttributes>>,
    }

    #[async_trait]
    impl DecisionService for StubDecision {
        async fn evaluate(
            &self,
            request: ForwardedRequest,
            context: &ContextAttributes,
        ) -> Result<Decision, DecisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.contexts.lock().unwrap().push(context.clone());
            match self.behavior {
                Behavior::Redirect(url) => {
                    let instruction = RedirectInstruction::new(url, 302);
                    let response = crate::decision::default_redirect(&instruction);
                    Ok(Decision::Redirect { instruction, response })
                }
                Behavior::Content => Ok(Decision::Content(self.origin.send(request).await?)),
                Behavior::Fail => Err(DecisionError::Malformed("bad json".into())),
            }
        }
    }

    struct Harness {
        mediator: RequestMediator,
        decision: Arc<StubDecision>,
        origin: Arc<RecordingOrigin>,
    }

    fn settings() -> MediatorSettings {
        MediatorSettings {
            origin: OriginConfig {
                scheme: "http".into(),
                ..OriginConfig::default()
            },
            max_body_size: 1024 * 1024,
            apply_on_bypass: true,
            bootstrap: Some("<script data-edge-navigation>sw()</script>".into()),
        }
    }

    fn harness_with(behavior: Behavior, origin: Arc<RecordingOrigin>, settings: MediatorSettings) -> Harness {
        let decision = Arc::new(StubDecision {
            behavior,
            origin: origin.clone(),
            calls: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        });
        let mediator = RequestMediator::new(
            settings,
            HeaderPolicy::default(),
            decision.clone(),
            origin.clone(),
            Arc::new(MediatorHooks::new(None)),
        );
        Harness {
            mediator,
            decision,
            origin,
        }
    }

    fn harness(behavior: Behavior) -> Harness {
        harness_with(behavior, RecordingOrigin::serving("text/html; charset=utf-8"), settings())
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder()
            .uri(path)
            .header(header::HOST, "shop.example.com")
            .header(header::COOKIE, "gbuuid=abc123; growthbook=flagblob")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_of(response: Response<Body>) -> Bytes {
        body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    fn assert_policy(headers: &HeaderMap) {
        let policy = HeaderPolicy::default();
        for (name, value) in policy.headers() {
            let values: Vec<_> = headers.get_all(name).iter().collect();
            assert_eq!(values, vec![value], "header {}", name);
        }
    }

    #[tokio::test]
    async fn preflight_is_exactly_policy_and_skips_decision() {
        let h = harness(Behavior::Content);
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api")
            .header(header::HOST, "shop.example.com")
            .body(Body::empty())
            .unwrap();

        let response = h.mediator.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers(), HeaderPolicy::default().headers());
        assert!(body_of(response).await.is_empty());
        assert_eq!(h.decision.calls.load(Ordering::SeqCst), 0);
        assert!(h.origin.seen().is_empty());
    }

    #[tokio::test]
    async fn marked_request_bypasses_decision() {
        let h = harness(Behavior::Redirect("/never"));
        let mut request = get("/pricing");
        LoopGuard::mark(request.headers_mut());

        let response = h.mediator.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(LOOP_MARKER).is_none());
        assert_policy(response.headers());
        assert_eq!(h.decision.calls.load(Ordering::SeqCst), 0);

        let seen = h.origin.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_marked());
        // Bypass never rewrites the body.
        assert_eq!(body_of(response).await, PAGE.as_bytes());
    }

    #[tokio::test]
    async fn bypass_can_trust_origin_headers() {
        let mut settings = settings();
        settings.apply_on_bypass = false;
        let h = harness_with(Behavior::Content, RecordingOrigin::serving("text/html"), settings);
        let mut request = get("/");
        LoopGuard::mark(request.headers_mut());

        let response = h.mediator.handle(request).await;

        assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
        assert!(response.headers().get(LOOP_MARKER).is_none());
        assert!(response.extensions().get::<PolicyExempt>().is_some());
    }

    #[tokio::test]
    async fn redirect_never_contacts_origin() {
        let h = harness(Behavior::Redirect("https://shop.example.com/b"));

        let response = h.mediator.handle(get("/")).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://shop.example.com/b");
        assert_policy(response.headers());
        assert!(h.origin.seen().is_empty());
    }

    #[tokio::test]
    async fn html_content_gets_bootstrap_and_policy() {
        let h = harness(Behavior::Content);

        let response = h.mediator.handle(get("/pricing?utm_source=ads")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_policy(response.headers());
        assert!(response.headers().get(LOOP_MARKER).is_none());
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());

        let body = body_of(response).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("<script data-edge-navigation>sw()</script></head>"));

        let seen = h.origin.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_marked());

        let contexts = h.decision.contexts.lock().unwrap();
        assert_eq!(contexts[0].id, "abc123");
        assert_eq!(contexts[0].flag_blob, "flagblob");
        assert_eq!(contexts[0].utm_source.as_deref(), Some("ads"));
    }

    #[tokio::test]
    async fn non_html_content_is_untouched() {
        let h = harness_with(Behavior::Content, RecordingOrigin::serving("text/css"), settings());

        let response = h.mediator.handle(get("/site.css")).await;

        assert_policy(response.headers());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], PAGE.len().to_string().as_str());
        assert_eq!(body_of(response).await, PAGE.as_bytes());
    }

    #[tokio::test]
    async fn injection_can_be_disabled() {
        let mut settings = settings();
        settings.bootstrap = None;
        let h = harness_with(Behavior::Content, RecordingOrigin::serving("text/html"), settings);

        let response = h.mediator.handle(get("/")).await;

        assert_eq!(body_of(response).await, PAGE.as_bytes());
    }

    #[tokio::test]
    async fn post_body_reaches_origin_once_and_intact() {
        let h = harness(Behavior::Fail);
        let payload = Bytes::from_static(b"name=a%20b&qty=2\x00\xff");
        let request = Request::builder()
            .method(Method::POST)
            .uri("/checkout")
            .header(header::HOST, "shop.example.com")
            .body(Body::from(payload.clone()))
            .unwrap();

        h.mediator.handle(request).await;

        let seen = h.origin.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].body, payload);
    }

    #[tokio::test]
    async fn decision_failure_fails_open_unmarked() {
        let h = harness(Behavior::Fail);

        let response = h.mediator.handle(get("/")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_policy(response.headers());
        let seen = h.origin.seen();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].is_marked());
        // Fail-open serves the origin as-is.
        assert_eq!(body_of(response).await, PAGE.as_bytes());
    }

    #[tokio::test]
    async fn origin_failure_during_evaluation_is_not_replayed() {
        let h = harness_with(Behavior::Content, RecordingOrigin::failing(), settings());

        let response = h.mediator.handle(get("/")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_policy(response.headers());
        let seen = h.origin.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_marked());
    }

    /// Decision API answering every call with plain content.
    async fn content_decision_api() -> String {
        let app = axum::Router::new().route(
            "/api/edge/decide",
            axum::routing::post(|| async { r#"{"experiments":[],"features":{}}"# }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn slow_origin_outlasting_decision_deadline_sees_post_once() {
        let origin = RecordingOrigin::slow(Duration::from_millis(400));
        let config = DecisionConfig {
            api_host: content_decision_api().await,
            timeout_ms: 200,
            ..DecisionConfig::default()
        };
        let hooks: Arc<dyn EdgeHooks> = Arc::new(MediatorHooks::new(None));
        let decision = RemoteDecisionService::new(
            &config,
            reqwest::Client::builder().no_proxy().build().unwrap(),
            origin.clone(),
            hooks.clone(),
        )
        .unwrap();
        let mediator = RequestMediator::new(
            settings(),
            HeaderPolicy::default(),
            Arc::new(decision),
            origin.clone(),
            hooks,
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/checkout")
            .header(header::HOST, "shop.example.com")
            .body(Body::from("pay=1"))
            .unwrap();

        let response = mediator.handle(request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let seen = origin.seen();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_marked());
        assert_eq!(&seen[0].body[..], b"pay=1");
    }

    #[tokio::test]
    async fn origin_failure_is_bad_gateway_with_policy() {
        let h = harness_with(Behavior::Fail, RecordingOrigin::failing(), settings());

        let response = h.mediator.handle(get("/")).await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_policy(response.headers());
    }

    #[tokio::test]
    async fn unbufferable_request_is_internal_error() {
        let mut settings = settings();
        settings.max_body_size = 4;
        let h = harness_with(Behavior::Content, RecordingOrigin::serving("text/html"), settings);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::HOST, "shop.example.com")
            .body(Body::from("far too long"))
            .unwrap();

        let response = h.mediator.handle(request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_policy(response.headers());
        assert_eq!(body_of(response).await, "Internal Server Error".as_bytes());
        assert_eq!(h.decision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn replay_yields_identical_headers() {
        let h = harness(Behavior::Content);

        let first = h.mediator.handle(get("/")).await;
        let second = h.mediator.handle(get("/")).await;

        assert_eq!(first.headers(), second.headers());
        assert_eq!(h.decision.calls.load(Ordering::SeqCst), 2);
        assert!(h.origin.seen().iter().all(ForwardedRequest::is_marked));
    }
}
