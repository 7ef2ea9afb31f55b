//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wire the mediator with its collaborators (origin, decision service, hooks, policy)
//! - Create the Axum router: diagnostics, worker script, catch-all mediation
//! - Wire up middleware (request timeout, request ID, tracing, header policy)
//! - Answer every `OPTIONS` with the bare policy before routing (`Preflight`)
//! - Serve on a listener until the shutdown signal fires

use axum::{
    body::Body,
    extract::State,
    http::{Request, Response},
    middleware::map_response_with_state,
    routing::{any, get},
    Router, ServiceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::Layer;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::analytics::TrackingSink;
use crate::config::MediatorConfig;
use crate::decision::{DecisionService, EdgeHooks, MediatorHooks, RemoteDecisionService};
use crate::http::diagnostics::{diagnostics_page, worker_script};
use crate::http::origin::{HttpOrigin, Origin, OriginError};
use crate::http::preflight::{Preflight, PreflightLayer};
use crate::mediator::{MediatorSettings, RequestMediator};
use crate::security::headers::InvalidPolicy;
use crate::security::HeaderPolicy;

/// Errors while assembling the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Policy(#[from] InvalidPolicy),

    #[error("failed to build origin client: {0}")]
    Origin(#[from] OriginError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid decision API host: {0}")]
    DecisionHost(#[from] url::ParseError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub mediator: Arc<RequestMediator>,
    pub worker_scope: Arc<str>,
}

/// HTTP server for the edge mediator.
pub struct HttpServer {
    app: Preflight<Router>,
    config: MediatorConfig,
}

impl HttpServer {
    /// Create a server talking to the configured remote decision service.
    pub fn new(config: MediatorConfig) -> Result<Self, ServerError> {
        let origin: Arc<dyn Origin> = Arc::new(HttpOrigin::new(&config.origin)?);
        let hooks = Self::hooks(&config)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.decision.timeout_ms))
            .build()?;
        let decision = Arc::new(RemoteDecisionService::new(
            &config.decision,
            client,
            origin.clone(),
            hooks.clone(),
        )?);

        Self::assemble(config, decision, origin, hooks)
    }

    /// Create a server around a caller-supplied decision service.
    pub fn with_decision_service(
        config: MediatorConfig,
        decision: Arc<dyn DecisionService>,
    ) -> Result<Self, ServerError> {
        let origin: Arc<dyn Origin> = Arc::new(HttpOrigin::new(&config.origin)?);
        let hooks = Self::hooks(&config)?;
        Self::assemble(config, decision, origin, hooks)
    }

    fn hooks(config: &MediatorConfig) -> Result<Arc<dyn EdgeHooks>, ServerError> {
        let sink = if config.analytics.enabled {
            Some(TrackingSink::new(config.analytics.clone())?)
        } else {
            tracing::info!("Analytics disabled");
            None
        };
        Ok(Arc::new(MediatorHooks::new(sink)))
    }

    fn assemble(
        config: MediatorConfig,
        decision: Arc<dyn DecisionService>,
        origin: Arc<dyn Origin>,
        hooks: Arc<dyn EdgeHooks>,
    ) -> Result<Self, ServerError> {
        let policy = HeaderPolicy::from_config(&config.policy)?;
        let mediator = RequestMediator::new(
            MediatorSettings::from_config(&config),
            policy.clone(),
            decision,
            origin,
            hooks,
        );

        let state = AppState {
            mediator: Arc::new(mediator),
            worker_scope: Arc::from(config.pipeline.worker_scope.as_str()),
        };

        let router = Self::build_router(&config, policy.clone(), state);
        let app = PreflightLayer::new(policy).layer(router);
        Ok(Self { app, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &MediatorConfig, policy: HeaderPolicy, state: AppState) -> Router {
        let mut router = Router::new();

        if config.diagnostics.enabled {
            let prefix = config.diagnostics.path_prefix.trim_end_matches('/');
            router = router
                .route(prefix, get(diagnostics_handler))
                .route(&format!("{}/{{*rest}}", prefix), get(diagnostics_handler));
        }
        if config.pipeline.inject_bootstrap {
            router = router.route(&config.pipeline.worker_script_path, get(worker_handler));
        }

        router
            .route("/{*path}", any(mediate_handler))
            .route("/", any(mediate_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(map_response_with_state(policy, apply_policy))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            decision_host = %self.config.decision.api_host,
            "HTTP server starting"
        );

        axum::serve(listener, ServiceExt::<Request<Body>>::into_make_service(self.app))
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered application, for driving without a socket.
    pub fn router(&self) -> Preflight<Router> {
        self.app.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }
}

async fn mediate_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    state.mediator.handle(request).await
}

async fn diagnostics_handler(request: Request<Body>) -> Response<Body> {
    diagnostics_page(&request, chrono::Utc::now())
}

async fn worker_handler(State(state): State<AppState>) -> Response<Body> {
    worker_script(&state.worker_scope)
}

/// Outermost policy merge: covers routes and middleware responses the
/// mediator never sees (diagnostics, worker script, timeouts).
async fn apply_policy(State(policy): State<HeaderPolicy>, response: Response<Body>) -> Response<Body> {
    policy.finalize(response)
}
