//! Navigation interceptor.
//!
//! The client-resident half of the mediator: a worker registered by the
//! injected bootstrap that takes over top-level navigations. A redirected
//! navigation is not followed by the default redirect path; the interceptor
//! re-issues a request to the `Location` target itself with credentials
//! forced on and automatic redirects off, so first-party cookies reach it.
//!
//! # Data Flow
//! ```text
//! install → InstalledInactive ──(skip waiting)──▶ Active (claims open clients)
//!
//! handle_fetch(request)
//!     → inactive or not a navigation      → PassThrough
//!     → fetch (manual redirects)
//!         → 3xx + Location                → fetch Location (Include, Manual) → Respond
//!         → anything else                 → Respond(unchanged)
//! ```
//!
//! `bootstrap.rs` holds the browser assets; `fetcher.rs` a `reqwest`
//! implementation of `Fetcher` with a cookie jar, used by `edge-cli` and tests.

pub mod bootstrap;
pub mod fetcher;

pub use fetcher::ReqwestFetcher;

use async_trait::async_trait;
use axum::http::{header, HeaderMap, Method, StatusCode};
use bytes::Bytes;
use url::Url;

/// Errors from the interceptor's network leg.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Lifecycle of an installed interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    InstalledInactive,
    Active,
}

/// Request mode as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level navigation.
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
}

/// Whether cookies accompany a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credentials {
    Omit,
    SameOrigin,
    Include,
}

/// Redirect handling for a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    Follow,
    Manual,
}

/// An intercepted client request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub mode: RequestMode,
    pub credentials: Credentials,
    pub redirect: RedirectMode,
    /// Page that issued the request, if any.
    pub initiator: Option<Url>,
}

impl FetchRequest {
    /// A top-level GET navigation with browser defaults.
    pub fn navigate(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: RequestMode::Navigate,
            credentials: Credentials::SameOrigin,
            redirect: RedirectMode::Follow,
            initiator: None,
        }
    }

    /// A sub-resource GET issued by `page`.
    pub fn subresource(url: Url, page: Url) -> Self {
        Self {
            mode: RequestMode::NoCors,
            initiator: Some(page),
            ..Self::navigate(url)
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// A response handed back to the client.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after any followed redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    /// `Location` resolved against the response URL, for 3xx responses.
    pub fn redirect_target(&self) -> Option<Url> {
        if !self.status.is_redirection() {
            return None;
        }
        let location = self.headers.get(header::LOCATION)?.to_str().ok()?;
        match self.url.join(location) {
            Ok(target) => Some(target),
            Err(e) => {
                tracing::warn!(location = %location, error = %e, "Unusable redirect location");
                None
            }
        }
    }
}

/// Network access available to the interceptor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// What the interceptor did with a request.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not intercepted; the client handles it normally.
    PassThrough,
    /// Intercepted and answered.
    Respond(FetchResponse),
}

/// Interceptor for redirected navigations.
pub struct NavigationInterceptor<F> {
    fetcher: F,
    state: WorkerState,
    claimed_clients: usize,
}

impl<F: Fetcher> NavigationInterceptor<F> {
    /// Install without activating.
    pub fn install(fetcher: F) -> Self {
        Self {
            fetcher,
            state: WorkerState::InstalledInactive,
            claimed_clients: 0,
        }
    }

    /// Install and activate immediately, claiming `open_clients`.
    pub fn register(fetcher: F, open_clients: usize) -> Self {
        let mut interceptor = Self::install(fetcher);
        interceptor.activate(open_clients);
        interceptor
    }

    /// Activate without waiting for a previous instance and take control
    /// of every open client.
    pub fn activate(&mut self, open_clients: usize) {
        self.state = WorkerState::Active;
        self.claimed_clients = open_clients;
        tracing::debug!(clients = open_clients, "Navigation interceptor active");
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn claimed_clients(&self) -> usize {
        self.claimed_clients
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Handle one intercepted request.
    pub async fn handle_fetch(&self, request: FetchRequest) -> Result<FetchOutcome, FetchError> {
        if self.state != WorkerState::Active || !request.is_navigation() {
            return Ok(FetchOutcome::PassThrough);
        }

        // Navigation requests carry the manual redirect mode themselves.
        let first = FetchRequest {
            redirect: RedirectMode::Manual,
            ..request
        };
        let response = self.fetcher.fetch(first).await?;

        let Some(target) = response.redirect_target() else {
            return Ok(FetchOutcome::Respond(response));
        };

        tracing::debug!(
            from = %response.url,
            to = %target,
            status = response.status.as_u16(),
            "Re-issuing redirected navigation with credentials"
        );
        let follow_up = FetchRequest {
            url: target,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: RequestMode::Navigate,
            credentials: Credentials::Include,
            redirect: RedirectMode::Manual,
            initiator: None,
        };
        let response = self.fetcher.fetch(follow_up).await?;
        Ok(FetchOutcome::Respond(response))
    }
}
