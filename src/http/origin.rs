//! Origin forwarding.
//!
//! # Responsibilities
//! - Send a `ForwardedRequest` to its per-request proxy target
//! - Never follow upstream redirects (the client must see them)
//!
//! # Design Decisions
//! - `Origin` is a trait so the mediator can be exercised without sockets
//! - One pooled client per process; the target lives on each request

use async_trait::async_trait;
use axum::{body::Body, http::Response};
use std::time::Duration;

use crate::config::OriginConfig;
use crate::http::request::ForwardedRequest;
use crate::http::response::from_upstream;

/// Errors from the origin leg.
#[derive(Debug, thiserror::Error)]
pub enum OriginError {
    #[error("origin request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Something that can serve a forwarded request.
#[async_trait]
pub trait Origin: Send + Sync {
    async fn send(&self, request: ForwardedRequest) -> Result<Response<Body>, OriginError>;
}

/// HTTP origin backed by a pooled `reqwest` client.
#[derive(Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
}

impl HttpOrigin {
    pub fn new(config: &OriginConfig) -> Result<Self, OriginError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client (tests, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    async fn send(&self, request: ForwardedRequest) -> Result<Response<Body>, OriginError> {
        let headers = request.wire_headers();
        tracing::debug!(
            method = %request.method,
            upstream = %request.target.upstream_url,
            marked = request.is_marked(),
            "Forwarding to origin"
        );

        let upstream = self
            .client
            .request(request.method, request.target.upstream_url)
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        Ok(from_upstream(upstream))
    }
}
