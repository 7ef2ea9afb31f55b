//! Preflight short-circuit wrapped around the whole router.
//!
//! Routing never sees an `OPTIONS` request, so fixed `get` routes cannot
//! answer 405 and no route-level middleware adds headers of its own.

use axum::extract::Request;
use axum::http::Method;
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

use crate::mediator::Outcome;
use crate::observability::metrics;
use crate::security::HeaderPolicy;

#[derive(Clone)]
pub struct PreflightLayer {
    policy: HeaderPolicy,
}

impl PreflightLayer {
    pub fn new(policy: HeaderPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for PreflightLayer {
    type Service = Preflight<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Preflight {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Answers `OPTIONS` with exactly the policy set; everything else goes to `inner`.
#[derive(Clone)]
pub struct Preflight<S> {
    inner: S,
    policy: HeaderPolicy,
}

impl<S> Service<Request> for Preflight<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        if request.method() != Method::OPTIONS {
            return Box::pin(self.inner.call(request));
        }

        let start = Instant::now();
        let response = self.policy.preflight();
        tracing::debug!(path = %request.uri().path(), "Answered preflight");
        metrics::record_request(
            Method::OPTIONS.as_str(),
            response.status().as_u16(),
            Outcome::Preflight.as_str(),
            start,
        );
        Box::pin(async move { Ok(response) })
    }
}
