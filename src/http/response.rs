//! Response handling and transformation.
//!
//! # Responsibilities
//! - Transform upstream responses for the client
//! - Strip hop-by-hop headers and the loop marker
//! - Stream bodies instead of buffering them
//!
//! # Design Decisions
//! - Only HTML that is rewritten gets buffered (see `mediator::html`)
//! - Upstream errors map to 502 Bad Gateway at the mediator

use axum::{
    body::Body,
    http::{HeaderMap, Response},
};

use crate::http::request::strip_hop_by_hop;
use crate::security::LoopGuard;

/// Convert a `reqwest` response into a streaming axum response.
pub fn from_upstream(upstream: reqwest::Response) -> Response<Body> {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    sanitize(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Remove everything that must never reach the client verbatim.
pub fn sanitize(headers: &mut HeaderMap) {
    strip_hop_by_hop(headers);
    LoopGuard::strip(headers);
}
