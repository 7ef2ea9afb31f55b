//! Request handling and transformation.
//!
//! # Responsibilities
//! - Buffer the inbound body exactly once
//! - Derive the per-request proxy target from the inbound hostname
//! - Prepare augmented (loop-marked) and unaugmented copies for forwarding
//!
//! # Design Decisions
//! - The inbound request is immutable once received; forwarded copies are new values
//! - `Bytes` backs every copy, so cloning never re-reads or duplicates the body
//! - The proxy target is a value carried by the request, never shared state

use axum::{
    body::{self, Body},
    http::{
        header::{self, HeaderName},
        request::Parts,
        HeaderMap, HeaderValue, Method, Request,
    },
};
use bytes::Bytes;
use url::Url;

use crate::config::OriginConfig;
use crate::security::LoopGuard;

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Headers that only describe a single connection and are never forwarded.
pub const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}

/// Errors while turning an inbound request into forwardable form.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("failed to buffer request body: {0}")]
    Body(#[from] axum::Error),

    #[error("request has no usable host")]
    MissingHost,

    #[error("invalid target URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid host header value")]
    InvalidHost,
}

/// Where a single request is proxied to.
///
/// Computed from the inbound hostname for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    /// URL as the client addressed it.
    pub public_url: Url,
    /// URL the mediator dials.
    pub upstream_url: Url,
    /// `Host` header sent upstream (inbound authority).
    pub host: HeaderValue,
}

impl ProxyTarget {
    /// Derive the target from request metadata.
    pub fn from_parts(parts: &Parts, config: &OriginConfig) -> Result<Self, RequestError> {
        let authority = parts
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string)
            })
            .filter(|a| !a.is_empty())
            .ok_or(RequestError::MissingHost)?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let public_scheme = parts
            .headers
            .get(&X_FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .filter(|v| matches!(*v, "http" | "https"))
            .or_else(|| parts.uri.scheme_str())
            .unwrap_or(config.scheme.as_str());

        let public_url = Url::parse(&format!("{}://{}{}", public_scheme, authority, path_and_query))?;
        if public_url.host_str().is_none() {
            return Err(RequestError::MissingHost);
        }

        let upstream_authority = config.address.as_deref().unwrap_or(authority.as_str());
        let upstream_url = Url::parse(&format!(
            "{}://{}{}",
            config.scheme, upstream_authority, path_and_query
        ))?;

        let host = HeaderValue::from_str(&authority).map_err(|_| RequestError::InvalidHost)?;

        Ok(Self {
            public_url,
            upstream_url,
            host,
        })
    }

    /// Hostname without port.
    pub fn hostname(&self) -> &str {
        self.public_url.host_str().unwrap_or_default()
    }
}

/// A fully received client request.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub target: ProxyTarget,
}

impl IncomingRequest {
    /// Drain the body (bounded by `limit`) and derive the proxy target.
    pub async fn from_request(
        request: Request<Body>,
        config: &OriginConfig,
        limit: usize,
    ) -> Result<Self, RequestError> {
        let (parts, body) = request.into_parts();
        let body = body::to_bytes(body, limit).await?;
        Self::from_parts(parts, body, config)
    }

    /// Assemble from already-split parts and a buffered body.
    pub fn from_parts(parts: Parts, body: Bytes, config: &OriginConfig) -> Result<Self, RequestError> {
        let target = ProxyTarget::from_parts(&parts, config)?;
        Ok(Self {
            method: parts.method,
            headers: parts.headers,
            body,
            target,
        })
    }

    /// Copy carrying the loop marker, for the decision leg.
    pub fn augmented(&self) -> ForwardedRequest {
        let mut forwarded = self.unaugmented();
        LoopGuard::mark(&mut forwarded.headers);
        forwarded
    }

    /// Copy without the marker, for fail-open pass-through.
    pub fn unaugmented(&self) -> ForwardedRequest {
        ForwardedRequest {
            method: self.method.clone(),
            target: self.target.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// A request on its way to the origin.
#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub method: Method,
    pub target: ProxyTarget,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardedRequest {
    /// Buffer an already-mediated request for the bypass leg, headers
    /// (marker included) left exactly as received.
    pub async fn passthrough(
        request: Request<Body>,
        config: &OriginConfig,
        limit: usize,
    ) -> Result<Self, RequestError> {
        IncomingRequest::from_request(request, config, limit)
            .await
            .map(|incoming| incoming.unaugmented())
    }

    /// Headers as they go on the wire: hop-by-hop and length removed,
    /// `Host` set to the inbound authority.
    ///
    /// The client's `Accept-Encoding` is dropped so the origin client
    /// negotiates compression itself and hands back decoded bodies that the
    /// HTML stage can rewrite.
    pub fn wire_headers(&self) -> HeaderMap {
        let mut headers = self.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::ACCEPT_ENCODING);
        headers.insert(header::HOST, self.target.host.clone());
        headers
    }

    pub fn is_marked(&self) -> bool {
        LoopGuard::is_marked(&self.headers)
    }
}
