//! Response header policy.
//!
//! # Responsibilities
//! - Hold the fixed CORS + frame-embedding header set
//! - Merge it onto every mediator response, replacing upstream values
//! - Build preflight responses
//!
//! # Design Decisions
//! - Built once from config; invalid values fail at startup, never per request
//! - `insert` semantics: every upstream value for a policy header is dropped

use axum::{
    body::Body,
    http::{
        header::{self, HeaderName},
        HeaderMap, HeaderValue, Response, StatusCode,
    },
};

use crate::config::PolicyConfig;

static ALLOW_ORIGIN: HeaderValue = HeaderValue::from_static("*");
static ALLOW_METHODS: HeaderValue = HeaderValue::from_static("GET, HEAD, POST, OPTIONS");
static ALLOW_HEADERS: HeaderValue = HeaderValue::from_static("*");
static TRUE: HeaderValue = HeaderValue::from_static("true");

/// `Access-Control-Allow-Private-Network` is not in the `http` constants.
pub const ACCESS_CONTROL_ALLOW_PRIVATE_NETWORK: HeaderName =
    HeaderName::from_static("access-control-allow-private-network");

/// Response extension marking a response whose headers are left as the
/// origin sent them (loop-guard bypass with the policy disabled).
#[derive(Debug, Clone, Copy)]
pub struct PolicyExempt;

/// Error raised when the configured frame origin cannot be a header value.
#[derive(Debug, thiserror::Error)]
#[error("invalid trusted frame origin '{0}'")]
pub struct InvalidPolicy(pub String);

/// The fixed response header set.
#[derive(Debug, Clone)]
pub struct HeaderPolicy {
    headers: HeaderMap,
}

impl HeaderPolicy {
    /// Build the policy from configuration.
    pub fn from_config(config: &PolicyConfig) -> Result<Self, InvalidPolicy> {
        let mut headers = HeaderMap::new();

        if config.cors {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN.clone());
            headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS.clone());
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS.clone());
            headers.insert(ACCESS_CONTROL_ALLOW_PRIVATE_NETWORK, TRUE.clone());
            headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, TRUE.clone());
        }

        if config.frame {
            let origin = &config.trusted_frame_origin;
            let csp = HeaderValue::from_str(&format!("frame-ancestors {}", origin))
                .map_err(|_| InvalidPolicy(origin.clone()))?;
            let xfo = HeaderValue::from_str(&format!("ALLOW-FROM {}", origin))
                .map_err(|_| InvalidPolicy(origin.clone()))?;
            headers.insert(header::CONTENT_SECURITY_POLICY, csp);
            headers.insert(header::X_FRAME_OPTIONS, xfo);
        }

        Ok(Self { headers })
    }

    /// The header set itself.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Merge the policy onto `target`, overriding same-named headers.
    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in self.headers.iter() {
            target.insert(name.clone(), value.clone());
        }
    }

    /// Merge the policy onto a response and return it.
    pub fn apply_to<B>(&self, mut response: Response<B>) -> Response<B> {
        self.apply(response.headers_mut());
        response
    }

    /// Apply the policy unless the response is marked `PolicyExempt`.
    pub fn finalize<B>(&self, response: Response<B>) -> Response<B> {
        if response.extensions().get::<PolicyExempt>().is_some() {
            return response;
        }
        self.apply_to(response)
    }

    /// Empty-bodied response carrying only the policy headers.
    pub fn preflight(&self) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::OK;
        *response.headers_mut() = self.headers.clone();
        response
    }

    /// A plain-text response with the policy applied.
    pub fn text(&self, status: StatusCode, body: &'static str) -> Response<Body> {
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.apply_to(response)
    }
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        // The default frame origin is a known-good literal.
        Self::from_config(&PolicyConfig::default()).unwrap_or(Self {
            headers: HeaderMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_has_full_set() {
        let policy = HeaderPolicy::default();
        let h = policy.headers();
        assert_eq!(h.len(), 7);
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, HEAD, POST, OPTIONS");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_PRIVATE_NETWORK], "true");
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(
            h[header::CONTENT_SECURITY_POLICY],
            "frame-ancestors https://app.growthbook.io"
        );
        assert_eq!(h[header::X_FRAME_OPTIONS], "ALLOW-FROM https://app.growthbook.io");
    }

    #[test]
    fn apply_overrides_upstream_values() {
        let policy = HeaderPolicy::default();
        let mut upstream = HeaderMap::new();
        upstream.append(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        upstream.append(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        upstream.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("frame-ancestors 'none'"),
        );
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));

        policy.apply(&mut upstream);

        let xfo: Vec<_> = upstream.get_all(header::X_FRAME_OPTIONS).iter().collect();
        assert_eq!(xfo, vec!["ALLOW-FROM https://app.growthbook.io"]);
        assert_eq!(
            upstream[header::CONTENT_SECURITY_POLICY],
            "frame-ancestors https://app.growthbook.io"
        );
        assert_eq!(upstream[header::CONTENT_TYPE], "text/css");
    }

    #[test]
    fn preflight_is_exactly_the_policy() {
        let policy = HeaderPolicy::default();
        let response = policy.preflight();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers(), policy.headers());
    }

    #[test]
    fn finalize_skips_exempt_responses() {
        let policy = HeaderPolicy::default();

        let mut exempt = Response::new(());
        exempt.extensions_mut().insert(PolicyExempt);
        assert!(policy.finalize(exempt).headers().is_empty());

        let normal = policy.finalize(Response::new(()));
        assert_eq!(normal.headers(), policy.headers());
    }

    #[test]
    fn stages_are_selectable() {
        let config = PolicyConfig {
            frame: false,
            ..PolicyConfig::default()
        };
        let policy = HeaderPolicy::from_config(&config).unwrap();
        assert!(policy.headers().get(header::X_FRAME_OPTIONS).is_none());
        assert_eq!(policy.headers().len(), 5);
    }

    #[test]
    fn rejects_unencodable_origin() {
        let config = PolicyConfig {
            trusted_frame_origin: "https://bad\norigin".into(),
            ..PolicyConfig::default()
        };
        assert!(HeaderPolicy::from_config(&config).is_err());
    }
}
