//! Request context derivation.
//!
//! # Data Flow
//! ```text
//! ForwardedRequest (headers + ProxyTarget)
//!     → cookies (growthbook, gbuuid, mp_distinct_id)
//!     → query string (utm_source, utm_medium, utm_campaign)
//!     → user agent (device class)
//!     → ContextAttributes (request-scoped, serialized for the decision service)
//! ```
//!
//! # Design Decisions
//! - Pure: reads the request, never mutates it
//! - Malformed or missing input degrades to empty/None, never an error

mod cookies;

pub use cookies::RequestCookies;

use axum::http::{header, HeaderMap};
use serde::Serialize;

use crate::http::request::{ForwardedRequest, ProxyTarget};

/// Cookie holding the stable visitor identifier.
pub const IDENTITY_COOKIE: &str = "gbuuid";
/// Cookie holding the opaque flag blob.
pub const FLAG_COOKIE: &str = "growthbook";
/// Cookie holding a pre-existing analytics identity.
pub const ANALYTICS_ID_COOKIE: &str = "mp_distinct_id";

/// Coarse device class from the user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    Desktop,
}

impl DeviceClass {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ["mobile", "android", "iphone"].iter().any(|m| ua.contains(m)) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }
}

/// Attributes handed to the decision service for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextAttributes {
    /// Stable identifier from the identity cookie, empty when absent.
    pub id: String,
    pub path: String,
    /// Constant `true`; targeting rules may key on it.
    pub logged_in: bool,
    pub hostname: String,
    pub subdomain: String,
    pub url: String,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    #[serde(rename = "deviceType")]
    pub device_type: DeviceClass,
    #[serde(rename = "userAgent")]
    pub user_agent: String,
    /// Opaque flag blob, empty when absent.
    #[serde(rename = "gbCookie")]
    pub flag_blob: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixpanel_distinct_id: Option<String>,
}

impl ContextAttributes {
    /// Identity used for exposure events: analytics id first, then the
    /// stable identifier.
    pub fn distinct_id(&self) -> Option<&str> {
        self.mixpanel_distinct_id
            .as_deref()
            .or_else(|| Some(self.id.as_str()).filter(|id| !id.is_empty()))
    }
}

/// Derives `ContextAttributes` from a request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Derive attributes for a request about to be evaluated.
    pub fn build(&self, request: &ForwardedRequest) -> ContextAttributes {
        self.derive(&request.headers, &request.target)
    }

    /// Derive attributes from headers and the request's proxy target.
    pub fn derive(&self, headers: &HeaderMap, target: &ProxyTarget) -> ContextAttributes {
        let cookies = RequestCookies::from_headers(headers);
        let url = &target.public_url;
        let hostname = target.hostname().to_string();
        let subdomain = hostname.split('.').next().unwrap_or_default().to_string();

        let query = |name: &str| {
            url.query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
        };

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let attributes = ContextAttributes {
            id: cookies.identity.clone().unwrap_or_default(),
            path: url.path().to_string(),
            logged_in: true,
            hostname,
            subdomain,
            url: url.to_string(),
            utm_source: query("utm_source"),
            utm_medium: query("utm_medium"),
            utm_campaign: query("utm_campaign"),
            device_type: DeviceClass::from_user_agent(&user_agent),
            user_agent,
            flag_blob: cookies.flag_blob.clone().unwrap_or_default(),
            mixpanel_distinct_id: cookies.analytics_id.clone().filter(|v| !v.is_empty()),
        };

        tracing::debug!(
            path = %attributes.path,
            hostname = %attributes.hostname,
            device = ?attributes.device_type,
            has_identity = !attributes.id.is_empty(),
            has_analytics_id = attributes.mixpanel_distinct_id.is_some(),
            "Derived request context"
        );
        attributes
    }

    /// Identity for the decision service, from the identity cookie only.
    pub fn user_id(&self, headers: &HeaderMap) -> Option<String> {
        RequestCookies::from_headers(headers)
            .identity
            .filter(|id| !id.is_empty())
    }
}
