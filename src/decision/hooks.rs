//! Capabilities the mediator injects into the decision service.

use axum::{
    body::Body,
    http::{header, header::HeaderName, HeaderValue, Response, StatusCode},
};

use crate::analytics::{ExposureEvent, TrackingSink};
use crate::context::{ContextAttributes, ContextBuilder};
use crate::decision::{ExperimentResult, RedirectInstruction};
use crate::http::request::ForwardedRequest;

/// Header marking redirects produced by the decision service.
pub const REDIRECT_MARKER: HeaderName = HeaderName::from_static("x-growthbook-redirect");

/// One method per capability the decision service may call back into.
pub trait EdgeHooks: Send + Sync {
    /// Derive attributes for a request. Must not have side effects
    /// beyond logging.
    fn attributes(&self, request: &ForwardedRequest) -> ContextAttributes;

    /// Stable identity, from the identity cookie only.
    fn user_id(&self, request: &ForwardedRequest) -> Option<String>;

    /// Report an exposure. Must return without waiting on delivery.
    fn track(&self, context: &ContextAttributes, experiment: &ExperimentResult);

    /// Build the client-facing redirect response.
    fn redirect(&self, instruction: &RedirectInstruction) -> Response<Body> {
        default_redirect(instruction)
    }

    /// Observe a feature value computed during evaluation.
    fn feature_usage(&self, key: &str, value: &serde_json::Value) {
        tracing::debug!(feature = %key, value = %value, "Feature evaluated");
    }
}

/// Status + `Location` + redirect marker. Falls back to 302 for statuses
/// outside the redirect range.
pub fn default_redirect(instruction: &RedirectInstruction) -> Response<Body> {
    let status = StatusCode::from_u16(instruction.status)
        .ok()
        .filter(StatusCode::is_redirection)
        .unwrap_or(StatusCode::FOUND);

    let location = match HeaderValue::from_str(&instruction.url) {
        Ok(location) => location,
        Err(_) => {
            tracing::warn!(url = %instruction.url, "Redirect target is not a valid header value");
            let mut response = Response::new(Body::from("Invalid redirect target"));
            *response.status_mut() = StatusCode::BAD_GATEWAY;
            return response;
        }
    };

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response.headers_mut().insert(header::LOCATION, location);
    response
        .headers_mut()
        .insert(REDIRECT_MARKER, HeaderValue::from_static("true"));
    response
}

/// The mediator's hook implementation.
#[derive(Clone)]
pub struct MediatorHooks {
    builder: ContextBuilder,
    sink: Option<TrackingSink>,
}

impl MediatorHooks {
    pub fn new(sink: Option<TrackingSink>) -> Self {
        Self {
            builder: ContextBuilder::new(),
            sink,
        }
    }
}

impl EdgeHooks for MediatorHooks {
    fn attributes(&self, request: &ForwardedRequest) -> ContextAttributes {
        self.builder.build(request)
    }

    fn user_id(&self, request: &ForwardedRequest) -> Option<String> {
        self.builder.user_id(&request.headers)
    }

    fn track(&self, context: &ContextAttributes, experiment: &ExperimentResult) {
        tracing::info!(
            experiment = %experiment.key,
            variation = %experiment.variation_id,
            "Experiment exposure"
        );
        match &self.sink {
            Some(sink) => sink.dispatch(ExposureEvent::new(context, experiment)),
            None => tracing::debug!(experiment = %experiment.key, "Analytics disabled, exposure not sent"),
        }
    }

    fn redirect(&self, instruction: &RedirectInstruction) -> Response<Body> {
        tracing::info!(location = %instruction.url, status = instruction.status, "Redirect requested");
        default_redirect(instruction)
    }
}
