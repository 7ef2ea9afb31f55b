//! Decision service boundary.
//!
//! # Data Flow
//! ```text
//! RequestMediator
//!     → DecisionService::evaluate(augmented request, context)
//!         → hooks.user_id / hooks.track / hooks.feature_usage
//!         → Decision::Redirect (hooks.redirect builds the response, origin untouched)
//!         → Decision::Content  (origin-backed response)
//!     → Err(DecisionError::Origin) → mediator answers 502
//!     → Err(DecisionError)         → mediator fails open
//! ```
//!
//! # Design Decisions
//! - Evaluation is opaque; the mediator only plumbs context in and responses out
//! - Callback capabilities live on one trait (`EdgeHooks`) injected at construction
//! - `DecisionService` is a trait so tests substitute a double

pub mod hooks;
pub mod remote;

pub use hooks::{default_redirect, EdgeHooks, MediatorHooks, REDIRECT_MARKER};
pub use remote::RemoteDecisionService;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Response, StatusCode},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::context::ContextAttributes;
use crate::http::origin::OriginError;
use crate::http::request::ForwardedRequest;

/// Errors from a decision attempt. Every variant except `Origin` triggers
/// fail-open; an origin failure means the request was already sent.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("decision service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decision service returned {0}")]
    Status(StatusCode),

    #[error("malformed decision response: {0}")]
    Malformed(String),

    #[error("decision deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("origin fetch during evaluation failed: {0}")]
    Origin(#[from] OriginError),
}

impl DecisionError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DecisionError::Transport(_) => "transport",
            DecisionError::Status(_) => "status",
            DecisionError::Malformed(_) => "malformed",
            DecisionError::Timeout(_) => "timeout",
            DecisionError::Origin(_) => "origin",
        }
    }
}

/// Target URL and status for a redirect chosen by the decision service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectInstruction {
    pub url: String,
    pub status: u16,
}

impl RedirectInstruction {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
        }
    }

    /// Resolve a possibly relative target against the page URL.
    pub fn resolve(&self, base: &Url) -> Result<Self, DecisionError> {
        let url = base
            .join(&self.url)
            .map_err(|e| DecisionError::Malformed(format!("redirect url '{}': {}", self.url, e)))?;
        if !(300..400).contains(&self.status) {
            return Err(DecisionError::Malformed(format!(
                "redirect status {} out of range",
                self.status
            )));
        }
        Ok(Self {
            url: url.to_string(),
            status: self.status,
        })
    }
}

/// Variation identifier; services send either an index or a key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VariationId {
    Index(u64),
    Key(String),
}

impl fmt::Display for VariationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariationId::Index(i) => write!(f, "{}", i),
            VariationId::Key(k) => f.write_str(k),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One experiment evaluation reported by the decision service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExperimentResult {
    pub key: String,
    pub variation_id: VariationId,
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default = "default_true")]
    pub in_experiment: bool,
}

/// Outcome of a successful evaluation.
#[derive(Debug)]
pub enum Decision {
    /// Redirect chosen; the origin was not contacted.
    Redirect {
        instruction: RedirectInstruction,
        response: Response<Body>,
    },
    /// Origin-backed content.
    Content(Response<Body>),
}

/// Opaque flag/experiment evaluator.
#[async_trait]
pub trait DecisionService: Send + Sync {
    async fn evaluate(
        &self,
        request: ForwardedRequest,
        context: &ContextAttributes,
    ) -> Result<Decision, DecisionError>;
}
