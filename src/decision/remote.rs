//! HTTP adapter for a remote decision service.
//!
//! Request: `POST {api_host}/api/edge/decide` with the client key, page URL,
//! method, identity, derived attributes and evaluation options.
//! Response: an optional redirect, the experiments the visitor was
//! evaluated into, and computed feature values.
//!
//! Only the decide call is bounded by `decision.timeout_ms`. The origin fetch
//! that follows a content decision runs under the origin's own timeout, so an
//! in-flight origin request is never abandoned and replayed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::{DecisionConfig, DecisionOptions};
use crate::context::ContextAttributes;
use crate::decision::{
    Decision, DecisionError, DecisionService, EdgeHooks, ExperimentResult, RedirectInstruction,
};
use crate::http::origin::Origin;
use crate::http::request::ForwardedRequest;
use crate::resilience::timeouts::with_deadline;

const DECIDE_PATH: &str = "api/edge/decide";

#[derive(Debug, Serialize)]
struct DecideRequest<'a> {
    client_key: &'a str,
    url: &'a str,
    method: &'a str,
    user_id: Option<&'a str>,
    attributes: &'a ContextAttributes,
    options: &'a DecisionOptions,
}

#[derive(Debug, Deserialize)]
struct RedirectBody {
    url: String,
    status: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct DecideResponse {
    redirect: Option<RedirectBody>,
    #[serde(default)]
    experiments: Vec<ExperimentResult>,
    #[serde(default)]
    features: BTreeMap<String, serde_json::Value>,
}

/// Decision service reached over HTTP. Non-redirect outcomes are served by
/// fetching the origin with the loop-marked request.
pub struct RemoteDecisionService {
    client: reqwest::Client,
    endpoint: Url,
    client_key: String,
    options: DecisionOptions,
    default_status: u16,
    deadline: Duration,
    origin: Arc<dyn Origin>,
    hooks: Arc<dyn EdgeHooks>,
}

impl RemoteDecisionService {
    pub fn new(
        config: &DecisionConfig,
        client: reqwest::Client,
        origin: Arc<dyn Origin>,
        hooks: Arc<dyn EdgeHooks>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            endpoint: decide_endpoint(&config.api_host)?,
            client_key: config.client_key.clone(),
            options: config.options.clone(),
            default_status: config.redirect_status,
            deadline: Duration::from_millis(config.timeout_ms),
            origin,
            hooks,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn decide(
        &self,
        request: &ForwardedRequest,
        context: &ContextAttributes,
    ) -> Result<DecideResponse, DecisionError> {
        let user_id = self.hooks.user_id(request);
        let body = DecideRequest {
            client_key: &self.client_key,
            url: &context.url,
            method: request.method.as_str(),
            user_id: user_id.as_deref(),
            attributes: context,
            options: &self.options,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DecisionError::Status(status));
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| DecisionError::Malformed(e.to_string()))
    }

    /// Feature usage and exposures, once the visitor is actually served.
    fn report(&self, decided: &DecideResponse, context: &ContextAttributes) {
        for (key, value) in &decided.features {
            self.hooks.feature_usage(key, value);
        }
        for experiment in decided.experiments.iter().filter(|e| e.in_experiment) {
            self.hooks.track(context, experiment);
        }
    }
}

/// `{api_host}/api/edge/decide`, keeping any path prefix on the host.
fn decide_endpoint(api_host: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(api_host)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(DECIDE_PATH)
}

#[async_trait]
impl DecisionService for RemoteDecisionService {
    async fn evaluate(
        &self,
        request: ForwardedRequest,
        context: &ContextAttributes,
    ) -> Result<Decision, DecisionError> {
        let decided = with_deadline(self.deadline, self.decide(&request, context)).await?;

        if let Some(redirect) = &decided.redirect {
            if self.options.url_redirects {
                let instruction = RedirectInstruction::new(
                    redirect.url.as_str(),
                    redirect.status.unwrap_or(self.default_status),
                )
                .resolve(&request.target.public_url)?;
                let response = self.hooks.redirect(&instruction);
                self.report(&decided, context);
                return Ok(Decision::Redirect {
                    instruction,
                    response,
                });
            }
            tracing::debug!(location = %redirect.url, "URL redirects disabled, ignoring redirect");
        }

        let response = self.origin.send(request).await?;
        self.report(&decided, context);
        Ok(Decision::Content(response))
    }
}
