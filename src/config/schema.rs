//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mediator.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge mediator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MediatorConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// How the per-request proxy target is reached.
    pub origin: OriginConfig,

    /// Decision service endpoint and evaluation options.
    pub decision: DecisionConfig,

    /// Response header policy.
    pub policy: PolicyConfig,

    /// Optional pipeline stages.
    pub pipeline: PipelineConfig,

    /// Exposure event delivery.
    pub analytics: AnalyticsConfig,

    /// Static diagnostics page.
    pub diagnostics: DiagnosticsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Origin configuration.
///
/// The target host is never fixed here: it is derived from each inbound
/// request's hostname. `address` only pins the socket the mediator dials,
/// the `Host` header still carries the inbound hostname.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Scheme used for origin requests ("http" or "https").
    pub scheme: String,

    /// Optional fixed connect address (e.g., "10.0.0.5:8080").
    pub address: Option<String>,

    /// Origin request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            address: None,
            timeout_secs: 30,
        }
    }
}

/// Decision service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// Base URL of the decision API (`GROWTHBOOK_API_HOST`).
    pub api_host: String,

    /// Client/library key (`GROWTHBOOK_CLIENT_KEY`).
    pub client_key: String,

    /// Deadline for a single evaluation, in milliseconds.
    pub timeout_ms: u64,

    /// Status used by the default redirect handler.
    pub redirect_status: u16,

    /// Evaluation toggles forwarded with every decision request.
    pub options: DecisionOptions,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            api_host: "https://cdn.growthbook.io".to_string(),
            client_key: String::new(),
            timeout_ms: 3000,
            redirect_status: 302,
            options: DecisionOptions::default(),
        }
    }
}

/// Evaluation toggles understood by the decision service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct DecisionOptions {
    pub visual_editor: bool,
    pub url_redirects: bool,
    pub sticky: bool,
    pub streaming: bool,
    pub dev_mode: bool,
}

impl Default for DecisionOptions {
    fn default() -> Self {
        Self {
            visual_editor: true,
            url_redirects: true,
            sticky: true,
            streaming: true,
            dev_mode: false,
        }
    }
}

/// Response header policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Emit the CORS header set.
    pub cors: bool,

    /// Emit the CSP frame-ancestors / X-Frame-Options pair.
    pub frame: bool,

    /// The single origin allowed to embed responses in a frame.
    pub trusted_frame_origin: String,

    /// Merge the policy onto loop-guard bypass responses too.
    pub apply_on_bypass: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            cors: true,
            frame: true,
            trusted_frame_origin: "https://app.growthbook.io".to_string(),
            apply_on_bypass: true,
        }
    }
}

/// Optional pipeline stages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Insert the navigation interceptor bootstrap into HTML responses.
    pub inject_bootstrap: bool,

    /// Path the worker script is served from.
    pub worker_script_path: String,

    /// Scope the worker is registered for.
    pub worker_scope: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inject_bootstrap: true,
            worker_script_path: "/edge-sw.js".to_string(),
            worker_scope: "/".to_string(),
        }
    }
}

/// Wire shape of the analytics POST body.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayloadShape {
    /// JSON array holding the single event (Mixpanel `/track` style).
    #[default]
    Batch,
    /// Bare JSON object.
    Object,
}

/// Analytics sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Enable exposure event delivery.
    pub enabled: bool,

    /// Endpoint receiving one POST per exposure.
    pub endpoint: String,

    /// Project token (`MIXPANEL_TOKEN`).
    pub token: Option<String>,

    /// Deployment environment label (`ENVIRONMENT`).
    pub environment: String,

    /// Body shape.
    pub payload: PayloadShape,

    /// Attempts per event, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://api.mixpanel.com/track".to_string(),
            token: None,
            environment: "production".to_string(),
            payload: PayloadShape::Batch,
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

/// Diagnostics page configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub path_prefix: String,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path_prefix: "/__edge".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum buffered body size in bytes (requests and rewritten HTML).
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}
