//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs, value ranges and header-safe strings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MediatorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderValue;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::MediatorConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("origin.scheme must be http or https, got '{0}'")]
    UnsupportedScheme(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("decision.redirect_status {0} is not a redirect status")]
    RedirectStatus(u16),

    #[error("{field} must start with '/', got '{value}'")]
    PathPrefix { field: &'static str, value: String },

    #[error("{0} cannot be the site root")]
    RootPrefix(&'static str),

    #[error("policy.trusted_frame_origin '{0}' is not a valid header value")]
    FrameOrigin(String),
}

/// Validate a loaded configuration.
pub fn validate_config(config: &MediatorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if !matches!(config.origin.scheme.as_str(), "http" | "https") {
        errors.push(ValidationError::UnsupportedScheme(config.origin.scheme.clone()));
    }
    if config.origin.timeout_secs == 0 {
        errors.push(ValidationError::Zero("origin.timeout_secs"));
    }

    if Url::parse(&config.decision.api_host).is_err() {
        errors.push(ValidationError::InvalidUrl {
            field: "decision.api_host",
            value: config.decision.api_host.clone(),
        });
    }
    if config.decision.timeout_ms == 0 {
        errors.push(ValidationError::Zero("decision.timeout_ms"));
    }
    if !(300..400).contains(&config.decision.redirect_status) {
        errors.push(ValidationError::RedirectStatus(config.decision.redirect_status));
    }

    let frame_origin = &config.policy.trusted_frame_origin;
    if HeaderValue::from_str(&format!("frame-ancestors {}", frame_origin)).is_err()
        || Url::parse(frame_origin).is_err()
    {
        errors.push(ValidationError::FrameOrigin(frame_origin.clone()));
    }

    for (field, value) in [
        ("pipeline.worker_script_path", &config.pipeline.worker_script_path),
        ("pipeline.worker_scope", &config.pipeline.worker_scope),
        ("diagnostics.path_prefix", &config.diagnostics.path_prefix),
    ] {
        if !value.starts_with('/') {
            errors.push(ValidationError::PathPrefix {
                field,
                value: value.clone(),
            });
        }
    }

    if config.diagnostics.enabled && config.diagnostics.path_prefix.trim_end_matches('/').is_empty() {
        errors.push(ValidationError::RootPrefix("diagnostics.path_prefix"));
    }

    if config.analytics.enabled {
        if Url::parse(&config.analytics.endpoint).is_err() {
            errors.push(ValidationError::InvalidUrl {
                field: "analytics.endpoint",
                value: config.analytics.endpoint.clone(),
            });
        }
        if config.analytics.max_attempts == 0 {
            errors.push(ValidationError::Zero("analytics.max_attempts"));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&MediatorConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = MediatorConfig::default();
        config.origin.scheme = "ftp".into();
        config.decision.timeout_ms = 0;
        config.decision.redirect_status = 200;
        config.diagnostics.path_prefix = "__edge".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::UnsupportedScheme("ftp".into())));
        assert!(errors.contains(&ValidationError::Zero("decision.timeout_ms")));
        assert!(errors.contains(&ValidationError::RedirectStatus(200)));
    }

    #[test]
    fn rejects_unusable_frame_origin() {
        let mut config = MediatorConfig::default();
        config.policy.trusted_frame_origin = "not a url\n".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::FrameOrigin(_)));
    }

    #[test]
    fn diagnostics_cannot_shadow_the_site() {
        let mut config = MediatorConfig::default();
        config.diagnostics.path_prefix = "/".into();
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::RootPrefix("diagnostics.path_prefix")])
        );

        config.diagnostics.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn analytics_endpoint_only_checked_when_enabled() {
        let mut config = MediatorConfig::default();
        config.analytics.endpoint = "nope".into();
        assert!(validate_config(&config).is_err());

        config.analytics.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
