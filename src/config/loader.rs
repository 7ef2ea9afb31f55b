//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::MediatorConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable overriding `decision.api_host`.
pub const ENV_API_HOST: &str = "GROWTHBOOK_API_HOST";
/// Environment variable overriding `decision.client_key`.
pub const ENV_CLIENT_KEY: &str = "GROWTHBOOK_CLIENT_KEY";
/// Environment variable overriding `analytics.token`.
pub const ENV_ANALYTICS_TOKEN: &str = "MIXPANEL_TOKEN";
/// Environment variable overriding `analytics.environment`.
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply process
/// environment overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<MediatorConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path).map_err(ConfigError::Io)?)?,
        None => MediatorConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse TOML text into a configuration without validating it.
pub fn parse_config(content: &str) -> Result<MediatorConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}

/// Apply the recognized environment options on top of file values.
///
/// Empty values are ignored so an unset-but-exported variable does not
/// blank out a configured value.
pub fn apply_env_overrides<F>(config: &mut MediatorConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(api_host) = get(ENV_API_HOST) {
        config.decision.api_host = api_host;
    }
    if let Some(client_key) = get(ENV_CLIENT_KEY) {
        config.decision.client_key = client_key;
    }
    if let Some(token) = get(ENV_ANALYTICS_TOKEN) {
        config.analytics.token = Some(token);
    }
    if let Some(environment) = get(ENV_ENVIRONMENT) {
        config.analytics.environment = environment;
    }
}
