//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → environment overrides (API host, client key, analytics token, environment)
//!     → validation.rs (semantic checks)
//!     → MediatorConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; nothing per-request is ever written back
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AnalyticsConfig, DecisionConfig, DecisionOptions, DiagnosticsConfig, LogFormat,
    MediatorConfig, ObservabilityConfig, OriginConfig, PayloadShape, PipelineConfig,
    PolicyConfig,
};
