//! Edge request mediator library.

pub mod analytics;
pub mod config;
pub mod context;
pub mod decision;
pub mod http;
pub mod lifecycle;
pub mod mediator;
pub mod navigation;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::MediatorConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use mediator::RequestMediator;
