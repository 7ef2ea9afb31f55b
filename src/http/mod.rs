//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → preflight.rs (OPTIONS answered with the bare policy, before routing)
//!     → server.rs (Axum setup, request ID, tracing, timeout, policy layer)
//!     → diagnostics.rs (static page, worker script)   or
//!     → mediator (pipeline)
//!         → request.rs (buffer once, derive ProxyTarget, augmented copies)
//!         → origin.rs (reqwest client, redirects never followed)
//!         → response.rs (stream back, strip hop-by-hop and loop marker)
//!     → Send to client
//! ```

pub mod diagnostics;
pub mod origin;
pub mod preflight;
pub mod request;
pub mod response;
pub mod server;

pub use origin::{HttpOrigin, Origin, OriginError};
pub use request::{ForwardedRequest, IncomingRequest, ProxyTarget, RequestError};
pub use server::{HttpServer, ServerError};
