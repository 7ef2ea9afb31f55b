//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Build server → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Shutdown::trigger → server stops accepting → in-flight requests drain → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - One broadcast channel; every long-running task subscribes

pub mod shutdown;

pub use shutdown::Shutdown;
