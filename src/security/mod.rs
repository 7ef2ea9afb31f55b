//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → loop_guard.rs (already mediated? → origin bypass)
//!
//! Outgoing response:
//!     → headers.rs (CORS + frame policy, applied last)
//!     → loop_guard.rs (marker stripped)
//! ```

pub mod headers;
pub mod loop_guard;

pub use headers::{HeaderPolicy, PolicyExempt};
pub use loop_guard::{LoopGuard, LOOP_MARKER};
