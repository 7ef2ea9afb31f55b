//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Decide call (not the origin fetch that follows it):
//!     → timeouts.rs (explicit deadline; expiry → fail-open)
//!
//! Analytics delivery:
//!     → backoff.rs (jittered exponential delay between attempts)
//! ```
//!
//! # Design Decisions
//! - Every external call the mediator waits on has a deadline
//! - Retries only where duplicates are harmless (insert-id deduplicated events)

pub mod backoff;
pub mod timeouts;
