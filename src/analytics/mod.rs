//! Exposure analytics.
//!
//! # Data Flow
//! ```text
//! EdgeHooks::track(context, experiment)
//!     → event.rs (ExposureEvent, insert id fixed at creation)
//!     → sink.rs (spawned task; POST with bounded retry)
//!     → analytics endpoint
//! ```
//!
//! # Design Decisions
//! - Fire-and-forget: the response never waits on delivery
//! - Failures are logged and dropped
//! - Body shape selected by configuration

pub mod event;
pub mod sink;

pub use event::ExposureEvent;
pub use sink::{SinkError, TrackingSink};
