//! Loop guard.
//!
//! Every request the mediator forwards carries a sentinel header that normal
//! client traffic never sends. Seeing it inbound means the request already
//! passed through a mediator once, so it goes straight to the origin.

use axum::http::{header::HeaderName, HeaderMap, HeaderValue};

/// Sentinel header name.
pub const LOOP_MARKER: HeaderName = HeaderName::from_static("x-edge-mediated");

static MARKER_VALUE: HeaderValue = HeaderValue::from_static("true");

/// Single-bit loop detection protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopGuard;

impl LoopGuard {
    /// True when the headers carry the marker set to `true`.
    pub fn is_marked(headers: &HeaderMap) -> bool {
        headers
            .get(&LOOP_MARKER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Set the marker, replacing any previous value.
    pub fn mark(headers: &mut HeaderMap) {
        headers.insert(LOOP_MARKER, MARKER_VALUE.clone());
    }

    /// Remove the marker so it never reaches a client.
    pub fn strip(headers: &mut HeaderMap) {
        headers.remove(&LOOP_MARKER);
    }
}
