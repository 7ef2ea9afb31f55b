//! Bootstrap injection into HTML bodies.

use axum::http::{header, HeaderMap};
use bytes::{Bytes, BytesMut};

use crate::navigation::bootstrap::BOOTSTRAP_MARKER;

const HEAD_CLOSE: &[u8] = b"</head>";

/// True for `text/html` bodies the mediator may rewrite (no content coding
/// other than identity).
pub fn is_rewritable_html(headers: &HeaderMap) -> bool {
    let is_html = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("text/html"))
        .unwrap_or(false);

    let encoded = headers
        .get_all(header::CONTENT_ENCODING)
        .iter()
        .any(|v| !v.as_bytes().eq_ignore_ascii_case(b"identity"));

    is_html && !encoded
}

/// Insert `script` right before the first closing head tag.
///
/// Returns `None` when there is no closing head tag or the document already
/// carries the bootstrap.
pub fn inject_bootstrap(body: &[u8], script: &str) -> Option<Bytes> {
    if contains(body, BOOTSTRAP_MARKER.as_bytes()) {
        return None;
    }
    let at = body
        .windows(HEAD_CLOSE.len())
        .position(|w| w.eq_ignore_ascii_case(HEAD_CLOSE))?;

    let mut out = BytesMut::with_capacity(body.len() + script.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(script.as_bytes());
    out.extend_from_slice(&body[at..]);
    Some(out.freeze())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
