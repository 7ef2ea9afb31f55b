//! Named cookie extraction.

use axum::http::{header, HeaderMap};
use cookie::Cookie;

use super::{ANALYTICS_ID_COOKIE, FLAG_COOKIE, IDENTITY_COOKIE};

/// The three cookies the mediator reads. Values are raw (not
/// percent-decoded); the first occurrence of a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCookies {
    pub identity: Option<String>,
    pub flag_blob: Option<String>,
    pub analytics_id: Option<String>,
}

impl RequestCookies {
    /// Parse every `Cookie` header. Unparseable pairs and non-UTF-8 headers
    /// are skipped.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut found = Self::default();

        let cookies = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value).filter_map(Result::ok));

        for cookie in cookies {
            let slot = match cookie.name() {
                IDENTITY_COOKIE => &mut found.identity,
                FLAG_COOKIE => &mut found.flag_blob,
                ANALYTICS_ID_COOKIE => &mut found.analytics_id,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(cookie.value().to_string());
            }
        }

        found
    }
}
