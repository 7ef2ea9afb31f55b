//! Static diagnostics page and the worker script route.

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response, StatusCode},
};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::navigation::bootstrap::WORKER_SCRIPT;

const SERVICE_WORKER_ALLOWED: &str = "service-worker-allowed";

/// Informational page: hostname, path and the current time. No side effects.
pub fn diagnostics_page(request: &Request<Body>, now: DateTime<Utc>) -> Response<Body> {
    let hostname = request
        .uri()
        .host()
        .or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(|h| h.split(':').next().unwrap_or(h))
        })
        .unwrap_or("unknown");

    let body = format!(
        "<!doctype html>\n<html><head><title>edge-mediator</title></head><body>\
         <h1>edge-mediator</h1>\
         <dl><dt>hostname</dt><dd>{}</dd><dt>path</dt><dd>{}</dd><dt>timestamp</dt><dd>{}</dd></dl>\
         </body></html>\n",
        escape(hostname),
        escape(request.uri().path()),
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
    );

    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// The navigation interceptor worker, allowed to control `scope`.
pub fn worker_script(scope: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(WORKER_SCRIPT));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/javascript; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    match HeaderValue::from_str(scope) {
        Ok(scope) => {
            headers.insert(SERVICE_WORKER_ALLOWED, scope);
        }
        Err(_) => {
            tracing::error!(scope = %scope, "Worker scope is not a valid header value");
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    response
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
