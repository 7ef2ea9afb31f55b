//! Client-side assets: the inline registration snippet injected into HTML
//! and the worker script served at the configured path.

/// Attribute identifying an already-injected bootstrap.
pub const BOOTSTRAP_MARKER: &str = "data-edge-navigation";

/// Worker script. Installs without waiting, claims open pages on activate,
/// and re-issues redirected navigations with credentials included.
///
/// Navigation requests already carry the manual redirect mode, so the first
/// fetch surfaces the 3xx and its `Location`. The follow-up is manual too;
/// the default follow path is never taken.
pub const WORKER_SCRIPT: &str = r#"self.addEventListener("install", function () {
  self.skipWaiting();
});

self.addEventListener("activate", function (event) {
  event.waitUntil(self.clients.claim());
});

self.addEventListener("fetch", function (event) {
  var request = event.request;
  if (request.mode !== "navigate") {
    return;
  }
  event.respondWith(
    fetch(request).then(function (response) {
      var location = response.headers.get("location");
      if (response.status >= 300 && response.status < 400 && location) {
        var target = new URL(location, request.url).toString();
        return fetch(target, { credentials: "include", redirect: "manual" });
      }
      return response;
    })
  );
});
"#;

/// Inline `<script>` registering the worker at `script_path` for `scope`.
pub fn registration_snippet(script_path: &str, scope: &str) -> String {
    format!(
        "<script {marker}>if(\"serviceWorker\" in navigator){{navigator.serviceWorker.register({path},{{scope:{scope}}}).catch(function(){{}});}}</script>",
        marker = BOOTSTRAP_MARKER,
        path = js_string(script_path),
        scope = js_string(scope),
    )
}

/// JSON string literal that cannot close the surrounding script element.
fn js_string(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace("</", "<\\/")
}
