//! Responses synthesized when neither the network nor a bucket can answer.

use serde_json::json;

use crate::http::Response;

/// 503 JSON body returned by the API lane on a combined network and cache miss.
pub fn offline_api_response() -> Response {
  Response::json(
    503,
    &json!({
      "error": "Offline",
      "message": "You are offline and this data has not been cached yet.",
      "offline": true,
    }),
  )
  .with_header("cache-control", "no-store")
}

/// 503 placeholder returned by the image lane when an uncached image cannot be fetched.
pub fn image_placeholder() -> Response {
  const SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="150" viewBox="0 0 200 150"><rect width="200" height="150" fill="#e5e7eb"/><text x="100" y="80" font-family="sans-serif" font-size="14" fill="#6b7280" text-anchor="middle">Image unavailable offline</text></svg>"##;

  Response::new(503, SVG)
    .with_header("content-type", "image/svg+xml")
    .with_header("cache-control", "no-store")
}

/// Minimal offline document, last link of the navigation fallback chain.
pub fn offline_page() -> Response {
  const HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>Offline - MarketWatch</title>
  <style>
    body { font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; background: #0f172a; color: #e2e8f0; }
    main { text-align: center; padding: 2rem; }
    button { margin-top: 1rem; padding: 0.6rem 1.4rem; border: 0; border-radius: 6px; background: #3b82f6; color: #fff; font-size: 1rem; cursor: pointer; }
  </style>
</head>
<body>
  <main>
    <h1>You're offline</h1>
    <p>Market data will refresh as soon as your connection is back.</p>
    <button onclick="window.location.reload()">Retry</button>
  </main>
</body>
</html>
"#;

  Response::html(503, HTML).with_header("cache-control", "no-store")
}
