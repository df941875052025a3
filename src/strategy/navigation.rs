//! Navigation lane: network-first with a multi-level offline fallback.

use std::sync::Arc;
use tracing::{debug, info};

use super::{fallback, StrategyContext};
use crate::cache::Bucket;
use crate::http::{Request, Response};

/// Fallback order when the network fails:
/// 1. the cached copy of the requested URL
/// 2. the cached app shell
/// 3. a synthesized offline page with a retry button
///
/// A page load never ends in an unhandled network error.
pub(super) async fn handle(ctx: &Arc<StrategyContext>, request: &Request) -> Response {
  let key = request.cache_key();

  let error = match ctx.network.fetch(request).await {
    Ok(response) => {
      if response.ok() {
        ctx.registry.store_stamped(Bucket::Static, &key, &response);
      }
      return response;
    }
    Err(e) => e,
  };

  debug!(url = %request.url, error = %error, "navigation failed, trying offline fallbacks");

  if let Some(cached) = ctx.registry.lookup(Bucket::Static, &key) {
    return cached;
  }

  if let Some(shell) = ctx.registry.lookup(Bucket::Static, ctx.app_shell.as_str()) {
    info!(url = %request.url, "serving cached app shell");
    return shell;
  }

  info!(url = %request.url, "serving offline page");
  fallback::offline_page()
}
