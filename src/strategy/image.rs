//! Image lane: cache-first with a long expiration.

use std::sync::Arc;
use tracing::debug;

use super::{fallback, spawn_refresh, StrategyContext};
use crate::cache::{is_fresh, Bucket};
use crate::http::{Request, Response};

/// Fresh hits are returned as-is, expired hits are returned while a background
/// refresh runs, and misses go to the network. An uncached image that cannot
/// be fetched gets a 503 placeholder instead of an error.
pub(super) async fn handle(ctx: &Arc<StrategyContext>, request: &Request) -> Response {
  let key = request.cache_key();

  if let Some(cached) = ctx.registry.lookup(Bucket::Images, &key) {
    if !is_fresh(&cached, ctx.image_ttl) {
      debug!(url = %request.url, "image expired, refreshing in background");
      spawn_refresh(ctx, Bucket::Images, request, false);
    }
    return cached;
  }

  match ctx.network.fetch(request).await {
    Ok(response) => {
      if response.ok() {
        ctx.registry.store_stamped(Bucket::Images, &key, &response);
      }
      response
    }
    Err(e) => {
      debug!(url = %request.url, error = %e, "image fetch failed, serving placeholder");
      fallback::image_placeholder()
    }
  }
}
