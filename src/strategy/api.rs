//! API lane: network-first with a short TTL and stale-while-revalidate on failure.

use std::sync::Arc;
use tracing::{debug, info};

use super::{fallback, spawn_refresh, StrategyContext};
use crate::cache::{is_fresh, Bucket};
use crate::gateway::sync;
use crate::http::{Request, Response};

/// 1. Try the network; store ok responses and return the live response
/// 2. On failure, register a background-sync retry
/// 3. Serve a fresh cached copy, or a stale one while refreshing in the background
/// 4. With nothing cached, synthesize a 503 `{"error": "Offline"}`
pub(super) async fn handle(ctx: &Arc<StrategyContext>, request: &Request) -> Response {
  let key = request.cache_key();

  let error = match ctx.network.fetch(request).await {
    Ok(response) => {
      if response.ok() {
        ctx.registry.store_stamped(Bucket::Api, &key, &response);
      }
      return response;
    }
    Err(e) => e,
  };

  debug!(url = %request.url, error = %error, "API request failed, falling back to cache");
  sync::request_retry(&ctx.sync);

  match ctx.registry.lookup(Bucket::Api, &key) {
    Some(cached) if is_fresh(&cached, ctx.api_ttl) => cached,
    Some(cached) => {
      info!(url = %request.url, "serving stale API response, revalidating");
      spawn_refresh(ctx, Bucket::Api, request, true);
      cached
    }
    None => fallback::offline_api_response(),
  }
}
