//! Static lane: cache-first, refreshed in the background on every hit.

use color_eyre::Result;
use std::sync::Arc;

use super::{spawn_refresh, StrategyContext};
use crate::cache::Bucket;
use crate::http::{Request, Response};

/// Staleness is tolerated for speed, so there is no TTL gate. A miss goes to
/// the network and a transport failure propagates to the caller.
pub(super) async fn handle(ctx: &Arc<StrategyContext>, request: &Request) -> Result<Response> {
  let key = request.cache_key();

  if let Some(cached) = ctx.registry.lookup(Bucket::Static, &key) {
    spawn_refresh(ctx, Bucket::Static, request, false);
    return Ok(cached);
  }

  let response = ctx.network.fetch(request).await?;
  if response.ok() {
    ctx.registry.store_stamped(Bucket::Static, &key, &response);
  }
  Ok(response)
}
