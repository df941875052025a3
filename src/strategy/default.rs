//! Default lane for uncategorized traffic.

use color_eyre::Result;
use std::sync::Arc;
use tracing::debug;

use super::StrategyContext;
use crate::cache::Bucket;
use crate::http::{Request, Response};

/// Network-first, falling back to whatever the static bucket holds.
///
/// Nothing is written here, and on a combined miss the original network
/// error propagates.
pub(super) async fn handle(ctx: &Arc<StrategyContext>, request: &Request) -> Result<Response> {
  match ctx.network.fetch(request).await {
    Ok(response) => Ok(response),
    Err(e) => match ctx.registry.lookup(Bucket::Static, &request.cache_key()) {
      Some(cached) => {
        debug!(url = %request.url, "network failed, served from static bucket");
        Ok(cached)
      }
      None => Err(e),
    },
  }
}
