//! Per-lane read/write policies against the buckets and the network.
//!
//! | Lane       | Policy                                   | Bucket  | TTL     |
//! |------------|------------------------------------------|---------|---------|
//! | API        | network-first, stale-while-revalidate    | api     | 5 min   |
//! | Image      | cache-first, background refresh if stale | images  | 30 days |
//! | Static     | cache-first, always refresh in background| static  | none    |
//! | Navigation | network-first, shell/offline fallback    | static  | none    |
//! | Default    | network-first, cache read on failure     | static  | none    |

mod api;
mod default;
mod fallback;
mod image;
mod navigation;
mod static_assets;

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::cache::{Bucket, CacheRegistry};
use crate::classifier::Lane;
use crate::clients::Clients;
use crate::control::ClientMessage;
use crate::gateway::SyncManager;
use crate::http::{Network, Request, Response};
use crate::tasks::BackgroundTasks;

pub use fallback::{image_placeholder, offline_api_response, offline_page};

/// Everything a strategy needs, shared with the background tasks it spawns.
pub struct StrategyContext {
  pub registry: CacheRegistry,
  pub network: Arc<dyn Network>,
  pub background: BackgroundTasks,
  pub clients: Arc<Clients>,
  pub sync: Arc<SyncManager>,
  pub api_ttl: Duration,
  pub image_ttl: Duration,
  /// Cached page served when a navigation has no cached copy of its own
  pub app_shell: Url,
}

/// Serve `request` through the policy of `lane`.
///
/// Errors are only returned by the Static and Default lanes, which have no
/// safe synthesized fallback.
pub async fn handle(ctx: &Arc<StrategyContext>, lane: Lane, request: &Request) -> Result<Response> {
  debug!(?lane, url = %request.url, "handling request");
  match lane {
    Lane::Api => Ok(api::handle(ctx, request).await),
    Lane::Image => Ok(image::handle(ctx, request).await),
    Lane::Static => static_assets::handle(ctx, request).await,
    Lane::Navigation => Ok(navigation::handle(ctx, request).await),
    Lane::Default => default::handle(ctx, request).await,
  }
}

/// Re-fetch `request` in the background and overwrite its bucket entry on success.
///
/// Returns immediately; the refresh is tracked by `ctx.background` and is not
/// tied to the lifetime of the caller.
fn spawn_refresh(ctx: &Arc<StrategyContext>, bucket: Bucket, request: &Request, announce: bool) {
  let task_ctx = Arc::clone(ctx);
  let request = request.clone();

  ctx.background.spawn("cache-refresh", async move {
    let key = request.cache_key();
    match task_ctx.network.fetch(&request).await {
      Ok(response) if response.ok() => {
        task_ctx.registry.store_stamped(bucket, &key, &response);
        debug!(url = %request.url, ?bucket, "background refresh stored");
        if announce {
          task_ctx
            .clients
            .broadcast(ClientMessage::BackgroundUpdate { url: key })
            .await;
        }
      }
      Ok(response) => {
        debug!(url = %request.url, status = response.status, "background refresh not stored");
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "background refresh failed");
      }
    }
  });
}
