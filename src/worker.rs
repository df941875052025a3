//! The worker dispatcher: one entry point per platform event.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheInfo, CacheRegistry, CacheStore};
use crate::classifier::Classifier;
use crate::clients::{Clients, Delivery};
use crate::config::Config;
use crate::control::{ClientMessage, ControlMessage};
use crate::gateway::push::{route_click, NotificationCenter, NotificationDescriptor};
use crate::gateway::{sync, ClickOutcome, SyncManager};
use crate::http::{Network, Request, Response};
use crate::lifecycle::{precache, Lifecycle, PrecacheReport, WorkerState};
use crate::strategy::{self, StrategyContext};
use crate::tasks::BackgroundTasks;

/// Outcome of activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Buckets of older generations that were deleted
  pub deleted: Vec<String>,
  /// Pages taken over by this generation
  pub claimed: usize,
}

/// One worker generation.
///
/// Every method corresponds to an event the platform delivers; the platform
/// (or a test) decides when to call them.
pub struct ServiceWorker {
  config: Config,
  scope: Url,
  core_assets: Vec<Url>,
  classifier: Classifier,
  ctx: Arc<StrategyContext>,
  lifecycle: Lifecycle,
  notifications: NotificationCenter,
}

impl ServiceWorker {
  /// Create a worker over `store` and `network`.
  ///
  /// Also returns the receiving end of the page message channel.
  pub fn new(
    config: Config,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
  ) -> Result<(Self, mpsc::UnboundedReceiver<Delivery>)> {
    let (tx, rx) = mpsc::unbounded_channel();

    let scope = Url::parse(&config.scope)
      .map_err(|e| eyre!("Invalid scope '{}': {}", config.scope, e))?;
    let app_shell = config.resolve(&config.app_shell)?;
    let core_assets = config
      .core_assets
      .iter()
      .map(|asset| config.resolve(asset))
      .collect::<Result<Vec<_>>>()?;

    let ctx = StrategyContext {
      registry: CacheRegistry::new(store, config.cache_names()),
      network,
      background: BackgroundTasks::new(),
      clients: Arc::new(Clients::new(tx)),
      sync: Arc::new(SyncManager::new()),
      api_ttl: config.api_ttl(),
      image_ttl: config.image_ttl(),
      app_shell,
    };

    let worker = Self {
      classifier: Classifier::new(config.api_prefixes.clone()),
      scope,
      core_assets,
      ctx: Arc::new(ctx),
      lifecycle: Lifecycle::new(),
      notifications: NotificationCenter::new(),
      config,
    };

    Ok((worker, rx))
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.state()
  }

  pub fn registry(&self) -> &CacheRegistry {
    &self.ctx.registry
  }

  pub fn clients(&self) -> &Arc<Clients> {
    &self.ctx.clients
  }

  pub fn sync_manager(&self) -> &Arc<SyncManager> {
    &self.ctx.sync
  }

  pub fn notifications(&self) -> &NotificationCenter {
    &self.notifications
  }

  /// Install: request skip-waiting, then pre-cache the core assets.
  ///
  /// Asset failures never fail the install.
  pub async fn on_install(&self) -> Result<PrecacheReport> {
    self.lifecycle.begin_install()?;
    self.lifecycle.skip_waiting();
    info!(version = self.config.version.as_str(), "installing");

    self.ctx.registry.open_all();
    let report = precache(&self.ctx.registry, self.ctx.network.as_ref(), &self.core_assets).await;

    self.lifecycle.finish_install()?;
    Ok(report)
  }

  /// Whether the platform should activate right after install.
  pub fn skips_waiting(&self) -> bool {
    self.lifecycle.skips_waiting()
  }

  /// Activate: delete older generations' buckets, then claim every open page.
  pub async fn on_activate(&self) -> Result<ActivationReport> {
    self.lifecycle.begin_activate()?;
    info!(version = self.config.version.as_str(), "activating");

    let deleted = self.ctx.registry.prune_stale();
    for name in &deleted {
      info!(bucket = name.as_str(), "deleted old cache");
    }
    let claimed = self.ctx.clients.claim().await;

    self.lifecycle.finish_activate()?;
    Ok(ActivationReport { deleted, claimed })
  }

  /// Fetch: classify and serve through the matching lane.
  ///
  /// `Ok(None)` means the request is not intercepted and goes to the network
  /// untouched. An error is only returned by lanes without a synthesized
  /// fallback (Static and Default).
  pub async fn on_fetch(&self, request: &Request) -> Result<Option<Response>> {
    if self.lifecycle.state() == WorkerState::Redundant {
      return Ok(None);
    }

    let Some(lane) = self.classifier.classify(request) else {
      debug!(method = request.method.as_str(), url = %request.url, "passing through");
      return Ok(None);
    };

    strategy::handle(&self.ctx, lane, request).await.map(Some)
  }

  /// A newer generation activated. This one stops intercepting requests.
  pub fn on_replaced(&self) {
    self.lifecycle.mark_redundant();
    info!(version = self.config.version.as_str(), "replaced by a newer worker");
  }

  /// Sync: tell pages fresh data may be available. Returns pages notified.
  pub async fn on_sync(&self, tag: &str) -> usize {
    sync::fire(&self.ctx.sync, &self.ctx.clients, tag).await
  }

  /// Push: build the descriptor and show exactly one notification.
  pub async fn on_push(&self, payload: Option<&[u8]>) -> Result<(u64, NotificationDescriptor)> {
    let descriptor = NotificationDescriptor::from_push(&self.config.notification, payload);
    let id = self.notifications.show(descriptor.clone())?;
    Ok((id, descriptor))
  }

  /// Notification click: close it, then route per the clicked action.
  pub async fn on_notification_click(&self, id: u64, action: Option<&str>) -> Result<ClickOutcome> {
    let shown = self
      .notifications
      .close(id)
      .ok_or_else(|| eyre!("Notification {} is not shown", id))?;

    route_click(&self.ctx.clients, &self.scope, &shown.descriptor, action).await
  }

  pub async fn on_notification_close(&self, id: u64) {
    if self.notifications.close(id).is_some() {
      debug!(id, "notification closed");
    }
  }

  /// Control message from a page. Unknown or malformed messages are logged and ignored.
  pub async fn on_message(&self, source: Option<&str>, data: &serde_json::Value) {
    let message = match ControlMessage::parse(data) {
      Ok(message) => message,
      Err(e) => {
        warn!(error = %e, "ignoring control message");
        return;
      }
    };
    debug!(?message, source, "control message");

    match message {
      ControlMessage::SkipWaiting => {
        self.lifecycle.skip_waiting();
        if self.lifecycle.state() == WorkerState::Installed {
          if let Err(e) = self.on_activate().await {
            warn!(error = %e, "forced activation failed");
          }
        }
      }
      ControlMessage::CheckUpdate => {
        self.ctx.registry.purge(crate::cache::Bucket::Api);
        self
          .ctx
          .clients
          .broadcast(ClientMessage::UpdateAvailable {
            timestamp: chrono::Utc::now().timestamp_millis(),
          })
          .await;
      }
      ControlMessage::ClearCache => {
        self.ctx.registry.clear();
        info!("all caches cleared");
      }
      ControlMessage::GetCacheInfo => match source {
        Some(client_id) => {
          self
            .ctx
            .clients
            .post_message(client_id, ClientMessage::CacheInfo(self.cache_info()));
        }
        None => warn!("GET_CACHE_INFO without a source page, not replying"),
      },
    }
  }

  pub fn cache_info(&self) -> CacheInfo {
    self.ctx.registry.info()
  }

  /// Wait for every background refresh spawned so far.
  pub async fn drain_background(&self) -> usize {
    self.ctx.background.drain().await
  }
}
