//! Worker lifecycle: install (pre-warm) and activate (cleanup, claim).

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{Bucket, CacheRegistry};
use crate::http::{Network, Request};

/// Worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkerState {
  /// Script evaluated, install not started
  #[default]
  Parsed,
  Installing,
  /// Installed and waiting for the previous generation to release its pages
  Installed,
  Activating,
  /// Active and controlling pages
  Activated,
  /// Replaced or failed
  Redundant,
}

/// State machine for one worker generation.
#[derive(Debug, Default)]
pub struct Lifecycle {
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
}

impl Lifecycle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> WorkerState {
    self.state.lock().map(|s| *s).unwrap_or(WorkerState::Redundant)
  }

  /// Move from `from` to `to`, failing if the worker is elsewhere.
  fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<()> {
    let mut state = self.state.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if !from.contains(&state) {
      return Err(eyre!("Cannot move from {:?} to {:?}", *state, to));
    }
    debug!(from = ?*state, ?to, "worker state change");
    *state = to;
    Ok(())
  }

  pub fn begin_install(&self) -> Result<()> {
    self.transition(&[WorkerState::Parsed], WorkerState::Installing)
  }

  pub fn finish_install(&self) -> Result<()> {
    self.transition(&[WorkerState::Installing], WorkerState::Installed)
  }

  pub fn begin_activate(&self) -> Result<()> {
    self.transition(&[WorkerState::Installed], WorkerState::Activating)
  }

  pub fn finish_activate(&self) -> Result<()> {
    self.transition(&[WorkerState::Activating], WorkerState::Activated)
  }

  pub fn mark_redundant(&self) {
    if let Ok(mut state) = self.state.lock() {
      *state = WorkerState::Redundant;
    }
  }

  /// Request activation without waiting for old pages to close.
  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::Relaxed);
  }

  pub fn skips_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::Relaxed)
  }
}

/// Outcome of pre-caching the core assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrecacheReport {
  pub cached: Vec<String>,
  /// URL and reason for every asset that could not be cached
  pub failed: Vec<(String, String)>,
}

/// Fetch and store every asset in the static bucket.
///
/// Each asset is isolated: a transport failure or non-2xx status is logged
/// and does not stop the others.
pub async fn precache(
  registry: &CacheRegistry,
  network: &dyn Network,
  assets: &[Url],
) -> PrecacheReport {
  let results = join_all(assets.iter().map(|url| async move {
    let request = Request::get(url.clone());
    let outcome = match network.fetch(&request).await {
      Ok(response) if response.ok() => {
        registry.store_stamped(Bucket::Static, &request.cache_key(), &response);
        Ok(())
      }
      Ok(response) => Err(format!("HTTP {}", response.status)),
      Err(e) => Err(e.to_string()),
    };
    (url.as_str().to_string(), outcome)
  }))
  .await;

  let mut report = PrecacheReport::default();
  for (url, outcome) in results {
    match outcome {
      Ok(()) => report.cached.push(url),
      Err(reason) => {
        warn!(url = url.as_str(), reason = reason.as_str(), "failed to pre-cache asset");
        report.failed.push((url, reason));
      }
    }
  }

  info!(
    cached = report.cached.len(),
    failed = report.failed.len(),
    "pre-cache finished"
  );
  report
}
