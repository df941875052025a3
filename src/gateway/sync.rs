//! Background sync: a deferred-retry hook registered when API requests fail offline.
//!
//! Nothing is queued or replayed. When the platform fires the sync event the
//! pages are told that fresh data may be available and re-fetch themselves.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clients::Clients;
use crate::control::ClientMessage;

/// The well-known tag registered after an API request fails.
pub const SYNC_TAG: &str = "marketwatch-api-sync";

/// Platform background-sync facility.
#[derive(Debug)]
pub struct SyncManager {
  supported: AtomicBool,
  pending: Mutex<BTreeSet<String>>,
}

impl Default for SyncManager {
  fn default() -> Self {
    Self {
      supported: AtomicBool::new(true),
      pending: Mutex::new(BTreeSet::new()),
    }
  }
}

impl SyncManager {
  pub fn new() -> Self {
    Self::default()
  }

  /// Toggle platform support; registrations fail while unsupported.
  pub fn set_supported(&self, supported: bool) {
    self.supported.store(supported, Ordering::Relaxed);
  }

  /// Ask the platform for a retry opportunity. Registering a pending tag again is a no-op.
  pub fn register(&self, tag: &str) -> Result<()> {
    if !self.supported.load(Ordering::Relaxed) {
      return Err(eyre!("Background sync is not supported"));
    }
    let mut pending = self.pending.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if pending.insert(tag.to_string()) {
      debug!(tag, "sync registered");
    }
    Ok(())
  }

  /// Tags waiting for the platform to fire them.
  pub fn pending_tags(&self) -> Vec<String> {
    self
      .pending
      .lock()
      .map(|p| p.iter().cloned().collect())
      .unwrap_or_default()
  }

  /// Consume a pending registration. Returns whether it was pending.
  pub fn take(&self, tag: &str) -> bool {
    self
      .pending
      .lock()
      .map(|mut p| p.remove(tag))
      .unwrap_or(false)
  }
}

/// Register the API retry tag, logging instead of failing.
pub fn request_retry(manager: &SyncManager) {
  if let Err(e) = manager.register(SYNC_TAG) {
    warn!(tag = SYNC_TAG, error = %e, "sync registration failed");
  }
}

/// Handle a fired sync event. Returns the number of pages notified.
pub async fn fire(manager: &SyncManager, clients: &Clients, tag: &str) -> usize {
  manager.take(tag);

  if tag != SYNC_TAG {
    debug!(tag, "ignoring sync event for unknown tag");
    return 0;
  }

  let notified = clients
    .broadcast(ClientMessage::SyncComplete {
      timestamp: Utc::now().timestamp_millis(),
    })
    .await;
  info!(tag, notified, "sync complete, pages notified");
  notified
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::sync::mpsc;
  use url::Url;

  #[test]
  fn test_register_and_take() {
    let manager = SyncManager::new();
    manager.register(SYNC_TAG).unwrap();
    manager.register(SYNC_TAG).unwrap();

    assert_eq!(manager.pending_tags(), vec![SYNC_TAG.to_string()]);
    assert!(manager.take(SYNC_TAG));
    assert!(!manager.take(SYNC_TAG));
  }

  #[test]
  fn test_unsupported_registration_degrades() {
    let manager = SyncManager::new();
    manager.set_supported(false);

    assert!(manager.register(SYNC_TAG).is_err());
    request_retry(&manager);
    assert!(manager.pending_tags().is_empty());
  }

  #[tokio::test]
  async fn test_fire_notifies_controlled_pages() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    clients.connect(Url::parse("https://app.example/").unwrap()).await;
    clients.claim().await;

    let manager = SyncManager::new();
    request_retry(&manager);

    assert_eq!(fire(&manager, &clients, SYNC_TAG).await, 1);
    assert!(manager.pending_tags().is_empty());
    assert!(matches!(
      rx.try_recv().unwrap().message,
      ClientMessage::SyncComplete { .. }
    ));

    assert_eq!(fire(&manager, &clients, "other-tag").await, 0);
    assert!(rx.try_recv().is_err());
  }
}
