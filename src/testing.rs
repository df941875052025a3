//! Test doubles shared by the module tests.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use crate::cache::{CacheNames, CacheRegistry, CacheStore, MemoryStore};
use crate::clients::{Clients, Delivery};
use crate::gateway::SyncManager;
use crate::http::{Network, Request, Response};
use crate::strategy::StrategyContext;
use crate::tasks::BackgroundTasks;

pub const ORIGIN: &str = "https://app.example/";

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Scripted network: fixed responses per URL, 404 for anything unknown.
#[derive(Default)]
pub struct MockNetwork {
  routes: Mutex<HashMap<String, Response>>,
  failing: Mutex<HashSet<String>>,
  offline: AtomicBool,
  fail_next: AtomicUsize,
  calls: Mutex<Vec<String>>,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &Url, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.as_str().to_string(), response);
  }

  /// Make every fetch fail with a transport error.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Make fetches of one URL fail with a transport error.
  pub fn fail(&self, url: &Url) {
    self
      .failing
      .lock()
      .unwrap()
      .insert(url.as_str().to_string());
  }

  /// Make the next `n` fetches fail with a transport error, whatever the URL.
  pub fn fail_next(&self, n: usize) {
    self.fail_next.store(n, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }

  pub fn calls_for(&self, url: &Url) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|u| u.as_str() == url.as_str())
      .count()
  }

  fn respond(&self, request: &Request) -> Result<Response> {
    let key = request.url.as_str().to_string();
    self.calls.lock().unwrap().push(key.clone());

    let fail_once = self
      .fail_next
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();

    if fail_once
      || self.offline.load(Ordering::SeqCst)
      || self.failing.lock().unwrap().contains(&key)
    {
      return Err(eyre!("Failed to fetch {}: network unreachable", key));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(&key)
        .cloned()
        .unwrap_or_else(|| Response::new(404, "not found")),
    )
  }
}

impl Network for MockNetwork {
  fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
    let result = self.respond(request);
    Box::pin(async move { result })
  }
}

/// Store whose every operation fails, as a full disk or revoked quota would.
pub struct FailingStore;

impl FailingStore {
  fn fail<T>(&self, bucket: &str) -> Result<T> {
    Err(eyre!("Cache storage unavailable for {}: disk I/O error", bucket))
  }
}

impl CacheStore for FailingStore {
  fn open(&self, bucket: &str) -> Result<()> {
    self.fail(bucket)
  }

  fn names(&self) -> Result<Vec<String>> {
    self.fail("*")
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    self.fail(bucket)
  }

  fn get(&self, bucket: &str, _key: &str) -> Result<Option<Response>> {
    self.fail(bucket)
  }

  fn put(&self, bucket: &str, _key: &str, _response: &Response) -> Result<()> {
    self.fail(bucket)
  }

  fn delete(&self, bucket: &str, _key: &str) -> Result<bool> {
    self.fail(bucket)
  }

  fn keys(&self, bucket: &str) -> Result<Vec<String>> {
    self.fail(bucket)
  }

  fn count(&self, bucket: &str) -> Result<usize> {
    self.fail(bucket)
  }
}

pub struct Harness {
  pub ctx: Arc<StrategyContext>,
  pub network: Arc<MockNetwork>,
  pub rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Harness {
  /// Messages posted to pages so far.
  pub fn deliveries(&mut self) -> Vec<Delivery> {
    let mut out = Vec::new();
    while let Ok(delivery) = self.rx.try_recv() {
      out.push(delivery);
    }
    out
  }
}

/// A strategy context over an empty in-memory store and a scripted network.
pub fn harness() -> Harness {
  harness_with_store(Arc::new(MemoryStore::new()))
}

pub fn harness_with_store(store: Arc<dyn CacheStore>) -> Harness {
  let network = Arc::new(MockNetwork::new());
  let (tx, rx) = mpsc::unbounded_channel();
  let ctx = StrategyContext {
    registry: CacheRegistry::new(store, CacheNames::new("mw", "v1")),
    network: network.clone(),
    background: BackgroundTasks::new(),
    clients: Arc::new(Clients::new(tx)),
    sync: Arc::new(SyncManager::new()),
    api_ttl: Duration::from_secs(5 * 60),
    image_ttl: Duration::from_secs(30 * 24 * 60 * 60),
    app_shell: url("/"),
  };

  Harness {
    ctx: Arc::new(ctx),
    network,
    rx,
  }
}
