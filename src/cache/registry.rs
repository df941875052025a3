//! Cache registry: the three version-scoped buckets and their freshness rules.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{Bucket, CacheNames, CacheStore};
use crate::http::Response;

/// Header injected into every response this system writes to a bucket.
pub const CACHED_AT_HEADER: &str = "sw-cached-at";

/// Entry counts of the current buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
  #[serde(rename = "static")]
  pub static_assets: usize,
  pub api: usize,
  pub images: usize,
}

/// Owns the bucket store on behalf of one worker generation.
///
/// Store failures never escape: reads degrade to a miss and writes are
/// logged and dropped.
#[derive(Clone)]
pub struct CacheRegistry {
  store: Arc<dyn CacheStore>,
  names: CacheNames,
}

impl CacheRegistry {
  pub fn new(store: Arc<dyn CacheStore>, names: CacheNames) -> Self {
    Self { store, names }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  pub fn store(&self) -> &Arc<dyn CacheStore> {
    &self.store
  }

  /// Look up an entry, treating any store failure as a miss.
  pub fn lookup(&self, bucket: Bucket, key: &str) -> Option<Response> {
    let name = self.names.get(bucket);
    match self.store.get(name, key) {
      Ok(Some(response)) => {
        debug!(bucket = name, key, "cache hit");
        Some(response)
      }
      Ok(None) => {
        debug!(bucket = name, key, "cache miss");
        None
      }
      Err(e) => {
        warn!(bucket = name, key, error = %e, "cache read failed, treating as miss");
        None
      }
    }
  }

  /// Store a copy of `response` stamped with the current time.
  pub fn store_stamped(&self, bucket: Bucket, key: &str, response: &Response) {
    self.store_stamped_at(bucket, key, response, Utc::now());
  }

  /// Store a copy of `response` stamped with `cached_at`.
  pub fn store_stamped_at(
    &self,
    bucket: Bucket,
    key: &str,
    response: &Response,
    cached_at: DateTime<Utc>,
  ) {
    let stamped = response
      .clone()
      .with_header(CACHED_AT_HEADER, cached_at.to_rfc3339());
    let name = self.names.get(bucket);

    if let Err(e) = self.store.put(name, key, &stamped) {
      warn!(bucket = name, key, error = %e, "cache write failed");
    }
  }

  /// Remove every entry of one bucket. Returns whether the bucket existed.
  pub fn purge(&self, bucket: Bucket) -> bool {
    let name = self.names.get(bucket);
    match self.store.delete_bucket(name) {
      Ok(existed) => existed,
      Err(e) => {
        warn!(bucket = name, error = %e, "failed to delete bucket");
        false
      }
    }
  }

  /// Delete all three current buckets.
  pub fn clear(&self) {
    for bucket in Bucket::ALL {
      self.purge(bucket);
    }
  }

  /// Create the current buckets so they show up when enumerating.
  pub fn open_all(&self) {
    for bucket in Bucket::ALL {
      let name = self.names.get(bucket);
      if let Err(e) = self.store.open(name) {
        warn!(bucket = name, error = %e, "failed to open bucket");
      }
    }
  }

  /// Delete every namespaced bucket that is not one of the current three.
  ///
  /// Returns the names of the deleted buckets.
  pub fn prune_stale(&self) -> Vec<String> {
    let names = match self.store.names() {
      Ok(names) => names,
      Err(e) => {
        warn!(error = %e, "failed to enumerate buckets");
        return Vec::new();
      }
    };

    names
      .into_iter()
      .filter(|name| self.names.owns(name) && !self.names.is_current(name))
      .filter(|name| match self.store.delete_bucket(name) {
        Ok(_) => true,
        Err(e) => {
          warn!(bucket = name.as_str(), error = %e, "failed to delete stale bucket");
          false
        }
      })
      .collect()
  }

  pub fn info(&self) -> CacheInfo {
    let count = |bucket: Bucket| {
      let name = self.names.get(bucket);
      self.store.count(name).unwrap_or_else(|e| {
        warn!(bucket = name, error = %e, "failed to count bucket entries");
        0
      })
    };

    CacheInfo {
      static_assets: count(Bucket::Static),
      api: count(Bucket::Api),
      images: count(Bucket::Images),
    }
  }
}

/// Timestamp a response was written at, if it carries one.
pub fn cached_at(response: &Response) -> Option<DateTime<Utc>> {
  response
    .header(CACHED_AT_HEADER)
    .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
    .map(|dt| dt.with_timezone(&Utc))
}

/// Whether a cached response is within `ttl` of its stamp.
///
/// Entries without a stamp (copied verbatim from upstream) are always fresh.
pub fn is_fresh(response: &Response, ttl: Duration) -> bool {
  match cached_at(response) {
    Some(at) => {
      let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
      Utc::now() - at <= ttl
    }
    None => true,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::testing::FailingStore;

  fn registry(version: &str, store: Arc<MemoryStore>) -> CacheRegistry {
    CacheRegistry::new(store, CacheNames::new("mw", version))
  }

  #[test]
  fn test_round_trip_carries_stamp() {
    let reg = registry("v1", Arc::new(MemoryStore::new()));
    let original =
      Response::new(200, "{\"price\":187.5}").with_header("content-type", "application/json");

    for bucket in Bucket::ALL {
      reg.store_stamped(bucket, "https://a/api/quote", &original);
      let read = reg.lookup(bucket, "https://a/api/quote").unwrap();
      assert_eq!(read.body, original.body);
      assert!(cached_at(&read).is_some());
      assert_eq!(read.header("content-type"), Some("application/json"));
    }
  }

  #[test]
  fn test_freshness() {
    let ttl = Duration::from_secs(300);
    let reg = registry("v1", Arc::new(MemoryStore::new()));
    let resp = Response::new(200, "x");

    reg.store_stamped_at(Bucket::Api, "fresh", &resp, Utc::now() - chrono::Duration::seconds(60));
    reg.store_stamped_at(Bucket::Api, "stale", &resp, Utc::now() - chrono::Duration::minutes(10));

    assert!(is_fresh(&reg.lookup(Bucket::Api, "fresh").unwrap(), ttl));
    assert!(!is_fresh(&reg.lookup(Bucket::Api, "stale").unwrap(), ttl));
    assert!(is_fresh(&resp, ttl), "unstamped entries are always fresh");
  }

  #[test]
  fn test_prune_keeps_current_generation() {
    let store = Arc::new(MemoryStore::new());
    for name in ["mw-v1-static", "mw-v1-api", "mw-v1-images", "mw-v0-static", "unrelated"] {
      store.open(name).unwrap();
    }

    let deleted = registry("v1", store.clone()).prune_stale();

    assert_eq!(deleted, vec!["mw-v0-static".to_string()]);
    assert_eq!(
      store.names().unwrap(),
      vec![
        "mw-v1-api".to_string(),
        "mw-v1-images".to_string(),
        "mw-v1-static".to_string(),
        "unrelated".to_string(),
      ]
    );
  }

  #[test]
  fn test_clear_and_info() {
    let reg = registry("v1", Arc::new(MemoryStore::new()));
    reg.store_stamped(Bucket::Static, "a", &Response::new(200, "a"));
    reg.store_stamped(Bucket::Static, "b", &Response::new(200, "b"));
    reg.store_stamped(Bucket::Images, "c", &Response::new(200, "c"));

    assert_eq!(
      reg.info(),
      CacheInfo {
        static_assets: 2,
        api: 0,
        images: 1
      }
    );

    reg.clear();
    assert_eq!(reg.info(), CacheInfo::default());
  }

  #[test]
  fn test_store_failures_degrade_to_misses() {
    let reg = CacheRegistry::new(Arc::new(FailingStore), CacheNames::new("mw", "v1"));

    reg.open_all();
    reg.store_stamped(Bucket::Api, "https://a/api/quote", &Response::new(200, "q"));
    assert!(reg.lookup(Bucket::Api, "https://a/api/quote").is_none());
    assert!(!reg.purge(Bucket::Static));
    reg.clear();
    assert!(reg.prune_stale().is_empty());
    assert_eq!(reg.info(), CacheInfo::default());
  }
}
