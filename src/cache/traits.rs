//! Core traits and types for the bucket store.

use color_eyre::Result;

use crate::http::Response;

/// Trait for cache storage backends.
///
/// A backend holds any number of named buckets, each mapping a request key
/// to a stored response. Writes to the same key are last-write-wins.
pub trait CacheStore: Send + Sync {
  /// Create the bucket if it does not exist yet.
  fn open(&self, bucket: &str) -> Result<()>;

  /// Names of every existing bucket.
  fn names(&self) -> Result<Vec<String>>;

  /// Delete a bucket and all of its entries. Returns false if it did not exist.
  fn delete_bucket(&self, bucket: &str) -> Result<bool>;

  /// Look up a stored response.
  fn get(&self, bucket: &str, key: &str) -> Result<Option<Response>>;

  /// Store a response, creating the bucket if needed.
  fn put(&self, bucket: &str, key: &str, response: &Response) -> Result<()>;

  /// Remove a single entry. Returns false if it was not present.
  fn delete(&self, bucket: &str, key: &str) -> Result<bool>;

  /// All request keys stored in a bucket.
  fn keys(&self, bucket: &str) -> Result<Vec<String>>;

  /// Number of entries in a bucket; zero for a missing bucket.
  fn count(&self, bucket: &str) -> Result<usize>;
}

/// Resource class of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
  Static,
  Api,
  Images,
}

impl Bucket {
  pub const ALL: [Bucket; 3] = [Bucket::Static, Bucket::Api, Bucket::Images];

  pub fn suffix(&self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Api => "api",
      Self::Images => "images",
    }
  }
}

/// Version-suffixed bucket names for one worker generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  /// Namespace shared across versions, e.g. "marketwatch-"
  pub namespace: String,
  pub static_assets: String,
  pub api: String,
  pub images: String,
}

impl CacheNames {
  pub fn new(prefix: &str, version: &str) -> Self {
    let namespace = if prefix.is_empty() {
      String::new()
    } else {
      format!("{}-", prefix)
    };
    let name = |bucket: Bucket| format!("{}{}-{}", namespace, version, bucket.suffix());

    Self {
      static_assets: name(Bucket::Static),
      api: name(Bucket::Api),
      images: name(Bucket::Images),
      namespace,
    }
  }

  pub fn get(&self, bucket: Bucket) -> &str {
    match bucket {
      Bucket::Static => &self.static_assets,
      Bucket::Api => &self.api,
      Bucket::Images => &self.images,
    }
  }

  /// Whether `name` is one of this generation's buckets.
  pub fn is_current(&self, name: &str) -> bool {
    Bucket::ALL.iter().any(|b| self.get(*b) == name)
  }

  /// Whether `name` belongs to this system's namespace, for any version.
  pub fn owns(&self, name: &str) -> bool {
    if !name.starts_with(&self.namespace) {
      return false;
    }
    Bucket::ALL
      .iter()
      .any(|b| name.ends_with(&format!("-{}", b.suffix())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_names_follow_version() {
    let names = CacheNames::new("mw", "v2");
    assert_eq!(names.static_assets, "mw-v2-static");
    assert_eq!(names.api, "mw-v2-api");
    assert_eq!(names.images, "mw-v2-images");
  }

  #[test]
  fn test_empty_prefix() {
    let names = CacheNames::new("", "v1");
    assert_eq!(names.get(Bucket::Static), "v1-static");
    assert!(names.owns("v0-static"));
  }

  #[test]
  fn test_ownership() {
    let names = CacheNames::new("mw", "v1");
    assert!(names.is_current("mw-v1-api"));
    assert!(!names.is_current("mw-v0-api"));
    assert!(names.owns("mw-v0-api"));
    assert!(!names.owns("other-v1-api"));
    assert!(!names.owns("mw-user-settings"));
  }
}
