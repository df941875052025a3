//! Bucket storage for offline support.
//!
//! This module provides:
//! - A `CacheStore` backend trait with in-memory and SQLite implementations
//! - Version-scoped bucket naming (`<prefix>-<version>-static|api|images`)
//! - A `CacheRegistry` that stamps writes with `sw-cached-at` and judges freshness

mod registry;
mod storage;
mod traits;

pub use registry::{cached_at, is_fresh, CacheInfo, CacheRegistry, CACHED_AT_HEADER};
pub use storage::{MemoryStore, SqliteStore};
pub use traits::{Bucket, CacheNames, CacheStore};
