//! Control protocol between application pages and the worker.
//!
//! Pages post `{type, payload?}` envelopes; the worker answers with tagged
//! `ClientMessage`s, broadcast to every controlled page unless noted.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

use crate::cache::CacheInfo;

/// Commands accepted from pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
  /// Activate a waiting worker generation immediately
  SkipWaiting,
  /// Purge the API bucket and tell pages an update is available
  CheckUpdate,
  /// Delete all three buckets
  ClearCache,
  /// Reply to the sender with per-bucket entry counts
  GetCacheInfo,
}

#[derive(Debug, Deserialize)]
struct Envelope {
  #[serde(rename = "type")]
  kind: String,
}

impl ControlMessage {
  pub fn parse(data: &serde_json::Value) -> Result<Self> {
    let envelope = Envelope::deserialize(data)
      .map_err(|e| eyre!("Malformed control message: {}", e))?;

    match envelope.kind.as_str() {
      "SKIP_WAITING" => Ok(Self::SkipWaiting),
      "CHECK_UPDATE" => Ok(Self::CheckUpdate),
      "CLEAR_CACHE" => Ok(Self::ClearCache),
      "GET_CACHE_INFO" => Ok(Self::GetCacheInfo),
      other => Err(eyre!("Unknown control message type: {}", other)),
    }
  }
}

/// Notifications posted from the worker to pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// A background sync fired; fresh data may be available
  SyncComplete { timestamp: i64 },
  /// Cached API data was purged on request
  UpdateAvailable { timestamp: i64 },
  /// Reply to GET_CACHE_INFO, sent to the requester only
  CacheInfo(CacheInfo),
  /// A stale entry was refreshed in the background
  BackgroundUpdate { url: String },
}

impl ClientMessage {
  pub fn to_json(&self) -> serde_json::Value {
    serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_parse_known_types() {
    assert_eq!(
      ControlMessage::parse(&json!({ "type": "SKIP_WAITING" })).unwrap(),
      ControlMessage::SkipWaiting
    );
    assert_eq!(
      ControlMessage::parse(&json!({ "type": "GET_CACHE_INFO", "payload": { "x": 1 } })).unwrap(),
      ControlMessage::GetCacheInfo
    );
  }

  #[test]
  fn test_parse_rejects_unknown_and_malformed() {
    assert!(ControlMessage::parse(&json!({ "type": "REBOOT" })).is_err());
    assert!(ControlMessage::parse(&json!({ "payload": 1 })).is_err());
    assert!(ControlMessage::parse(&json!("CLEAR_CACHE")).is_err());
  }

  #[test]
  fn test_client_message_wire_format() {
    let info = ClientMessage::CacheInfo(CacheInfo {
      static_assets: 3,
      api: 1,
      images: 0,
    });
    assert_eq!(
      info.to_json(),
      json!({ "type": "CACHE_INFO", "static": 3, "api": 1, "images": 0 })
    );
    assert_eq!(
      ClientMessage::BackgroundUpdate {
        url: "https://a/api/q".to_string()
      }
      .to_json(),
      json!({ "type": "BACKGROUND_UPDATE", "url": "https://a/api/q" })
    );
    assert_eq!(
      ClientMessage::SyncComplete { timestamp: 5 }.to_json(),
      json!({ "type": "SYNC_COMPLETE", "timestamp": 5 })
    );
  }
}
