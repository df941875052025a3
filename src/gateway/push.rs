//! Push notifications: payload parsing, display and click routing.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::clients::Clients;
use crate::config::NotificationDefaults;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  /// Page opened or focused when the notification is clicked
  pub url: String,
}

/// Normalized structure used to display a push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDescriptor {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub require_interaction: bool,
  pub actions: Vec<NotificationAction>,
  pub data: NotificationData,
}

impl NotificationDescriptor {
  /// The template every push starts from.
  pub fn from_defaults(defaults: &NotificationDefaults) -> Self {
    Self {
      title: defaults.title.clone(),
      body: defaults.body.clone(),
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      tag: defaults.tag.clone(),
      require_interaction: false,
      actions: vec![
        NotificationAction {
          action: "view".to_string(),
          title: "View".to_string(),
          icon: None,
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: "Dismiss".to_string(),
          icon: None,
        },
      ],
      data: NotificationData {
        url: defaults.url.clone(),
      },
    }
  }

  /// Build the descriptor for an inbound push.
  ///
  /// JSON object payloads override the defaults field by field; a field with
  /// the wrong type is skipped. Anything that is not a JSON object becomes the
  /// body verbatim.
  pub fn from_push(defaults: &NotificationDefaults, payload: Option<&[u8]>) -> Self {
    let mut descriptor = Self::from_defaults(defaults);
    let Some(raw) = payload else {
      return descriptor;
    };

    let text = String::from_utf8_lossy(raw);
    match serde_json::from_str::<Value>(&text) {
      Ok(Value::Object(fields)) => descriptor.merge(&fields),
      Ok(_) => descriptor.body = text.into_owned(),
      Err(e) => {
        debug!(error = %e, "push payload is not JSON, using it as the body");
        descriptor.body = text.into_owned();
      }
    }
    descriptor
  }

  fn merge(&mut self, fields: &Map<String, Value>) {
    let text = |name: &str| match fields.get(name) {
      Some(Value::String(s)) => Some(s.clone()),
      Some(other) => {
        debug!(field = name, value = %other, "ignoring push field of the wrong type");
        None
      }
      None => None,
    };

    if let Some(title) = text("title") {
      self.title = title;
    }
    if let Some(body) = text("body") {
      self.body = body;
    }
    if let Some(icon) = text("icon") {
      self.icon = icon;
    }
    if let Some(badge) = text("badge") {
      self.badge = badge;
    }
    if let Some(tag) = text("tag") {
      self.tag = tag;
    }
    match fields.get("requireInteraction") {
      Some(Value::Bool(require)) => self.require_interaction = *require,
      Some(other) => debug!(value = %other, "ignoring non-boolean requireInteraction"),
      None => {}
    }
    if let Some(actions) = fields.get("actions").and_then(parse_actions) {
      self.actions = actions;
    }

    let data_url = match fields.get("data").and_then(|d| d.get("url")) {
      Some(Value::String(url)) => Some(url.clone()),
      _ => None,
    };
    if let Some(url) = data_url.or_else(|| text("url")) {
      self.data.url = url;
    }
  }
}

/// Well-formed entries of an `actions` array.
///
/// An empty array clears the actions; an array with no usable entry is ignored.
fn parse_actions(value: &Value) -> Option<Vec<NotificationAction>> {
  let items = value.as_array()?;
  let actions: Vec<NotificationAction> = items
    .iter()
    .filter_map(|item| serde_json::from_value(item.clone()).ok())
    .collect();

  if actions.is_empty() && !items.is_empty() {
    debug!("no usable notification actions in push payload");
    return None;
  }
  Some(actions)
}

/// A notification currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShownNotification {
  pub id: u64,
  pub descriptor: NotificationDescriptor,
}

/// Notifications displayed by this worker.
///
/// Showing a notification whose tag is already on screen replaces it.
#[derive(Debug, Default)]
pub struct NotificationCenter {
  next_id: AtomicU64,
  shown: Mutex<Vec<ShownNotification>>,
}

impl NotificationCenter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn show(&self, descriptor: NotificationDescriptor) -> Result<u64> {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
    let mut shown = self.shown.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    shown.retain(|n| n.descriptor.tag != descriptor.tag);
    info!(id, title = descriptor.title.as_str(), "showing notification");
    shown.push(ShownNotification { id, descriptor });
    Ok(id)
  }

  pub fn get(&self, id: u64) -> Option<ShownNotification> {
    self
      .shown
      .lock()
      .ok()
      .and_then(|shown| shown.iter().find(|n| n.id == id).cloned())
  }

  pub fn close(&self, id: u64) -> Option<ShownNotification> {
    let mut shown = self.shown.lock().ok()?;
    let index = shown.iter().position(|n| n.id == id)?;
    Some(shown.remove(index))
  }

  pub fn active(&self) -> Vec<ShownNotification> {
    self.shown.lock().map(|s| s.clone()).unwrap_or_default()
  }
}

/// What a notification click resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// The notification was only closed
  Closed,
  /// An open page was focused and sent to the target URL
  Focused { client_id: String, url: Url },
  /// No page was open, so a new one was opened
  Opened { client_id: String, url: Url },
}

/// Route a click on `descriptor`.
///
/// "dismiss" (and any action other than "view") only closes. The default
/// action and "view" reuse a page inside `scope` or open a new one.
pub async fn route_click(
  clients: &Clients,
  scope: &Url,
  descriptor: &NotificationDescriptor,
  action: Option<&str>,
) -> Result<ClickOutcome> {
  match action {
    None | Some("") | Some("view") => {}
    Some(other) => {
      debug!(action = other, "notification action closes only");
      return Ok(ClickOutcome::Closed);
    }
  }

  let target = scope
    .join(&descriptor.data.url)
    .map_err(|e| eyre!("Invalid notification URL '{}': {}", descriptor.data.url, e))?;

  let existing = clients
    .match_all(true)
    .await
    .into_iter()
    .find(|c| c.url.as_str().starts_with(scope.as_str()));

  match existing {
    Some(client) => {
      clients.focus(&client.id).await?;
      clients.navigate(&client.id, target.clone()).await?;
      Ok(ClickOutcome::Focused {
        client_id: client.id,
        url: target,
      })
    }
    None => {
      let client = clients.open_window(target.clone()).await;
      Ok(ClickOutcome::Opened {
        client_id: client.id,
        url: target,
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::sync::mpsc;

  fn defaults() -> NotificationDefaults {
    NotificationDefaults::default()
  }

  #[test]
  fn test_text_payload_becomes_body() {
    let payload = b"Price alert: AAPL +5%";
    let descriptor = NotificationDescriptor::from_push(&defaults(), Some(payload.as_slice()));

    let mut expected = NotificationDescriptor::from_defaults(&defaults());
    expected.body = "Price alert: AAPL +5%".to_string();
    assert_eq!(descriptor, expected);
  }

  #[test]
  fn test_json_payload_overrides_fields() {
    let payload = br#"{
      "title": "AAPL",
      "body": "Crossed $200",
      "requireInteraction": true,
      "data": { "url": "/stocks/AAPL", "alertId": 7 }
    }"#;
    let descriptor = NotificationDescriptor::from_push(&defaults(), Some(payload.as_slice()));
    let base = NotificationDescriptor::from_defaults(&defaults());

    assert_eq!(descriptor.title, "AAPL");
    assert_eq!(descriptor.body, "Crossed $200");
    assert!(descriptor.require_interaction);
    assert_eq!(descriptor.data.url, "/stocks/AAPL");
    assert_eq!(descriptor.icon, base.icon);
    assert_eq!(descriptor.tag, base.tag);
    assert_eq!(descriptor.actions, base.actions);
  }

  #[test]
  fn test_wrong_typed_fields_are_skipped() {
    let payload = br#"{
      "title": "AAPL",
      "body": "Crossed $200",
      "requireInteraction": "true",
      "icon": 7,
      "data": { "url": 42 },
      "url": "/alerts"
    }"#;
    let descriptor = NotificationDescriptor::from_push(&defaults(), Some(payload.as_slice()));
    let base = NotificationDescriptor::from_defaults(&defaults());

    assert_eq!(descriptor.title, "AAPL");
    assert_eq!(descriptor.body, "Crossed $200");
    assert!(!descriptor.require_interaction);
    assert_eq!(descriptor.icon, base.icon);
    assert_eq!(descriptor.data.url, "/alerts");
  }

  #[test]
  fn test_malformed_actions_keep_valid_entries() {
    let payload = br#"{
      "title": "AAPL",
      "actions": [{ "action": "view" }, { "action": "mute", "title": "Mute" }]
    }"#;
    let descriptor = NotificationDescriptor::from_push(&defaults(), Some(payload.as_slice()));
    assert_eq!(descriptor.title, "AAPL");
    assert_eq!(
      descriptor.actions,
      vec![NotificationAction {
        action: "mute".to_string(),
        title: "Mute".to_string(),
        icon: None,
      }]
    );

    let payload = br#"{"title":"AAPL","actions":[{"action":"view"}]}"#;
    let descriptor = NotificationDescriptor::from_push(&defaults(), Some(payload.as_slice()));
    assert_eq!(descriptor.title, "AAPL");
    assert_eq!(
      descriptor.actions,
      NotificationDescriptor::from_defaults(&defaults()).actions
    );
  }

  #[test]
  fn test_json_scalar_is_treated_as_text() {
    let descriptor = NotificationDescriptor::from_push(&defaults(), Some(b"42".as_slice()));
    assert_eq!(descriptor.body, "42");
  }

  #[test]
  fn test_no_payload_uses_defaults() {
    assert_eq!(
      NotificationDescriptor::from_push(&defaults(), None),
      NotificationDescriptor::from_defaults(&defaults())
    );
  }

  #[test]
  fn test_center_replaces_same_tag() {
    let center = NotificationCenter::new();
    let first = center.show(NotificationDescriptor::from_defaults(&defaults())).unwrap();
    let second = center.show(NotificationDescriptor::from_defaults(&defaults())).unwrap();

    assert_ne!(first, second);
    assert_eq!(center.active().len(), 1);
    assert!(center.get(first).is_none());
    assert!(center.close(second).is_some());
    assert!(center.active().is_empty());
  }

  #[tokio::test]
  async fn test_click_focuses_page_in_scope() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    let scope = Url::parse("https://app.example/").unwrap();
    clients.connect(Url::parse("https://elsewhere.example/").unwrap()).await;
    let page = clients.connect(Url::parse("https://app.example/dashboard").unwrap()).await;

    let mut descriptor = NotificationDescriptor::from_defaults(&defaults());
    descriptor.data.url = "/stocks/MSFT".to_string();

    let outcome = route_click(&clients, &scope, &descriptor, Some("view")).await.unwrap();

    let expected_url = Url::parse("https://app.example/stocks/MSFT").unwrap();
    assert_eq!(
      outcome,
      ClickOutcome::Focused {
        client_id: page.id.clone(),
        url: expected_url.clone()
      }
    );
    let page = clients.get(&page.id).await.unwrap();
    assert!(page.focused);
    assert_eq!(page.url, expected_url);
  }

  #[tokio::test]
  async fn test_click_opens_window_without_page() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    let scope = Url::parse("https://app.example/").unwrap();
    let descriptor = NotificationDescriptor::from_defaults(&defaults());

    let outcome = route_click(&clients, &scope, &descriptor, None).await.unwrap();

    assert!(matches!(outcome, ClickOutcome::Opened { .. }));
    assert_eq!(clients.match_all(true).await.len(), 1);
  }

  #[tokio::test]
  async fn test_dismiss_only_closes() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    let scope = Url::parse("https://app.example/").unwrap();
    let descriptor = NotificationDescriptor::from_defaults(&defaults());

    let outcome = route_click(&clients, &scope, &descriptor, Some("dismiss")).await.unwrap();

    assert_eq!(outcome, ClickOutcome::Closed);
    assert!(clients.match_all(true).await.is_empty());
  }
}
