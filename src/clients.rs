//! Clients API: the application pages this worker can see and message.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use url::Url;

use crate::control::ClientMessage;

/// A message posted to one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
  pub client_id: String,
  pub message: ClientMessage,
}

/// An open application page.
#[derive(Debug, Clone)]
pub struct Client {
  pub id: String,
  pub url: Url,
  pub focused: bool,
  /// Whether this worker generation serves the page's requests
  pub controlled: bool,
}

/// Registry of open pages plus the outbound postMessage channel.
pub struct Clients {
  clients: RwLock<HashMap<String, Client>>,
  tx: mpsc::UnboundedSender<Delivery>,
}

impl Clients {
  pub fn new(tx: mpsc::UnboundedSender<Delivery>) -> Self {
    Self {
      clients: RwLock::new(HashMap::new()),
      tx,
    }
  }

  /// Register a page that was opened by the user. It stays uncontrolled until claimed.
  pub async fn connect(&self, url: Url) -> Client {
    let client = Client {
      id: next_client_id(),
      url,
      focused: false,
      controlled: false,
    };
    self
      .clients
      .write()
      .await
      .insert(client.id.clone(), client.clone());
    client
  }

  pub async fn disconnect(&self, id: &str) -> Option<Client> {
    self.clients.write().await.remove(id)
  }

  pub async fn get(&self, id: &str) -> Option<Client> {
    self.clients.read().await.get(id).cloned()
  }

  /// All pages, or only controlled ones.
  pub async fn match_all(&self, include_uncontrolled: bool) -> Vec<Client> {
    let mut clients: Vec<Client> = self
      .clients
      .read()
      .await
      .values()
      .filter(|c| include_uncontrolled || c.controlled)
      .cloned()
      .collect();
    clients.sort_by(|a, b| a.id.cmp(&b.id));
    clients
  }

  /// Take control of every open page. Returns how many were newly claimed.
  pub async fn claim(&self) -> usize {
    let mut clients = self.clients.write().await;
    let mut claimed = 0;
    for client in clients.values_mut().filter(|c| !c.controlled) {
      client.controlled = true;
      claimed += 1;
    }
    claimed
  }

  pub async fn focus(&self, id: &str) -> Result<()> {
    let mut clients = self.clients.write().await;
    for client in clients.values_mut() {
      client.focused = client.id == id;
    }
    if clients.contains_key(id) {
      Ok(())
    } else {
      Err(eyre!("Client not found: {}", id))
    }
  }

  pub async fn navigate(&self, id: &str, url: Url) -> Result<()> {
    let mut clients = self.clients.write().await;
    let client = clients
      .get_mut(id)
      .ok_or_else(|| eyre!("Client not found: {}", id))?;
    debug!(client = id, url = %url, "navigating client");
    client.url = url;
    Ok(())
  }

  /// Open a new focused page controlled by this worker.
  pub async fn open_window(&self, url: Url) -> Client {
    let mut clients = self.clients.write().await;
    for client in clients.values_mut() {
      client.focused = false;
    }
    let client = Client {
      id: next_client_id(),
      url,
      focused: true,
      controlled: true,
    };
    clients.insert(client.id.clone(), client.clone());
    client
  }

  /// Post a message to one page.
  pub fn post_message(&self, client_id: &str, message: ClientMessage) {
    let delivery = Delivery {
      client_id: client_id.to_string(),
      message,
    };
    // Ignore send errors - nobody is listening for page messages
    let _ = self.tx.send(delivery);
  }

  /// Post a message to every controlled page. Returns the number of recipients.
  pub async fn broadcast(&self, message: ClientMessage) -> usize {
    let clients = self.match_all(false).await;
    for client in &clients {
      self.post_message(&client.id, message.clone());
    }
    clients.len()
  }
}

fn next_client_id() -> String {
  static COUNTER: AtomicU64 = AtomicU64::new(1);
  format!("client-{:04}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[tokio::test]
  async fn test_claim_and_broadcast() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    let a = clients.connect(url("https://app.example/")).await;
    let b = clients.connect(url("https://app.example/watchlist")).await;

    assert_eq!(clients.broadcast(ClientMessage::UpdateAvailable { timestamp: 1 }).await, 0);
    assert_eq!(clients.claim().await, 2);
    assert_eq!(clients.claim().await, 0);
    assert_eq!(clients.broadcast(ClientMessage::UpdateAvailable { timestamp: 1 }).await, 2);

    let mut recipients = vec![rx.try_recv().unwrap().client_id, rx.try_recv().unwrap().client_id];
    recipients.sort();
    let mut expected = vec![a.id, b.id];
    expected.sort();
    assert_eq!(recipients, expected);
  }

  #[tokio::test]
  async fn test_focus_and_navigate() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    let a = clients.connect(url("https://app.example/")).await;

    clients.focus(&a.id).await.unwrap();
    clients
      .navigate(&a.id, url("https://app.example/alerts/42"))
      .await
      .unwrap();

    let a = clients.get(&a.id).await.unwrap();
    assert!(a.focused);
    assert_eq!(a.url.path(), "/alerts/42");
    assert!(clients.focus("client-missing").await.is_err());
  }

  #[tokio::test]
  async fn test_open_window_is_focused_and_controlled() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    let existing = clients.connect(url("https://app.example/")).await;
    clients.focus(&existing.id).await.unwrap();

    let opened = clients.open_window(url("https://app.example/news")).await;

    assert!(opened.focused && opened.controlled);
    assert!(!clients.get(&existing.id).await.unwrap().focused);
    assert_eq!(clients.match_all(true).await.len(), 2);
  }

  #[tokio::test]
  async fn test_disconnected_page_gets_no_broadcast() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let clients = Clients::new(tx);
    let gone = clients.connect(url("https://app.example/")).await;
    let kept = clients.connect(url("https://app.example/news")).await;
    clients.claim().await;

    assert!(clients.disconnect(&gone.id).await.is_some());
    assert!(clients.disconnect(&gone.id).await.is_none());
    assert_eq!(clients.broadcast(ClientMessage::UpdateAvailable { timestamp: 2 }).await, 1);

    assert_eq!(rx.try_recv().unwrap().client_id, kept.id);
    assert!(rx.try_recv().is_err());
  }
}
