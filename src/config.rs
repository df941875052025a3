use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheNames;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Namespace prefix shared by every bucket this worker owns
  pub prefix: String,
  /// Deployed version; changing it renames the buckets and triggers cleanup
  pub version: String,
  /// Origin used to resolve relative asset paths and URLs typed on the command line
  pub origin: String,
  /// Worker scope; pages under it are considered ours when routing notification clicks
  pub scope: String,
  /// Route served from cache when a navigation misses both network and its own cache entry
  pub app_shell: String,
  /// Assets pre-cached on install
  pub core_assets: Vec<String>,
  /// Path prefixes routed to the API lane
  pub api_prefixes: Vec<String>,
  pub ttl: TtlConfig,
  pub network: NetworkConfig,
  /// Default notification template, overridden field-by-field by push payloads
  pub notification: NotificationDefaults,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
  pub api_secs: u64,
  pub images_secs: u64,
}

impl Default for TtlConfig {
  fn default() -> Self {
    Self {
      api_secs: 5 * 60,
      images_secs: 30 * 24 * 60 * 60,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self { timeout_secs: 15 }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub url: String,
}

impl Default for NotificationDefaults {
  fn default() -> Self {
    Self {
      title: "MarketWatch".to_string(),
      body: "New market update available".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/badge-72x72.png".to_string(),
      tag: "marketwatch-notification".to_string(),
      url: "/".to_string(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      prefix: "marketwatch".to_string(),
      version: "v1".to_string(),
      origin: "http://localhost:8080/".to_string(),
      scope: "http://localhost:8080/".to_string(),
      app_shell: "/".to_string(),
      core_assets: [
        "/",
        "/index.html",
        "/offline.html",
        "/css/styles.css",
        "/js/app.js",
        "/js/charts.js",
        "/manifest.json",
        "/icons/icon-192x192.png",
        "/icons/icon-512x512.png",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      api_prefixes: vec!["/api/".to_string()],
      ttl: TtlConfig::default(),
      network: NetworkConfig::default(),
      notification: NotificationDefaults::default(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./marketwatch-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/marketwatch-sw/config.yaml
  ///
  /// Falls back to the built-in defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("marketwatch-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("marketwatch-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    config.origin_url()?;
    Url::parse(&config.scope).map_err(|e| eyre!("Invalid scope '{}': {}", config.scope, e))?;
    Ok(config)
  }

  pub fn cache_names(&self) -> CacheNames {
    CacheNames::new(&self.prefix, &self.version)
  }

  pub fn api_ttl(&self) -> Duration {
    Duration::from_secs(self.ttl.api_secs)
  }

  pub fn image_ttl(&self) -> Duration {
    Duration::from_secs(self.ttl.images_secs)
  }

  pub fn network_timeout(&self) -> Duration {
    Duration::from_secs(self.network.timeout_secs)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a path or absolute URL against the configured origin.
  pub fn resolve(&self, path_or_url: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path_or_url)
      .map_err(|e| eyre!("Invalid URL '{}': {}", path_or_url, e))
  }

  /// Directory for the persistent cache database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("marketwatch-sw"))
  }
}
