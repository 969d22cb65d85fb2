use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// API server base URL (e.g., "https://10.0.0.1:6443")
  pub server: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub store: StoreConfig,
  /// Per-request timeout for the API server, in milliseconds
  #[serde(default = "default_request_timeout_ms")]
  pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Key prefix for structured entries. Must be unique per server; derived
  /// from the server address when unset.
  pub prefix: Option<String>,
  /// Lifetime of structured entries in the store
  #[serde(default = "default_ttl_secs")]
  pub ttl_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: None,
      ttl_secs: default_ttl_secs(),
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_secs)
  }
}

/// Connection parameters for the Redis store.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// `host:port`
  #[serde(default = "default_store_address")]
  pub address: String,
  /// Logical database number
  #[serde(default)]
  pub db: i64,
  pub username: Option<String>,
  #[serde(default = "default_connect_timeout_ms")]
  pub connect_timeout_ms: u64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      address: default_store_address(),
      db: 0,
      username: None,
      connect_timeout_ms: default_connect_timeout_ms(),
    }
  }
}

impl StoreConfig {
  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }

  /// Get the store password from environment variables.
  ///
  /// Checks DISCACHE_STORE_PASSWORD first, then REDIS_PASSWORD as fallback.
  pub fn password(&self) -> Option<String> {
    std::env::var("DISCACHE_STORE_PASSWORD")
      .or_else(|_| std::env::var("REDIS_PASSWORD"))
      .ok()
      .filter(|p| !p.is_empty())
  }
}

fn default_ttl_secs() -> u64 {
  600
}

fn default_store_address() -> String {
  "127.0.0.1:6379".to_string()
}

fn default_connect_timeout_ms() -> u64 {
  2000
}

fn default_request_timeout_ms() -> u64 {
  30_000
}

impl Config {
  /// Configuration for `server` with every other setting at its default.
  pub fn for_server(server: impl Into<String>) -> Self {
    Self {
      server: server.into(),
      cache: CacheConfig::default(),
      store: StoreConfig::default(),
      request_timeout_ms: default_request_timeout_ms(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./discache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/discache/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/discache/config.yaml \
         or pass --server."
      )),
    }
  }

  /// Like `load`, but `None` when no file exists and none was asked for.
  pub fn load_optional(explicit_path: Option<&Path>) -> Result<Option<Self>> {
    if explicit_path.is_none() && Self::find_config_file().is_none() {
      return Ok(None);
    }
    Self::load(explicit_path).map(Some)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("discache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("discache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  pub fn server_url(&self) -> Result<Url, url::ParseError> {
    Url::parse(&self.server)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_millis(self.request_timeout_ms)
  }
}
