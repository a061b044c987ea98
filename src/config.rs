use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that replaces `api.base_url`.
pub const BASE_URL_ENV: &str = "FEEDSYNC_API_BASE_URL";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiConfig {
  /// Root of the feed API, e.g. http://localhost:8080/api/v1
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Transport timeout per request, in seconds
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:8080/api/v1".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CacheConfig {
  /// Idle entries kept before least-recently-used ones are evicted
  #[serde(default = "default_capacity")]
  pub capacity: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      capacity: default_capacity(),
    }
  }
}

fn default_capacity() -> usize {
  64
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LogConfig {
  /// Filter directive used when RUST_LOG is unset
  #[serde(default = "default_level")]
  pub level: String,
  /// Log to stderr instead of the daily file
  #[serde(default)]
  pub stderr: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: default_level(),
      stderr: false,
    }
  }
}

fn default_level() -> String {
  "info".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./feedsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/feedsync/config.yaml
  ///
  /// Without a file every field takes its default. `FEEDSYNC_API_BASE_URL`
  /// overrides the base URL either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_env(std::env::var(BASE_URL_ENV).ok());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("feedsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("feedsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  fn apply_env(&mut self, base_url: Option<String>) {
    if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
      self.api.base_url = url;
    }
  }

  /// Directory for log files: $XDG_DATA_HOME/feedsync/logs
  pub fn log_dir() -> PathBuf {
    dirs::data_dir()
      .unwrap_or_else(std::env::temp_dir)
      .join("feedsync")
      .join("logs")
  }
}
