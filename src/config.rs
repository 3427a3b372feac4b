use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::{CachePolicy, StaticAssetSet, StoreKind, StoreName};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the notes server, e.g. "https://notes.example"
  pub url: String,
  /// API namespace under the origin
  #[serde(default = "default_api_prefix")]
  pub api_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Version token of the static store; bump it to invalidate the shell
  /// cache on the next activation
  #[serde(default = "default_version")]
  pub static_version: String,
  /// Version token of the API store; bump it to invalidate cached API
  /// responses on the next activation
  #[serde(default = "default_version")]
  pub api_version: String,
  /// Shell resources that must stay servable offline
  #[serde(default)]
  pub static_assets: StaticAssetSet,
  /// Override for where the cache database and logs live
  #[serde(default)]
  pub data_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      static_version: default_version(),
      api_version: default_version(),
      static_assets: StaticAssetSet::default(),
      data_dir: None,
    }
  }
}

fn default_api_prefix() -> String {
  "/api".to_string()
}

fn default_version() -> String {
  "v1".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offnote.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offnote/config.yaml
  /// 4. ~/.config/offnote/config.yaml
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
        "No configuration file found. Create one at ~/.config/offnote/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offnote.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offnote").join("config.yaml");
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
    Ok(config)
  }

  /// The server origin as a parsed URL.
  pub fn origin(&self) -> Result<Url> {
    Url::parse(&self.server.url)
      .map_err(|e| eyre!("Invalid server url '{}': {}", self.server.url, e))
  }

  /// Routing facts for the cache layer, derived from this configuration.
  pub fn cache_policy(&self) -> Result<CachePolicy> {
    Ok(CachePolicy {
      origin: self.origin()?,
      api_prefix: self.server.api_prefix.clone(),
      assets: self.cache.static_assets.clone(),
      static_store: StoreName::new(StoreKind::Static, self.cache.static_version.clone()),
      api_store: StoreName::new(StoreKind::Api, self.cache.api_version.clone()),
    })
  }

  /// Where the cache database and logs live.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.cache.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offnote"))
  }

  /// Get the API bearer token from environment variables.
  ///
  /// Checks OFFNOTE_TOKEN first, then NOTES_API_TOKEN as fallback. Absent
  /// tokens are fine: requests simply go out unauthenticated.
  pub fn api_token() -> Option<String> {
    std::env::var("OFFNOTE_TOKEN")
      .or_else(|_| std::env::var("NOTES_API_TOKEN"))
      .ok()
  }
}
