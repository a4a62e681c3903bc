use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Application origin; relative paths resolve against it
  pub origin: String,
  pub cache: CacheConfig,
  /// Assets pre-cached at install, in order. Paths or absolute URLs.
  pub static_assets: Vec<String>,
  /// Third-party origins whose requests are treated as static assets
  pub asset_origins: Vec<String>,
  /// Document served to offline navigations with no cached copy
  pub offline_page: String,
  /// Name of the deferred-sync task
  pub sync_tag: String,
  pub notification: NotificationConfig,
  /// SQLite file (default: $XDG_DATA_HOME/swcache/cache.db)
  pub database: Option<PathBuf>,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Prepended to partition names, e.g. "opendms-static-v1.0.0"
  pub prefix: String,
  pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Body used when a push arrives without a payload
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Opened when the "explore" action is clicked
  pub default_view: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Default filter directive; RUST_LOG takes precedence
  pub level: String,
  /// Write logs to a daily-rolling file instead of stderr
  pub log_file: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8000".to_string(),
      cache: CacheConfig::default(),
      static_assets: [
        "/",
        "/offline.html",
        "/static/css/app.css",
        "/static/manifest.json",
        "/static/icons/icon-192x192.png",
        "/static/icons/icon-512x512.png",
        "https://unpkg.com/htmx.org@1.9.0",
        "https://unpkg.com/hyperscript.org@0.9.8",
        "https://cdn.tailwindcss.com",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      asset_origins: vec![
        "https://unpkg.com".to_string(),
        "https://cdn.tailwindcss.com".to_string(),
      ],
      offline_page: "/offline.html".to_string(),
      sync_tag: "background-sync".to_string(),
      notification: NotificationConfig::default(),
      database: None,
      logging: LoggingConfig::default(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "opendms".to_string(),
      version: "1.0.0".to_string(),
    }
  }
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "OpenDMS".to_string(),
      default_body: "New notification from OpenDMS".to_string(),
      icon: "/static/icons/icon-192x192.png".to_string(),
      badge: "/static/icons/icon-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
      default_view: "/".to_string(),
    }
  }
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      log_file: None,
    }
  }
}

/// Partition names for the running version.
///
/// Built once from `Config` and shared read-only by the lifecycle manager and
/// the strategy engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_name: String,
  pub dynamic_name: String,
}

impl CacheNames {
  pub fn new(prefix: &str, version: &str) -> Self {
    let name = |role: &str| {
      if prefix.is_empty() {
        format!("{}-v{}", role, version)
      } else {
        format!("{}-{}-v{}", prefix, role, version)
      }
    };

    Self {
      static_name: name("static"),
      dynamic_name: name("dynamic"),
    }
  }

  /// Partitions that survive activation.
  pub fn current(&self) -> [&str; 2] {
    [&self.static_name, &self.dynamic_name]
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.current().contains(&name)
  }
}

/// Immutable settings for the request-handling core.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub origin: Url,
  pub names: CacheNames,
  pub static_assets: Vec<Url>,
  pub asset_origins: Vec<String>,
  pub offline_page: Url,
  pub sync_tag: String,
  pub notification: NotificationConfig,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
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
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Check the configuration and resolve it into worker settings.
  pub fn settings(&self) -> Result<WorkerSettings> {
    if self.cache.version.trim().is_empty() {
      return Err(eyre!("cache.version must not be empty"));
    }

    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))?;
    if !matches!(origin.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be http or https: {}", self.origin));
    }

    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid asset url '{}': {}", path, e))
    };

    let static_assets = self
      .static_assets
      .iter()
      .map(|a| resolve(a))
      .collect::<Result<Vec<_>>>()?;
    let offline_page = resolve(&self.offline_page)?;

    if !static_assets.contains(&offline_page) {
      tracing::warn!(
        offline_page = %offline_page,
        "offline page is not in static_assets; offline navigations will get the built-in page"
      );
    }

    let asset_origins = self
      .asset_origins
      .iter()
      .map(|o| {
        Url::parse(o)
          .map(|u| u.origin().ascii_serialization())
          .map_err(|e| eyre!("Invalid asset origin '{}': {}", o, e))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(WorkerSettings {
      names: CacheNames::new(&self.cache.prefix, &self.cache.version),
      origin,
      static_assets,
      asset_origins,
      offline_page,
      sync_tag: self.sync_tag.clone(),
      notification: self.notification.clone(),
    })
  }
}
