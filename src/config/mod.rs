// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for bucketwatch

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::location::Location;

/// Environment variable that overrides the listening port
pub const PORT_ENV: &str = "PORT";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Remote bucket settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local image cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Poll loop timing
    #[serde(default)]
    pub poller: PollerConfig,

    /// Recency window and seen-set sizing
    #[serde(default)]
    pub recency: RecencyConfig,

    /// Desktop alerts
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Last-known location source
    #[serde(default)]
    pub location: LocationConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Base URL of the storage JSON API
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bucket name, e.g. `my-project.appspot.com`
    #[serde(default)]
    pub bucket: String,
    /// Only objects under this prefix are considered
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Only objects ending with this suffix are downloaded
    #[serde(default = "default_suffix")]
    pub suffix: String,
    /// Name of the environment variable holding an OAuth bearer token
    #[serde(default = "default_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PollerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecencyConfig {
    /// How many of the latest cached files are considered
    #[serde(default = "default_window")]
    pub window: usize,
    /// Maximum distance in minutes from the most recent file
    #[serde(default = "default_max_minutes")]
    pub max_minutes: i32,
    /// Bound on the shared seen-set; oldest entries are evicted first
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_title")]
    pub title: String,
    /// Sound file played on every download
    #[serde(default)]
    pub sound: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LocationConfig {
    /// Realtime database root, read as `{database_url}/{key}.json`
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_location_key")]
    pub key: String,
    /// Fixed coordinates used when no database is configured
    #[serde(default)]
    pub fixed: Option<Location>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

// Default value functions
fn default_endpoint() -> String { "https://storage.googleapis.com".to_string() }
fn default_prefix() -> String { "images/".to_string() }
fn default_suffix() -> String { ".jpg".to_string() }
fn default_token_env() -> String { "STORAGE_ACCESS_TOKEN".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_cache_dir() -> String { "downloaded_images".to_string() }
fn default_interval_ms() -> u64 { 5000 }
fn default_window() -> usize { 10 }
fn default_max_minutes() -> i32 { 2 }
fn default_seen_capacity() -> usize { 1024 }
fn default_true() -> bool { true }
fn default_title() -> String { "New image received".to_string() }
fn default_location_key() -> String { "location".to_string() }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 3003 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            bucket: String::new(),
            prefix: default_prefix(),
            suffix: default_suffix(),
            access_token_env: default_token_env(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { dir: default_cache_dir() }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_ms: default_interval_ms() }
    }
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            max_minutes: default_max_minutes(),
            seen_capacity: default_seen_capacity(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            title: default_title(),
            sound: None,
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            key: default_location_key(),
            fixed: None,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::BucketwatchError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.apply_port_override(std::env::var(PORT_ENV).ok().as_deref())
    }

    fn apply_port_override(&mut self, value: Option<&str>) -> crate::Result<()> {
        if let Some(raw) = value {
            self.web.port = raw.trim().parse().map_err(|_| {
                crate::BucketwatchError::Config(format!("{} is not a valid port: {:?}", PORT_ENV, raw))
            })?;
        }
        Ok(())
    }

    /// Reject settings the poll loop cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.storage.bucket.trim().is_empty() {
            return Err(crate::BucketwatchError::Config("storage.bucket must be set".to_string()));
        }
        if self.storage.suffix.is_empty() {
            return Err(crate::BucketwatchError::Config("storage.suffix must not be empty".to_string()));
        }
        if self.poller.interval_ms == 0 {
            return Err(crate::BucketwatchError::Config("poller.interval_ms must be positive".to_string()));
        }
        if self.recency.window == 0 || self.recency.seen_capacity == 0 {
            return Err(crate::BucketwatchError::Config(
                "recency.window and recency.seen_capacity must be positive".to_string(),
            ));
        }
        if self.recency.max_minutes < 0 {
            return Err(crate::BucketwatchError::Config("recency.max_minutes must not be negative".to_string()));
        }
        Ok(())
    }
}
