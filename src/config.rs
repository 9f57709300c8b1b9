//! TOML configuration for the coordinator.
//!
//! Only `[store]` is required. Every other section falls back to the
//! defaults below, which mirror what a fresh install ships with.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::Settings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub defaults: DefaultSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_ingest_path")]
    pub ingest_path: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_id: default_user_id(),
            ingest_path: default_ingest_path(),
            search_path: default_search_path(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_user_id() -> String {
    "local-user".to_string()
}
fn default_ingest_path() -> String {
    "/api/data".to_string()
}
fn default_search_path() -> String {
    "/api/data/user".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    /// Maximum characters of `content` kept in the local copy.
    #[serde(default = "default_content_cap")]
    pub content_cap: usize,
    #[serde(default = "default_load_delay_ms")]
    pub load_delay_ms: u64,
    #[serde(default = "default_internal_schemes")]
    pub internal_schemes: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            content_cap: default_content_cap(),
            load_delay_ms: default_load_delay_ms(),
            internal_schemes: default_internal_schemes(),
        }
    }
}

fn default_content_cap() -> usize {
    1000
}
fn default_load_delay_ms() -> u64 {
    1000
}
fn default_internal_schemes() -> Vec<String> {
    vec!["chrome://".to_string(), "chrome-extension://".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_results")]
    pub top_results: usize,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_results: default_top_results(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_top_results() -> usize {
    3
}
fn default_preview_chars() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Settings written on first install, before the UI ever sends any.
#[derive(Debug, Deserialize, Clone)]
pub struct DefaultSettings {
    #[serde(default = "default_max_history_items")]
    pub max_history_items: usize,
    #[serde(default = "default_true")]
    pub enable_auto_capture: bool,
    #[serde(default = "default_true")]
    pub use_server_storage: bool,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            max_history_items: default_max_history_items(),
            enable_auto_capture: true,
            use_server_storage: true,
        }
    }
}

impl DefaultSettings {
    pub fn to_settings(&self) -> Settings {
        Settings {
            max_history_items: self.max_history_items,
            enable_auto_capture: self.enable_auto_capture,
            use_server_storage: self.use_server_storage,
            server_url: None,
        }
    }
}

fn default_max_history_items() -> usize {
    100
}
fn default_true() -> bool {
    true
}

impl Config {
    /// A config with every section at its default, backed by `store_path`.
    pub fn with_store_path(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig {
                path: store_path.into(),
            },
            backend: BackendConfig::default(),
            capture: CaptureConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
            defaults: DefaultSettings::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.capture.content_cap == 0 {
        anyhow::bail!("capture.content_cap must be > 0");
    }

    if config.search.top_results == 0 {
        anyhow::bail!("search.top_results must be >= 1");
    }

    if config.defaults.max_history_items == 0 {
        anyhow::bail!("defaults.max_history_items must be >= 1");
    }

    if !config.backend.base_url.starts_with("http://")
        && !config.backend.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "backend.base_url must be an http(s) URL, got '{}'",
            config.backend.base_url
        );
    }

    if config.capture.internal_schemes.iter().any(|s| s.is_empty()) {
        anyhow::bail!("capture.internal_schemes must not contain empty entries");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str("[store]\npath = \"/tmp/recall.sqlite\"\n").unwrap();
        assert_eq!(config.capture.content_cap, 1000);
        assert_eq!(config.capture.load_delay_ms, 1000);
        assert_eq!(config.search.top_results, 3);
        assert_eq!(config.search.preview_chars, 150);
        assert_eq!(config.defaults.max_history_items, 100);
        assert!(config.defaults.enable_auto_capture);
        assert!(config.defaults.use_server_storage);
        assert_eq!(
            config.capture.internal_schemes,
            vec!["chrome://", "chrome-extension://"]
        );
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_zero_history_bound() {
        let config: Config = toml::from_str(
            "[store]\npath = \"x.sqlite\"\n[defaults]\nmax_history_items = 0\n",
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("max_history_items"));
    }

    #[test]
    fn test_rejects_non_http_backend() {
        let config: Config = toml::from_str(
            "[store]\npath = \"x.sqlite\"\n[backend]\nbase_url = \"ftp://nope\"\n",
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("recall.toml");
        std::fs::write(
            &path,
            "[store]\npath = \"data/recall.sqlite\"\n\n[server]\nbind = \"0.0.0.0:9000\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.store.path, PathBuf::from("data/recall.sqlite"));
    }
}
