//! Application configuration.
//!
//! A layered TOML file: `config.toml` in the current directory, then an
//! OS config dir, then a dotfile in `$HOME`, then built-in defaults. Holds
//! only process-wide settings — server bind/CORS, logging, rate-limit and
//! pool-concurrency defaults, and the metadata-provider base URL/API key.
//! Per-session storage credentials are never part of this file; they
//! arrive at runtime via `connect_source`/`connect_target` and live only
//! in `SessionState`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub metadata: MetadataConfig,

    pub storage: StorageConfig,

    pub observability: ObservabilityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            metadata: MetadataConfig::default(),
            storage: StorageConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Process-wide settings not tied to any one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,

    /// Extra worker threads beyond Tokio's default; 0 lets Tokio choose.
    pub worker_threads: usize,

    #[serde(default)]
    pub suppress_connection_errors: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            worker_threads: 0,
            suppress_connection_errors: false,
        }
    }
}

/// Web API bind address, CORS policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub bind: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0".to_string(),
            port: 8787,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Connection defaults for the `MetadataProvider` collaborator. Its base
/// URL and API key are config-layer concerns, not session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub base_url: String,

    pub api_key: String,

    pub request_timeout_seconds: u32,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: String::new(),
            request_timeout_seconds: 30,
        }
    }
}

/// Rate-limit and pool-concurrency defaults for the Storage Client and
/// Materializer. Per-session `scan_delay_s`/`upload_delay_s` overrides in
/// `UserConfig` take precedence when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Minimum inter-request interval enforced by each client's rate gate,
    /// in seconds. Default 0 means no enforced wait.
    pub min_request_interval_s: f64,

    /// Upload pool concurrency.
    pub upload_concurrency: usize,

    /// Directory refresh pool concurrency.
    pub refresh_concurrency: usize,

    /// Minimum idle keep-alive connections reqwest should hold per host.
    pub min_idle_connections_per_host: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            min_request_interval_s: 0.0,
            upload_concurrency: crate::constants::pools::UPLOAD_CONCURRENCY,
            refresh_concurrency: crate::constants::pools::REFRESH_CONCURRENCY,
            min_idle_connections_per_host: crate::constants::storage::MIN_IDLE_CONNECTIONS_PER_HOST,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub metrics_port: Option<u16>,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "mediatree".to_string());

        Self {
            metrics_enabled: true,
            metrics_port: None,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::default_config_path();
        self.save_to_path(&path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("mediatree").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".mediatree").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.enabled && self.server.port == 0 {
            anyhow::bail!("server.port must be nonzero when the server is enabled");
        }

        if self.storage.upload_concurrency == 0 {
            anyhow::bail!("storage.upload_concurrency must be > 0");
        }

        if self.storage.refresh_concurrency == 0 {
            anyhow::bail!("storage.refresh_concurrency must be > 0");
        }

        if self.observability.loki_enabled && self.observability.loki_url.is_empty() {
            anyhow::bail!("observability.loki_url cannot be empty when Loki is enabled");
        }

        Ok(())
    }
}
