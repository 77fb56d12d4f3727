use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HomeCloudError, Result};

pub const GIB: u64 = 1024 * 1024 * 1024;
pub const MIN_QUOTA_GB: u64 = 1;
pub const MAX_QUOTA_GB: u64 = 1000;
pub const DEFAULT_HARD_LIMIT_BYTES: u64 = 1000 * GIB;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1 << 30;
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_AUTH_TOKEN: &str = "123";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub watcher: WatcherConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory every client path is confined to.
    pub root: PathBuf,
    /// Advisory quota shown to clients, in GB.
    pub quota_gb: u64,
    /// Absolute ceiling enforced before an upload is accepted.
    pub hard_limit_bytes: u64,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatcherConfig {
    pub debounce_ms: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig::default(),
            auth: AuthConfig {
                token: DEFAULT_AUTH_TOKEN.to_string(),
            },
            watcher: WatcherConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "text".to_string(),
            },
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            quota_gb: 50,
            hard_limit_bytes: DEFAULT_HARD_LIMIT_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            sweep_interval_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file, then let the environment override it
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        dotenvy::dotenv().ok();

        let content = tokio::fs::read_to_string(path).await?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("WATCH_DIR") {
            if !dir.is_empty() {
                self.storage.root = PathBuf::from(dir);
            }
        }
        if let Ok(token) = std::env::var("AUTH_TOKEN") {
            if !token.is_empty() {
                self.auth.token = token;
            }
        }
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port.parse().unwrap_or(self.server.port);
        }
        if let Ok(quota) = std::env::var("STORAGE_QUOTA_GB") {
            if let Ok(quota) = quota.trim().parse::<u64>() {
                self.storage.quota_gb = quota.clamp(MIN_QUOTA_GB, MAX_QUOTA_GB);
            }
        }
        if let Ok(size) = std::env::var("MAX_UPLOAD_SIZE") {
            if let Ok(size) = size.trim().parse() {
                self.storage.max_upload_bytes = size;
            }
        }
        if let Ok(limit) = std::env::var("HARD_LIMIT_BYTES") {
            if let Ok(limit) = limit.trim().parse() {
                self.storage.hard_limit_bytes = limit;
            }
        }
        if let Ok(ms) = std::env::var("DEBOUNCE_MS") {
            if let Ok(ms) = ms.trim().parse() {
                self.watcher.debounce_ms = ms;
            }
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.token.is_empty() {
            return Err(HomeCloudError::config("Auth token must not be empty"));
        }

        if self.auth.token == DEFAULT_AUTH_TOKEN {
            tracing::warn!("Auth token is still the default value, set AUTH_TOKEN");
        }

        if self.server.port == 0 {
            return Err(HomeCloudError::config("Server port cannot be 0"));
        }

        if !(MIN_QUOTA_GB..=MAX_QUOTA_GB).contains(&self.storage.quota_gb) {
            return Err(HomeCloudError::config(format!(
                "Storage quota must be between {MIN_QUOTA_GB} and {MAX_QUOTA_GB} GB"
            )));
        }

        if self.storage.max_upload_bytes == 0 {
            return Err(HomeCloudError::config("Maximum upload size cannot be 0"));
        }

        if self.watcher.debounce_ms == 0 {
            return Err(HomeCloudError::config("Debounce window cannot be 0"));
        }

        Ok(())
    }
}
