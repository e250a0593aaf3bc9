// src/config.rs

//! Manages server configuration: loading, env-overriding, and validation.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    7878
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_config_store_directory() -> String {
    "livecfg_data".to_string()
}
fn default_notify_channel() -> String {
    "rtc_config".to_string()
}
fn default_max_connection() -> usize {
    1024
}
fn default_http_port() -> u16 {
    8878
}

/// `STORE_TYPE`: which `StorageBackend` implementation the server constructs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    JsonFile,
    Redis,
    Mongodb,
}

/// Configuration for the admin HTTP surface: Prometheus `/metrics` plus the
/// `/rtc/api/...` admin routes, served from a single `axum` router.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_enabled() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            port: default_http_port(),
        }
    }
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    store_type: StoreType,
    #[serde(default = "default_config_store_directory")]
    config_store_directory: String,
    #[serde(default)]
    redis_url: Option<String>,
    #[serde(default)]
    mongodb_url: Option<String>,
    #[serde(default = "default_notify_channel")]
    notify_channel: String,
    #[serde(default = "default_max_connection")]
    max_connection: usize,
    #[serde(default)]
    open_client_auth_token: bool,
    #[serde(default)]
    http: HttpConfig,
}

/// The final, validated server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub store_type: StoreType,
    pub config_store_directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mongodb_url: Option<String>,
    pub notify_channel: String,
    pub max_connection: usize,
    pub open_client_auth_token: bool,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            store_type: StoreType::default(),
            config_store_directory: default_config_store_directory(),
            redis_url: None,
            mongodb_url: None,
            notify_channel: default_notify_channel(),
            max_connection: default_max_connection(),
            open_client_auth_token: false,
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Reads and validates configuration from a TOML file, with `LIVECFG_`-
    /// prefixed environment variables (e.g. `LIVECFG_PORT`) layered on top of
    /// file values.
    pub fn from_file(path: &str) -> Result<Self> {
        let layered = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LIVECFG").separator("_"))
            .build()
            .map_err(|e| anyhow!("failed to build configuration layers: {e}"))?;

        let raw: RawConfig = layered
            .try_deserialize()
            .map_err(|e| anyhow!("failed to parse configuration from '{path}': {e}"))?;

        let config = Config {
            host: raw.host,
            port: raw.port,
            log_level: raw.log_level,
            store_type: raw.store_type,
            config_store_directory: raw.config_store_directory,
            redis_url: raw.redis_url,
            mongodb_url: raw.mongodb_url,
            notify_channel: raw.notify_channel,
            max_connection: raw.max_connection,
            open_client_auth_token: raw.open_client_auth_token,
            http: raw.http,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_connection == 0 {
            return Err(anyhow!("max_connection cannot be 0"));
        }
        match self.store_type {
            StoreType::Redis if self.redis_url.is_none() => {
                return Err(anyhow!("store_type = \"redis\" requires redis_url"));
            }
            StoreType::Mongodb if self.mongodb_url.is_none() => {
                return Err(anyhow!("store_type = \"mongodb\" requires mongodb_url"));
            }
            _ => {}
        }
        if self.http.enabled && self.http.port == 0 {
            return Err(anyhow!("http.port cannot be 0 when http is enabled"));
        }
        if self.http.enabled && self.http.port == self.port {
            return Err(anyhow!(
                "http.port cannot be the same as the subscribe channel port"
            ));
        }
        Ok(())
    }
}
