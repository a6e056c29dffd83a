// Configuration module - YAML config loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::CacheConfig;
use crate::error::ProxyError;

/// Top-level proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub access_log: AccessLogConfig,
}

/// Listener settings and the proxy's visible name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name advertised in x-cache/via diagnostic headers.
    /// Defaults to the machine hostname.
    #[serde(default = "default_proxy_name")]
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            name: default_proxy_name(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_proxy_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "kagemusha".to_string())
}

/// Origin server the proxy fronts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub host: String,
    #[serde(default = "default_upstream_port")]
    pub port: u16,
    /// Connect/read/write timeout for origin requests.
    /// Absent means wait indefinitely (the historical behavior).
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_upstream_port() -> u16 {
    80
}

/// Access log sink settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessLogConfig {
    /// Append-mode log file. Absent disables the file sink; request records
    /// still go to the structured log.
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ProxyError::Config(format!("cannot read config file: {}", e)))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| ProxyError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast validation at startup
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.upstream.host.is_empty() {
            return Err(ProxyError::Config("upstream.host is required".to_string()));
        }
        if self.server.name.is_empty() {
            return Err(ProxyError::Config("server.name cannot be empty".to_string()));
        }
        self.cache.validate().map_err(ProxyError::Config)?;
        Ok(())
    }
}
