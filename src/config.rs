//! Server configuration.
//!
//! Configuration is read from an optional YAML file and then adjusted from
//! the environment:
//!
//! - `FERRY_CONFIG`: path of the YAML file to load
//! - `LISTEN`: overrides `server.listen_addr`
//!
//! ```yaml
//! server:
//!   listen_addr: "0.0.0.0:8080"
//!   max_request_bytes: 65536
//!   log_level: debug
//! app:
//!   greeting: "hello"
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerOptions,
    /// Free-form settings handed to the application handler untouched.
    pub app: serde_yaml::Mapping,
}

/// Options fixed for the lifetime of the process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    pub listen_addr: String,
    /// Upper bound on buffered request bytes (headers plus body).
    pub max_request_bytes: usize,
    pub log_level: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Same resolution as [`Config::load`] against an arbitrary variable lookup.
    pub fn load_with<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("FERRY_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(listen_addr) = lookup("LISTEN") {
            cfg.server.listen_addr = listen_addr;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Looks up a top-level key of the `app` section.
    pub fn app_value(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.app.get(key)
    }
}
