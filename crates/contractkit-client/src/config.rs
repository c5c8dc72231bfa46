//! CLI configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/contractkit/config.toml` by default:
//!
//! ```toml
//! debug = false
//!
//! [server]
//! base_url = "http://127.0.0.1:3000"
//! timeout = 5
//!
//! [headers]
//! authorization = "1234567890"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};
use crate::options::ClientOptions;

/// Configuration for the contractkit CLI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Server/connection settings.
    pub server: ServerSettings,

    /// Header values sent with every call.
    pub headers: BTreeMap<String, String>,
}

/// Server/connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Server root, including any base path.
    pub base_url: String,

    /// Request timeout in seconds; 0 disables it.
    pub timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout: 5,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if the file
    /// does not exist.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| ClientError::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("contractkit")
    }

    /// Client options for these settings.
    pub fn to_options(&self) -> ClientResult<ClientOptions> {
        let mut options = ClientOptions::new(&self.server.base_url)?;
        if self.server.timeout > 0 {
            options = options.with_timeout(Duration::from_secs(self.server.timeout));
        }
        for (name, value) in &self.headers {
            options = options.with_default_header(name, Value::String(value.clone()));
        }
        Ok(options)
    }
}
