//! Configuration management for Ringmaster
//!
//! Options are resolved in precedence order: process environment, `.env`
//! file, JSON config file, built-in defaults. The API key is a secret and
//! never appears in debug output or snapshots.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};

/// Default constants used throughout the engine
pub mod defaults {
    /// Default per-tool execution timeout in seconds
    pub const TIMEOUT_SECONDS: u64 = 30;

    /// Default retry budget per tool invocation
    pub const MAX_RETRIES: u32 = 3;

    /// Default retry backoff base delay in seconds
    pub const RETRY_BASE_DELAY: f64 = 1.0;

    /// Default SSH pool capacity
    pub const CONNECTION_POOL_SIZE: usize = 5;

    /// Idle SSH connections are evicted after this many seconds
    pub const CONNECTION_TIMEOUT_SECONDS: u64 = 300;

    /// Deadline applied by the HTTP bridge per /execute request
    pub const HTTP_DEADLINE_SECONDS: u64 = 30;

    /// Approximate token budget for conversation history
    pub const HISTORY_TOKEN_BUDGET: usize = 8_000;

    /// Web search cache entries live this long
    pub const SEARCH_CACHE_SECONDS: u64 = 3_600;

    /// Minimum spacing between outbound web search requests
    pub const SEARCH_MIN_INTERVAL_MS: u64 = 1_000;

    /// Default model served by an OpenAI-compatible endpoint
    pub const MODEL_NAME: &str = "llama-3.1-8b-instruct";

    /// Default log level
    pub const LOG_LEVEL: &str = "info";
}

/// A string that redacts itself in debug output and snapshots.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying value, for building requests.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<unset>")
        } else {
            f.write_str("<redacted>")
        }
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model served by the LLM endpoint
    pub model_name: String,
    /// Base URL of the OpenAI-compatible endpoint
    pub api_base_url: String,
    /// API key for the LLM endpoint (secret)
    pub api_key: Secret,
    /// Remote host for the SSH-backed provider
    pub ssh_host: String,
    /// Remote username
    pub ssh_user: String,
    /// Path to the SSH private key
    pub ssh_key_path: Option<PathBuf>,
    /// Log level handed to the tracing subscriber
    pub log_level: String,
    /// Retry budget per tool invocation
    pub max_retries: u32,
    /// Per-tool execution timeout in seconds
    pub timeout_seconds: u64,
    /// SSH pool capacity
    pub connection_pool_size: usize,
    /// Idle SSH connection TTL in seconds
    pub connection_timeout_seconds: u64,
    /// Directories scanned for plugin manifests
    pub plugin_discovery_paths: Vec<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model_name: defaults::MODEL_NAME.to_string(),
            api_base_url: "http://localhost:8000/v1".to_string(),
            api_key: Secret::default(),
            ssh_host: String::new(),
            ssh_user: String::new(),
            ssh_key_path: None,
            log_level: defaults::LOG_LEVEL.to_string(),
            max_retries: defaults::MAX_RETRIES,
            timeout_seconds: defaults::TIMEOUT_SECONDS,
            connection_pool_size: defaults::CONNECTION_POOL_SIZE,
            connection_timeout_seconds: defaults::CONNECTION_TIMEOUT_SECONDS,
            plugin_discovery_paths: vec![
                PathBuf::from("demos/plugins"),
                PathBuf::from("plugins"),
            ],
        }
    }
}

impl AgentConfig {
    /// Load configuration with full precedence: env > .env > file > defaults.
    ///
    /// The `.env` file only populates process environment variables that are
    /// not already set, which gives the environment the higher precedence.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => {
                let local = PathBuf::from("ringmaster.json");
                if local.exists() {
                    Self::from_file(&local)?
                } else if let Some(user) = Self::default_config_path().filter(|p| p.exists()) {
                    Self::from_file(&user)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// User-level config location, e.g. `~/.config/ringmaster/config.json`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ringmaster").join("config.json"))
    }

    /// Load from a JSON config file, keeping defaults for absent fields.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Overlay recognized environment variables.
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("RINGMASTER_MODEL_NAME") {
            self.model_name = v;
        }
        if let Ok(v) = std::env::var("RINGMASTER_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Ok(v) = std::env::var("RINGMASTER_API_KEY") {
            self.api_key = Secret::new(v);
        }
        if let Ok(v) = std::env::var("RINGMASTER_SSH_HOST") {
            self.ssh_host = v;
        }
        if let Ok(v) = std::env::var("RINGMASTER_SSH_USER") {
            self.ssh_user = v;
        }
        if let Ok(v) = std::env::var("RINGMASTER_SSH_KEY_PATH") {
            self.ssh_key_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("RINGMASTER_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("RINGMASTER_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                self.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("RINGMASTER_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("RINGMASTER_CONNECTION_POOL_SIZE") {
            if let Ok(n) = v.parse() {
                self.connection_pool_size = n;
            }
        }
        if let Ok(v) = std::env::var("RINGMASTER_CONNECTION_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.connection_timeout_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("RINGMASTER_PLUGIN_PATHS") {
            self.plugin_discovery_paths = v
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_seconds == 0 {
            return Err(Error::Config("timeout_seconds must be positive".into()));
        }
        if let Some(path) = &self.ssh_key_path {
            if !self.ssh_host.is_empty() && !path.exists() {
                return Err(Error::Config(format!(
                    "SSH key file not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    /// Whether the remote provider can be brought up at all.
    pub fn remote_configured(&self) -> bool {
        !self.ssh_host.is_empty() && !self.ssh_user.is_empty() && self.ssh_key_path.is_some()
    }

    /// Structured view of the configuration with secrets masked.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "model_name": self.model_name,
            "api_base_url": self.api_base_url,
            "api_key": if self.api_key.is_empty() { "<unset>" } else { "<redacted>" },
            "ssh_host": self.ssh_host,
            "ssh_user": self.ssh_user,
            "ssh_key_path": self.ssh_key_path.as_ref().map(|p| p.display().to_string()),
            "log_level": self.log_level,
            "max_retries": self.max_retries,
            "timeout_seconds": self.timeout_seconds,
            "connection_pool_size": self.connection_pool_size,
            "connection_timeout_seconds": self.connection_timeout_seconds,
            "plugin_discovery_paths": self.plugin_discovery_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AgentConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.connection_pool_size, 5);
        assert_eq!(config.connection_timeout_seconds, 300);
        assert_eq!(config.plugin_discovery_paths.len(), 2);
    }

    #[test]
    fn secret_is_redacted() {
        let secret = Secret::new("sk-something");
        assert_eq!(format!("{:?}", secret), "<redacted>");
        assert_eq!(secret.expose(), "sk-something");

        let unset = Secret::default();
        assert_eq!(format!("{:?}", unset), "<unset>");
    }

    #[test]
    fn snapshot_masks_api_key() {
        let mut config = AgentConfig::default();
        config.api_key = Secret::new("sk-test");
        let snap = config.snapshot();
        assert_eq!(snap["api_key"], "<redacted>");
        assert!(!snap.to_string().contains("sk-test"));
    }

    #[test]
    fn file_overlay_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"model_name": "test-model", "max_retries": 5}"#).unwrap();

        let config = AgentConfig::from_file(&path).unwrap();
        assert_eq!(config.model_name, "test-model");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.timeout_seconds, defaults::TIMEOUT_SECONDS);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            AgentConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }
}
