//! Configuration management for ssh-session-hub.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::{ApiDefaults, ServerConfig};
use crate::cli::Args;
use crate::connection::DEFAULT_PORT;
use crate::security::{ApiKeyStore, AuthConfig};
use crate::session::TypingPacer;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub security: SecuritySection,
    pub ssh: SshSection,
    pub shell: ShellSection,
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable graceful shutdown.
    pub graceful_shutdown: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3100,
            graceful_shutdown: true,
        }
    }
}

/// Security configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub auth: AuthSection,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Enable authentication.
    pub enabled: bool,
    /// API keys.
    pub api_keys: Vec<String>,
}

/// Outbound SSH defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSection {
    /// Port used when a connect request omits one.
    pub default_port: u16,
    /// TCP connect and handshake timeout.
    pub connect_timeout_secs: u64,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            connect_timeout_secs: 30,
        }
    }
}

/// Interactive shell defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub default_cols: u16,
    pub default_rows: u16,
    pub default_read_timeout_ms: u64,
    pub typing_min_delay_ms: u64,
    pub typing_max_delay_ms: u64,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            default_cols: 80,
            default_rows: 24,
            default_read_timeout_ms: 5000,
            typing_min_delay_ms: 50,
            typing_max_delay_ms: 150,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("SSH_HUB_HOST") {
            self.server.host = host;
        }

        if let Ok(port) = std::env::var("SSH_HUB_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Ok(key) = std::env::var("SSH_HUB_API_KEY") {
            self.add_api_key(key);
        }

        if let Ok(level) = std::env::var("SSH_HUB_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    ///
    /// Host and port only override when given on the command line.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(ref key) = args.api_key {
            self.add_api_key(key.clone());
        }

        if args.no_auth {
            self.security.auth.enabled = false;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    fn add_api_key(&mut self, key: String) {
        if key.is_empty() {
            return;
        }
        self.security.auth.enabled = true;
        if !self.security.auth.api_keys.contains(&key) {
            self.security.auth.api_keys.push(key);
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server
            .host
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        if self.shell.typing_min_delay_ms > self.shell.typing_max_delay_ms {
            return Err(ConfigError::InvalidTypingWindow {
                min: self.shell.typing_min_delay_ms,
                max: self.shell.typing_max_delay_ms,
            });
        }
        if self.ssh.default_port == 0 {
            return Err(ConfigError::InvalidValue("ssh.default_port", "0".to_string()));
        }
        Ok(())
    }

    /// Convert to ServerConfig for the API server.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        let mut server_config = ServerConfig::new(host.to_string(), self.server.port);
        if !self.server.graceful_shutdown {
            server_config = server_config.without_graceful_shutdown();
        }
        Ok(server_config)
    }

    /// Build the API key store for the `/api/v1` middleware.
    pub fn api_key_store(&self) -> ApiKeyStore {
        let store = ApiKeyStore::new(AuthConfig {
            enabled: self.security.auth.enabled,
            ..AuthConfig::default()
        });
        for key in &self.security.auth.api_keys {
            store.add_key(key.as_str());
        }
        store
    }

    /// Defaults applied to omitted request fields.
    pub fn api_defaults(&self) -> ApiDefaults {
        ApiDefaults {
            ssh_port: self.ssh.default_port,
            connect_timeout: Some(self.connect_timeout()),
            cols: self.shell.default_cols,
            rows: self.shell.default_rows,
            read_timeout: Duration::from_millis(self.shell.default_read_timeout_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.connect_timeout_secs)
    }

    pub fn typing_pacer(&self) -> TypingPacer {
        TypingPacer::new(
            Duration::from_millis(self.shell.typing_min_delay_ms),
            Duration::from_millis(self.shell.typing_max_delay_ms),
        )
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid host address: {0}")]
    InvalidHost(String),

    #[error("typing delay window is inverted: min {min}ms > max {max}ms")]
    InvalidTypingWindow { min: u64, max: u64 },

    #[error("invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
}
