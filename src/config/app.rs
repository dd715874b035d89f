//! Main application configuration
//!
//! Configuration comes from defaults, then a TOML file or environment
//! variables, then command line overrides applied by the binary. Elo and
//! matchmaking constants are deliberately absent: only the random seed and
//! the default ranking size can be tuned.

use crate::error::{BattleError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub storage: StorageSettings,
    pub server: ServerSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Where ratings and the match log live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Lost on exit, useful for trying things out
    Memory,
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = BattleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(BattleError::ConfigurationError {
                message: format!("Unknown storage backend: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// SQLite database file
    pub database_path: PathBuf,
}

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Fixed seed for reproducible pairings, entropy when absent
    pub seed: Option<u64>,
    /// Ranking size when the caller does not ask for one
    pub ranking_limit: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "song-battle".to_string(),
            log_level: "info".to_string(),
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_path: default_database_path(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            seed: None,
            ranking_limit: 50,
        }
    }
}

/// `~/.songbattle/songbattle.db`, or the working directory without a home
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".songbattle"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("songbattle.db")
}

fn invalid(message: String) -> anyhow::Error {
    BattleError::ConfigurationError { message }.into()
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Service settings
        if let Some(name) = lookup("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.service.log_level = log_level;
        }

        // Storage settings
        if let Some(backend) = lookup("STORAGE_BACKEND") {
            config.storage.backend = backend.parse()?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            config.storage.database_path = PathBuf::from(path);
        }

        // Server settings
        if let Some(host) = lookup("HTTP_HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("HTTP_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| invalid(format!("Invalid HTTP_PORT value: {}", port)))?;
        }

        // Matchmaking settings
        if let Some(seed) = lookup("MATCHMAKER_SEED") {
            config.matchmaking.seed = Some(
                seed.parse()
                    .map_err(|_| invalid(format!("Invalid MATCHMAKER_SEED value: {}", seed)))?,
            );
        }
        if let Some(limit) = lookup("RANKING_LIMIT") {
            config.matchmaking.ranking_limit = limit
                .parse()
                .map_err(|_| invalid(format!("Invalid RANKING_LIMIT value: {}", limit)))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).map_err(|e| invalid(format!("Invalid TOML: {}", e)))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// `host:port` for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(invalid(format!("Invalid log level: {}", config.service.log_level))),
    }

    if config.service.name.is_empty() {
        return Err(invalid("Service name cannot be empty".to_string()));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(invalid("Shutdown timeout must be greater than 0".to_string()));
    }

    if config.storage.backend == StorageBackend::Sqlite
        && config.storage.database_path.as_os_str().is_empty()
    {
        return Err(invalid("Database path cannot be empty".to_string()));
    }

    if config.server.host.is_empty() {
        return Err(invalid("HTTP host cannot be empty".to_string()));
    }
    if config.server.port == 0 {
        return Err(invalid("HTTP port cannot be 0".to_string()));
    }

    if config.matchmaking.ranking_limit == 0 {
        return Err(invalid("Ranking limit must be greater than 0".to_string()));
    }

    Ok(())
}
