//! Configuration management for the song battle service
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values.

pub mod app;

// Re-export commonly used types
pub use app::{
    default_database_path, validate_config, AppConfig, MatchmakingSettings, ServerSettings,
    ServiceSettings, StorageBackend, StorageSettings,
};
