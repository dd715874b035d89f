//! Error types for the song battle engine
//!
//! All fallible operations return `anyhow::Result`. The typed `BattleError`
//! variants cover the failure kinds a caller must be able to tell apart;
//! anything else (SQLite, I/O, serialization) is an opaque store failure.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific rating and matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    #[error("No rating record for item {item_id}")]
    ItemNotFound { item_id: i64 },

    #[error("Invalid duel outcome: {reason}")]
    InvalidOutcome { reason: String },

    #[error("Need at least 2 rated items for a duel, found {available}")]
    InsufficientData { available: usize },

    #[error("Store failure: {message}")]
    StoreFailure { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },
}

/// Coarse classification used by presentation layers to pick a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidOutcome,
    InsufficientData,
    StoreFailure,
    Configuration,
}

impl BattleError {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            BattleError::ItemNotFound { .. } => ErrorKind::NotFound,
            BattleError::InvalidOutcome { .. } => ErrorKind::InvalidOutcome,
            BattleError::InsufficientData { .. } => ErrorKind::InsufficientData,
            BattleError::StoreFailure { .. } => ErrorKind::StoreFailure,
            BattleError::ConfigurationError { .. } => ErrorKind::Configuration,
        }
    }

    /// Classify an arbitrary error. Errors that did not originate as a
    /// `BattleError` came from the storage collaborator.
    pub fn kind_of(error: &anyhow::Error) -> ErrorKind {
        error
            .downcast_ref::<BattleError>()
            .map(BattleError::kind)
            .unwrap_or(ErrorKind::StoreFailure)
    }
}
