//! Song Battle - pairwise Elo ranking for a personal music collection
//!
//! This crate provides the rating engine (Elo with tiered K-factors), the
//! matchmaker that picks the next pair to battle, storage backends, catalog
//! import, playlist export and an HTTP service around them.

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod matchmaking;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{BattleError, ErrorKind, Result};
pub use types::*;

// Re-export key components
pub use matchmaking::{MatchMode, MatchProposal, Matchmaker};
pub use rating::RatingEngine;
pub use storage::{BattleStore, InMemoryBattleStore, SqliteBattleStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
