//! Elo rating system
//!
//! This module provides the pure Elo arithmetic and the engine that applies
//! duel outcomes to stored ratings.

pub mod elo;
pub mod engine;

// Re-export commonly used items
pub use elo::{compute_duel, expected_score, k_factor, new_rating};
pub use engine::RatingEngine;
