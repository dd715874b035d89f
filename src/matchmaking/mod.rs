//! Matchmaking: which two items battle next
//!
//! Selection is a chain of pairing strategies (exploration, balanced,
//! random) driven by a seedable random source.

pub mod matchmaker;
pub mod strategy;

pub use matchmaker::{MatchProposal, Matchmaker};
pub use strategy::{
    find_best_opponent, MatchMode, PairingStrategy, ACCEPTABLE_ELO_RANGE, EXPLORATION_RATE,
    UNDERPLAYED_THRESHOLD,
};
