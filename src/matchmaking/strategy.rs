//! Pairing strategies
//!
//! Each strategy either produces a pair from the pool or declines. The
//! matchmaker walks an ordered chain of strategies and takes the first pair
//! offered, which keeps every fallback step testable on its own.

use crate::types::RankedItem;
use crate::utils::{rating_difference, ratings_within_tolerance};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Items with fewer battles than this are underplayed
pub const UNDERPLAYED_THRESHOLD: u32 = 5;

/// Chance of an exploration match when the pool is mostly experienced
pub const EXPLORATION_RATE: f64 = 0.15;

/// Largest rating gap that still counts as a balanced pairing
pub const ACCEPTABLE_ELO_RANGE: i32 = 100;

/// Which strategy produced a pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exploration,
    Balanced,
    Random,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Exploration => "exploration",
            MatchMode::Balanced => "balanced",
            MatchMode::Random => "random",
        }
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// True if the item has not yet left the underplayed bucket
pub fn is_underplayed(item: &RankedItem) -> bool {
    item.total_battles() < UNDERPLAYED_THRESHOLD
}

/// One step of the selection chain
pub trait PairingStrategy: Send + Sync {
    /// Mode reported for pairs this strategy produces
    fn mode(&self) -> MatchMode;

    /// Choose a (left, right) pair of distinct items, or decline
    fn select(&self, pool: &[RankedItem], rng: &mut StdRng) -> Option<(RankedItem, RankedItem)>;
}

/// Underplayed item against anyone
#[derive(Debug, Default)]
pub struct ExplorationStrategy;

impl PairingStrategy for ExplorationStrategy {
    fn mode(&self) -> MatchMode {
        MatchMode::Exploration
    }

    fn select(&self, pool: &[RankedItem], rng: &mut StdRng) -> Option<(RankedItem, RankedItem)> {
        let underplayed: Vec<&RankedItem> = pool.iter().filter(|item| is_underplayed(item)).collect();
        if underplayed.is_empty() {
            return None;
        }

        let left = underplayed[rng.gen_range(0..underplayed.len())];
        let others: Vec<&RankedItem> = pool.iter().filter(|item| item.id() != left.id()).collect();
        if others.is_empty() {
            return None;
        }

        let right = others[rng.gen_range(0..others.len())];
        Some((left.clone(), right.clone()))
    }
}

/// Random experienced item against its closest-rated experienced peer
#[derive(Debug, Default)]
pub struct BalancedStrategy;

impl PairingStrategy for BalancedStrategy {
    fn mode(&self) -> MatchMode {
        MatchMode::Balanced
    }

    fn select(&self, pool: &[RankedItem], rng: &mut StdRng) -> Option<(RankedItem, RankedItem)> {
        let experienced: Vec<RankedItem> = pool.iter().filter(|item| !is_underplayed(item)).cloned().collect();
        if experienced.len() < 2 {
            return None;
        }

        let left = &experienced[rng.gen_range(0..experienced.len())];
        let right = find_best_opponent(left, &experienced)?;
        Some((left.clone(), right.clone()))
    }
}

/// Any two distinct items
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl PairingStrategy for RandomStrategy {
    fn mode(&self) -> MatchMode {
        MatchMode::Random
    }

    fn select(&self, pool: &[RankedItem], rng: &mut StdRng) -> Option<(RankedItem, RankedItem)> {
        if pool.len() < 2 {
            return None;
        }

        let left = rng.gen_range(0..pool.len());
        let mut right = rng.gen_range(0..pool.len());
        while right == left {
            right = rng.gen_range(0..pool.len());
        }

        Some((pool[left].clone(), pool[right].clone()))
    }
}

/// Strategies to try, in order, for the given mode decision
pub fn strategy_chain(explore: bool) -> Vec<Box<dyn PairingStrategy>> {
    if explore {
        vec![
            Box::new(ExplorationStrategy),
            Box::new(BalancedStrategy),
            Box::new(RandomStrategy),
        ]
    } else {
        vec![Box::new(BalancedStrategy), Box::new(RandomStrategy)]
    }
}

/// Closest-rated candidate other than `target`
///
/// Candidates within [`ACCEPTABLE_ELO_RANGE`] are preferred; if none are in
/// range the globally closest one is taken. Equal gaps go to the lowest id.
pub fn find_best_opponent<'a>(target: &RankedItem, candidates: &'a [RankedItem]) -> Option<&'a RankedItem> {
    let closest = |within_range: bool| {
        candidates
            .iter()
            .filter(|candidate| candidate.id() != target.id())
            .filter(|candidate| {
                !within_range
                    || ratings_within_tolerance(candidate.elo(), target.elo(), ACCEPTABLE_ELO_RANGE)
            })
            .map(|candidate| (rating_difference(candidate.elo(), target.elo()), candidate))
            .min_by_key(|(diff, candidate)| (*diff, candidate.id()))
            .map(|(_, candidate)| candidate)
    };

    closest(true).or_else(|| closest(false))
}
