//! Next-pair selection
//!
//! The matchmaker reloads the pool on every call, decides between exploration
//! and balanced pairing, then walks the matching strategy chain until a
//! strategy produces a pair.

use crate::error::{BattleError, Result};
use crate::matchmaking::strategy::{
    find_best_opponent, is_underplayed, strategy_chain, MatchMode, ACCEPTABLE_ELO_RANGE,
    EXPLORATION_RATE,
};
use crate::storage::BattleStore;
use crate::types::{ItemId, MatchQuality, MatchmakingStats, RankedItem};
use crate::utils::rating_difference;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Distinct recent opponents excluded by [`Matchmaker::avoid_recent_opponent`]
const RECENT_OPPONENT_WINDOW: usize = 3;

/// A pair ready to be shown to the user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposal {
    pub left: RankedItem,
    pub right: RankedItem,
    pub mode: MatchMode,
    pub quality: MatchQuality,
}

/// Chooses which two items battle next
pub struct Matchmaker {
    store: Arc<dyn BattleStore>,
    rng: Mutex<StdRng>,
}

impl Matchmaker {
    /// Matchmaker with an entropy-seeded random source
    pub fn new(store: Arc<dyn BattleStore>) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Matchmaker whose choices are reproducible for a given seed and store
    pub fn with_seed(store: Arc<dyn BattleStore>, seed: u64) -> Self {
        Self {
            store,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn rng(&self) -> Result<MutexGuard<'_, StdRng>> {
        self.rng.lock().map_err(|_| {
            BattleError::StoreFailure {
                message: "Failed to acquire matchmaker random source".to_string(),
            }
            .into()
        })
    }

    /// Pick the next pair to battle
    ///
    /// Fails with `InsufficientData` when fewer than two items exist.
    pub fn next_match(&self) -> Result<MatchProposal> {
        let pool = self.store.list_ranked_items()?;
        if pool.len() < 2 {
            return Err(BattleError::InsufficientData {
                available: pool.len(),
            }
            .into());
        }

        let mut rng = self.rng()?;
        let explore = should_explore(&pool, &mut rng);

        for strategy in strategy_chain(explore) {
            if let Some((left, right)) = strategy.select(&pool, &mut rng) {
                let quality = self.match_quality(&left, &right);
                debug!(
                    "Proposed {} vs {} via {} ({})",
                    left.id(),
                    right.id(),
                    strategy.mode(),
                    quality
                );
                return Ok(MatchProposal {
                    left,
                    right,
                    mode: strategy.mode(),
                    quality,
                });
            }
        }

        // Unreachable with two or more items: the random strategy always pairs
        Err(BattleError::InsufficientData {
            available: pool.len(),
        }
        .into())
    }

    /// Best opponent for `target` among `candidates`, see [`find_best_opponent`]
    pub fn find_best_opponent<'a>(
        &self,
        target: &RankedItem,
        candidates: &'a [RankedItem],
    ) -> Option<&'a RankedItem> {
        find_best_opponent(target, candidates)
    }

    /// Descriptive label for a pairing. Has no effect on selection.
    pub fn match_quality(&self, left: &RankedItem, right: &RankedItem) -> MatchQuality {
        if is_underplayed(left) || is_underplayed(right) {
            return MatchQuality::Exploration;
        }

        match rating_difference(left.elo(), right.elo()) {
            diff if diff <= 25 => MatchQuality::Perfect,
            diff if diff <= 50 => MatchQuality::Excellent,
            diff if diff <= ACCEPTABLE_ELO_RANGE => MatchQuality::Good,
            diff if diff <= 200 => MatchQuality::Average,
            _ => MatchQuality::Unbalanced,
        }
    }

    /// Up to `limit` distinct opponents of `item_id`, most recent first
    pub fn recent_opponents(&self, item_id: ItemId, limit: usize) -> Result<Vec<ItemId>> {
        let mut opponents = Vec::new();
        if limit == 0 {
            return Ok(opponents);
        }

        let mut seen = HashSet::new();
        for record in self.store.list_match_history(usize::MAX)? {
            let Some(opponent) = record.opponent_of(item_id) else {
                continue;
            };
            if seen.insert(opponent) {
                opponents.push(opponent);
                if opponents.len() >= limit {
                    break;
                }
            }
        }

        Ok(opponents)
    }

    /// Like [`Matchmaker::find_best_opponent`], but skips `target`'s last
    /// three distinct opponents unless that leaves nobody
    pub fn avoid_recent_opponent(
        &self,
        target: &RankedItem,
        candidates: &[RankedItem],
    ) -> Result<Option<RankedItem>> {
        let recent: HashSet<ItemId> = self
            .recent_opponents(target.id(), RECENT_OPPONENT_WINDOW)?
            .into_iter()
            .collect();

        let filtered: Vec<RankedItem> = candidates
            .iter()
            .filter(|candidate| candidate.id() != target.id() && !recent.contains(&candidate.id()))
            .cloned()
            .collect();

        let pool = if filtered.is_empty() { candidates } else { &filtered[..] };
        Ok(find_best_opponent(target, pool).cloned())
    }

    /// Snapshot of the current pool
    pub fn stats(&self) -> Result<MatchmakingStats> {
        let pool = self.store.list_ranked_items()?;
        let underplayed_items = pool.iter().filter(|item| is_underplayed(item)).count();

        Ok(MatchmakingStats {
            total_items: pool.len(),
            underplayed_items,
            experienced_items: pool.len() - underplayed_items,
            exploration_rate: EXPLORATION_RATE,
            elo_range: ACCEPTABLE_ELO_RANGE,
        })
    }
}

/// Exploration is forced while underplayed items are a strict majority,
/// otherwise it happens at [`EXPLORATION_RATE`]
fn should_explore(pool: &[RankedItem], rng: &mut StdRng) -> bool {
    let underplayed = pool.iter().filter(|item| is_underplayed(item)).count();
    if underplayed * 2 > pool.len() {
        return true;
    }
    rng.gen::<f64>() < EXPLORATION_RATE
}
