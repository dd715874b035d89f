//! Rating engine
//!
//! Turns resolved duel outcomes into new ratings and persists them through a
//! [`BattleStore`]. All arithmetic lives in [`crate::rating::elo`].

use crate::error::{BattleError, Result};
use crate::rating::elo::compute_duel;
use crate::storage::BattleStore;
use crate::types::{
    DuelPreview, DuelResult, EloStats, ItemId, MatchRecord, Outcome, RankedItem, Rating,
    RatingChange,
};
use crate::utils::current_timestamp;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Rating engine over a shared store
pub struct RatingEngine {
    store: Arc<dyn BattleStore>,
    /// Serializes outcome processing so the read-compute-write cycle of one
    /// duel never interleaves with another
    write_lock: Mutex<()>,
}

impl RatingEngine {
    pub fn new(store: Arc<dyn BattleStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Shared store handle
    pub fn store(&self) -> &Arc<dyn BattleStore> {
        &self.store
    }

    /// Apply one duel outcome and persist it
    ///
    /// Both ratings are read before anything is written, so a missing item
    /// fails the call without leaving a match record behind. Skips append a
    /// record with no winner and leave both ratings untouched.
    pub fn process_outcome(
        &self,
        left_id: ItemId,
        right_id: ItemId,
        outcome: Outcome,
    ) -> Result<DuelResult> {
        let _guard = self.write_lock.lock().map_err(|_| BattleError::StoreFailure {
            message: "Failed to acquire rating write lock".to_string(),
        })?;

        let (left, right) = self.load_pair(left_id, right_id)?;
        let (left_change, right_change) = compute_duel(&left, &right, outcome);

        let winner = match outcome {
            Outcome::LeftWins => Some(left_id),
            Outcome::RightWins => Some(right_id),
            Outcome::Draw | Outcome::Skip => None,
        };
        let record = MatchRecord::new(left_id, right_id, winner);

        let record = if outcome == Outcome::Skip {
            self.store.append_match_record(record)?
        } else {
            let now = current_timestamp();
            let updated_left = apply_change(left, &left_change, outcome, true, now);
            let updated_right = apply_change(right, &right_change, outcome, false, now);
            self.store
                .commit_duel(vec![updated_left, updated_right], record)?
        };

        info!(
            "Processed duel {} vs {} ({}): {} -> {}, {} -> {}",
            left_id,
            right_id,
            outcome,
            left_change.old_rating,
            left_change.new_rating,
            right_change.old_rating,
            right_change.new_rating
        );

        Ok(DuelResult {
            record,
            left: left_change,
            right: right_change,
        })
    }

    /// Rating movement `process_outcome` would produce, without writing
    pub fn simulate_outcome(
        &self,
        left_id: ItemId,
        right_id: ItemId,
        outcome: Outcome,
    ) -> Result<DuelPreview> {
        let (left, right) = self.load_pair(left_id, right_id)?;
        let (left_change, right_change) = compute_duel(&left, &right, outcome);

        debug!(
            "Simulated duel {} vs {} ({}): {:+} / {:+}",
            left_id, right_id, outcome, left_change.change, right_change.change
        );

        Ok(DuelPreview {
            left: left_change,
            right: right_change,
        })
    }

    /// Items ordered by rating (descending, ties by id), at most `limit`
    pub fn current_ranking(&self, limit: usize) -> Result<Vec<RankedItem>> {
        self.store.top_ranked_items(limit)
    }

    /// Collection-wide statistics. All zero for an empty store.
    pub fn stats(&self) -> Result<EloStats> {
        let ranked = self.store.list_ranked_items()?;
        let total_matches = self.store.match_count()?;

        if ranked.is_empty() {
            return Ok(EloStats {
                total_matches,
                ..EloStats::default()
            });
        }

        let sum: i64 = ranked.iter().map(|r| r.elo() as i64).sum();
        let min_rating = ranked.iter().map(RankedItem::elo).min().unwrap_or_default();
        let max_rating = ranked.iter().map(RankedItem::elo).max().unwrap_or_default();

        Ok(EloStats {
            total_items: ranked.len(),
            total_matches,
            average_rating: sum as f64 / ranked.len() as f64,
            min_rating,
            max_rating,
        })
    }

    fn load_pair(&self, left_id: ItemId, right_id: ItemId) -> Result<(Rating, Rating)> {
        if left_id == right_id {
            return Err(BattleError::InvalidOutcome {
                reason: format!("item {} cannot battle itself", left_id),
            }
            .into());
        }

        let left = self
            .store
            .get_rating(left_id)?
            .ok_or(BattleError::ItemNotFound { item_id: left_id })?;
        let right = self
            .store
            .get_rating(right_id)?
            .ok_or(BattleError::ItemNotFound { item_id: right_id })?;

        Ok((left, right))
    }
}

/// Fold a computed change and the matching counter into a rating row
fn apply_change(
    mut rating: Rating,
    change: &RatingChange,
    outcome: Outcome,
    is_left: bool,
    now: chrono::DateTime<chrono::Utc>,
) -> Rating {
    rating.rating = change.new_rating;
    match (outcome, is_left) {
        (Outcome::LeftWins, true) | (Outcome::RightWins, false) => rating.wins += 1,
        (Outcome::LeftWins, false) | (Outcome::RightWins, true) => rating.losses += 1,
        (Outcome::Draw, _) => rating.draws += 1,
        (Outcome::Skip, _) => {}
    }
    rating.last_updated = now;
    rating
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::{InMemoryBattleStore, MockBattleStore};
    use crate::types::NewItem;
    use proptest::prelude::*;

    fn engine_with_items(count: usize) -> RatingEngine {
        let store = InMemoryBattleStore::new();
        for i in 0..count {
            store
                .insert_item(NewItem::new(format!("ext-{}", i), format!("Song {}", i), "Artist"))
                .unwrap();
        }
        RatingEngine::new(Arc::new(store))
    }

    fn set_rating(engine: &RatingEngine, item_id: ItemId, rating: i32, wins: u32) {
        let mut row = engine.store().get_rating(item_id).unwrap().unwrap();
        row.rating = rating;
        row.wins = wins;
        engine.store().update_rating(row).unwrap();
    }

    #[test]
    fn test_left_wins_between_fresh_items() {
        let engine = engine_with_items(2);
        let result = engine.process_outcome(1, 2, Outcome::LeftWins).unwrap();

        assert_eq!(result.left.new_rating, 1216);
        assert_eq!(result.right.new_rating, 1184);
        assert_eq!(result.record.winner_item_id, Some(1));

        let left = engine.store().get_rating(1).unwrap().unwrap();
        let right = engine.store().get_rating(2).unwrap().unwrap();
        assert_eq!((left.rating, left.wins, left.losses), (1216, 1, 0));
        assert_eq!((right.rating, right.wins, right.losses), (1184, 0, 1));
    }

    #[test]
    fn test_right_wins_and_draw_counters() {
        let engine = engine_with_items(2);
        engine.process_outcome(1, 2, Outcome::RightWins).unwrap();
        engine.process_outcome(1, 2, Outcome::Draw).unwrap();

        let left = engine.store().get_rating(1).unwrap().unwrap();
        let right = engine.store().get_rating(2).unwrap().unwrap();
        assert_eq!((left.wins, left.losses, left.draws), (0, 1, 1));
        assert_eq!((right.wins, right.losses, right.draws), (1, 0, 1));
        assert_eq!(engine.store().match_count().unwrap(), 2);
    }

    #[test]
    fn test_skip_changes_nothing_but_the_log() {
        let engine = engine_with_items(2);
        set_rating(&engine, 1, 1310, 4);
        let before_left = engine.store().get_rating(1).unwrap().unwrap();
        let before_right = engine.store().get_rating(2).unwrap().unwrap();

        let result = engine.process_outcome(1, 2, Outcome::Skip).unwrap();
        assert_eq!(result.left.change, 0);
        assert_eq!(result.right.change, 0);
        assert_eq!(result.record.winner_item_id, None);

        assert_eq!(engine.store().get_rating(1).unwrap().unwrap(), before_left);
        assert_eq!(engine.store().get_rating(2).unwrap().unwrap(), before_right);
        assert_eq!(engine.store().match_count().unwrap(), 1);
    }

    #[test]
    fn test_missing_item_leaves_no_trace() {
        let engine = engine_with_items(1);

        let err = engine.process_outcome(1, 99, Outcome::LeftWins).unwrap_err();
        assert_eq!(BattleError::kind_of(&err), ErrorKind::NotFound);

        assert_eq!(engine.store().match_count().unwrap(), 0);
        assert_eq!(engine.store().get_rating(1).unwrap().unwrap().rating, 1200);
    }

    #[test]
    fn test_self_duel_rejected() {
        let engine = engine_with_items(2);
        let err = engine.process_outcome(2, 2, Outcome::Draw).unwrap_err();
        assert_eq!(BattleError::kind_of(&err), ErrorKind::InvalidOutcome);
        assert_eq!(engine.store().match_count().unwrap(), 0);
    }

    #[test]
    fn test_not_found_never_reaches_commit() {
        let mut store = MockBattleStore::new();
        store
            .expect_get_rating()
            .returning(|id| Ok(if id == 1 { Some(Rating::initial(1)) } else { None }));
        store.expect_commit_duel().never();
        store.expect_append_match_record().never();

        let engine = RatingEngine::new(Arc::new(store));
        let err = engine.process_outcome(1, 2, Outcome::LeftWins).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BattleError>(),
            Some(BattleError::ItemNotFound { item_id: 2 })
        ));
    }

    #[test]
    fn test_store_failure_passes_through() {
        let mut store = MockBattleStore::new();
        store
            .expect_get_rating()
            .returning(|id| Ok(Some(Rating::initial(id))));
        store
            .expect_commit_duel()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("disk full")));

        let engine = RatingEngine::new(Arc::new(store));
        let err = engine.process_outcome(1, 2, Outcome::Draw).unwrap_err();

        assert_eq!(err.to_string(), "disk full");
        assert_eq!(BattleError::kind_of(&err), ErrorKind::StoreFailure);
    }

    #[test]
    fn test_commit_receives_both_rows() {
        let mut store = MockBattleStore::new();
        store
            .expect_get_rating()
            .returning(|id| Ok(Some(Rating::initial(id))));
        store
            .expect_commit_duel()
            .withf(|ratings, record| {
                ratings.len() == 2
                    && ratings[0].rating == 1216
                    && ratings[1].rating == 1184
                    && record.winner_item_id == Some(1)
            })
            .times(1)
            .returning(|_, record| Ok(record));

        let engine = RatingEngine::new(Arc::new(store));
        engine.process_outcome(1, 2, Outcome::LeftWins).unwrap();
    }

    #[test]
    fn test_current_ranking_and_stats() {
        let engine = engine_with_items(3);
        assert_eq!(engine.stats().unwrap().average_rating, 1200.0);

        engine.process_outcome(3, 1, Outcome::LeftWins).unwrap();

        let ranking = engine.current_ranking(10).unwrap();
        let ids: Vec<_> = ranking.iter().map(RankedItem::id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(engine.current_ranking(1).unwrap().len(), 1);

        let stats = engine.stats().unwrap();
        assert_eq!(stats.total_items, 3);
        assert_eq!(stats.total_matches, 1);
        assert_eq!(stats.min_rating, 1184);
        assert_eq!(stats.max_rating, 1216);
        assert_eq!(stats.average_rating, 1200.0);
    }

    #[test]
    fn test_stats_on_empty_store() {
        let engine = engine_with_items(0);
        assert_eq!(engine.stats().unwrap(), EloStats::default());
    }

    proptest! {
        #[test]
        fn prop_simulate_matches_process(
            left_rating in 800i32..2000,
            right_rating in 800i32..2000,
            left_wins in 0u32..40,
            right_wins in 0u32..40,
            outcome_index in 0usize..4,
        ) {
            let outcome = [Outcome::LeftWins, Outcome::RightWins, Outcome::Draw, Outcome::Skip][outcome_index];
            let engine = engine_with_items(2);
            set_rating(&engine, 1, left_rating, left_wins);
            set_rating(&engine, 2, right_rating, right_wins);

            let preview = engine.simulate_outcome(1, 2, outcome).unwrap();
            prop_assert_eq!(engine.store().match_count().unwrap(), 0);

            let result = engine.process_outcome(1, 2, outcome).unwrap();
            prop_assert_eq!(preview.left, result.left);
            prop_assert_eq!(preview.right, result.right);
        }
    }
}
