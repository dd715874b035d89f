//! Elo arithmetic
//!
//! Pure functions only: no storage access, no clock, no randomness. Both the
//! committing and the preview paths of the rating engine go through
//! [`compute_duel`] so they can never disagree.

use crate::types::{Outcome, Rating, RatingChange};
use skillratings::elo::EloRating;

/// K-factor for items with fewer than [`NEW_ITEM_THRESHOLD`] battles
pub const MAX_K: i32 = 32;
/// K-factor between the two thresholds
pub const MID_K: i32 = 24;
/// K-factor for established items
pub const MIN_K: i32 = 16;

/// Below this many battles an item is considered new
pub const NEW_ITEM_THRESHOLD: u32 = 10;
/// From this many battles on an item is considered established
pub const ESTABLISHED_ITEM_THRESHOLD: u32 = 30;

/// Probability that an item rated `rating_a` beats one rated `rating_b`
///
/// `1 / (1 + 10^((rating_b - rating_a) / 400))`, always in (0, 1).
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    let (expected_a, _) = skillratings::elo::expected_score(
        &EloRating {
            rating: rating_a as f64,
        },
        &EloRating {
            rating: rating_b as f64,
        },
    );
    expected_a
}

/// K-factor for an item given its battles so far
pub fn k_factor(total_battles: u32) -> i32 {
    if total_battles < NEW_ITEM_THRESHOLD {
        MAX_K
    } else if total_battles < ESTABLISHED_ITEM_THRESHOLD {
        MID_K
    } else {
        MIN_K
    }
}

/// `old + k * (actual - expected)`, rounded half to even
///
/// Elo deltas land on exact halves often (any K against an even pairing), so
/// the tie rule matters: 1212.5 becomes 1212 and 1213.5 becomes 1214.
pub fn new_rating(old_rating: i32, actual_score: f64, expected_score: f64, k: i32) -> i32 {
    let raw = old_rating as f64 + k as f64 * (actual_score - expected_score);
    raw.round_ties_even() as i32
}

/// Rating movement for both sides of a duel
///
/// Each side uses its own pre-duel battle count for K and the opponent's
/// pre-duel rating for the expectation. Skips leave both sides unchanged.
pub fn compute_duel(left: &Rating, right: &Rating, outcome: Outcome) -> (RatingChange, RatingChange) {
    let Some((left_score, right_score)) = outcome.scores() else {
        return (
            RatingChange::unchanged(left.item_id, left.rating, outcome),
            RatingChange::unchanged(right.item_id, right.rating, outcome),
        );
    };

    let left_expected = expected_score(left.rating, right.rating);
    let right_expected = expected_score(right.rating, left.rating);

    let left_k = k_factor(left.total_battles());
    let right_k = k_factor(right.total_battles());

    let left_new = new_rating(left.rating, left_score, left_expected, left_k);
    let right_new = new_rating(right.rating, right_score, right_expected, right_k);

    (
        RatingChange::new(left.item_id, left.rating, left_new, outcome),
        RatingChange::new(right.item_id, right.rating, right_new, outcome),
    )
}
