//! Storage interface for items, ratings and the match log
//!
//! The rating engine and the matchmaker only ever talk to a [`BattleStore`].
//! Two implementations ship with the crate: an in-memory store for tests and
//! ephemeral sessions, and a SQLite store for the real collection.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::types::{Item, ItemId, MatchRecord, NewItem, RankedItem, Rating};

pub use memory::InMemoryBattleStore;
pub use sqlite::SqliteBattleStore;

/// Trait for battle storage operations
#[cfg_attr(test, mockall::automock)]
pub trait BattleStore: Send + Sync {
    /// Create an item together with its initial rating, atomically
    fn insert_item(&self, item: NewItem) -> Result<RankedItem>;

    /// Look up an item by its catalog identifier
    fn find_item_by_external_id(&self, external_id: &str) -> Result<Option<Item>>;

    /// Get an item's rating, `None` if the item has no rating row
    fn get_rating(&self, item_id: ItemId) -> Result<Option<Rating>>;

    /// Overwrite a single rating row
    fn update_rating(&self, rating: Rating) -> Result<()>;

    /// Write every rating row and append the match record as one unit
    ///
    /// Readers observe either all of it or none of it. A failed commit leaves
    /// previously committed state untouched.
    fn commit_duel(&self, ratings: Vec<Rating>, record: MatchRecord) -> Result<MatchRecord>;

    /// Append a match record without touching ratings
    fn append_match_record(&self, record: MatchRecord) -> Result<MatchRecord>;

    /// All items with ratings, highest rating first, ties by ascending id
    fn list_ranked_items(&self) -> Result<Vec<RankedItem>>;

    /// First `limit` entries of [`BattleStore::list_ranked_items`]
    fn top_ranked_items(&self, limit: usize) -> Result<Vec<RankedItem>>;

    /// Up to `limit` match records, most recent first
    fn list_match_history(&self, limit: usize) -> Result<Vec<MatchRecord>>;

    /// Number of rated items
    fn item_count(&self) -> Result<usize>;

    /// Number of match records
    fn match_count(&self) -> Result<usize>;
}

/// Ordering shared by all stores for ranking queries
pub(crate) fn ranking_order(a: &RankedItem, b: &RankedItem) -> std::cmp::Ordering {
    b.rating
        .rating
        .cmp(&a.rating.rating)
        .then_with(|| a.item.id.cmp(&b.item.id))
}
