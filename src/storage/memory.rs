//! In-memory battle store
//!
//! All tables live behind a single `RwLock`, so every write (including a
//! whole duel commit) is atomic with respect to readers.

use crate::error::{BattleError, Result};
use crate::storage::{ranking_order, BattleStore};
use crate::types::{Item, ItemId, MatchRecord, NewItem, RankedItem, Rating};
use crate::utils::current_timestamp;
use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    items: BTreeMap<ItemId, Item>,
    ratings: HashMap<ItemId, Rating>,
    /// Append order is recency order
    matches: Vec<MatchRecord>,
    next_item_id: ItemId,
    next_match_id: i64,
}

impl StoreState {
    fn ranked(&self) -> Vec<RankedItem> {
        let mut ranked: Vec<RankedItem> = self
            .items
            .values()
            .filter_map(|item| {
                self.ratings.get(&item.id).map(|rating| RankedItem {
                    item: item.clone(),
                    rating: rating.clone(),
                })
            })
            .collect();
        ranked.sort_by(ranking_order);
        ranked
    }

    fn push_match(&mut self, mut record: MatchRecord) -> MatchRecord {
        self.next_match_id += 1;
        record.id = Some(self.next_match_id);
        self.matches.push(record.clone());
        record
    }
}

/// In-memory battle store implementation
#[derive(Debug, Default)]
pub struct InMemoryBattleStore {
    state: RwLock<StoreState>,
}

impl InMemoryBattleStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| {
            BattleError::StoreFailure {
                message: "Failed to acquire store read lock".to_string(),
            }
            .into()
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| {
            BattleError::StoreFailure {
                message: "Failed to acquire store write lock".to_string(),
            }
            .into()
        })
    }
}

impl BattleStore for InMemoryBattleStore {
    fn insert_item(&self, item: NewItem) -> Result<RankedItem> {
        let mut state = self.write()?;

        if state
            .items
            .values()
            .any(|existing| existing.external_id == item.external_id)
        {
            return Err(BattleError::StoreFailure {
                message: format!("Item with external id {} already exists", item.external_id),
            }
            .into());
        }

        state.next_item_id += 1;
        let id = state.next_item_id;
        let item = item.into_item(id, current_timestamp());
        let rating = Rating::initial(id);

        state.items.insert(id, item.clone());
        state.ratings.insert(id, rating.clone());

        debug!("Inserted item {} ({})", id, item.title);
        Ok(RankedItem { item, rating })
    }

    fn find_item_by_external_id(&self, external_id: &str) -> Result<Option<Item>> {
        let state = self.read()?;
        Ok(state
            .items
            .values()
            .find(|item| item.external_id == external_id)
            .cloned())
    }

    fn get_rating(&self, item_id: ItemId) -> Result<Option<Rating>> {
        let state = self.read()?;
        Ok(state.ratings.get(&item_id).cloned())
    }

    fn update_rating(&self, rating: Rating) -> Result<()> {
        let mut state = self.write()?;

        match state.ratings.get_mut(&rating.item_id) {
            Some(existing) => {
                *existing = rating;
                Ok(())
            }
            None => Err(BattleError::ItemNotFound {
                item_id: rating.item_id,
            }
            .into()),
        }
    }

    fn commit_duel(&self, ratings: Vec<Rating>, record: MatchRecord) -> Result<MatchRecord> {
        let mut state = self.write()?;

        // Validate everything before the first mutation
        if let Some(missing) = ratings
            .iter()
            .find(|rating| !state.ratings.contains_key(&rating.item_id))
        {
            return Err(BattleError::ItemNotFound {
                item_id: missing.item_id,
            }
            .into());
        }

        for rating in ratings {
            state.ratings.insert(rating.item_id, rating);
        }

        Ok(state.push_match(record))
    }

    fn append_match_record(&self, record: MatchRecord) -> Result<MatchRecord> {
        let mut state = self.write()?;
        Ok(state.push_match(record))
    }

    fn list_ranked_items(&self) -> Result<Vec<RankedItem>> {
        let state = self.read()?;
        Ok(state.ranked())
    }

    fn top_ranked_items(&self, limit: usize) -> Result<Vec<RankedItem>> {
        let state = self.read()?;
        let mut ranked = state.ranked();
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn list_match_history(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        let state = self.read()?;
        Ok(state.matches.iter().rev().take(limit).cloned().collect())
    }

    fn item_count(&self) -> Result<usize> {
        let state = self.read()?;
        Ok(state.ratings.len())
    }

    fn match_count(&self) -> Result<usize> {
        let state = self.read()?;
        Ok(state.matches.len())
    }
}
