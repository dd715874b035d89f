//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use song_battle::error::Result;
use song_battle::storage::{BattleStore, InMemoryBattleStore};
use song_battle::types::{Item, ItemId, MatchRecord, NewItem, RankedItem, Rating};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Catalog entries `track-0 .. track-{count-1}`
pub fn sample_catalog(count: usize) -> Vec<NewItem> {
    (0..count)
        .map(|i| {
            let mut item = NewItem::new(
                format!("track-{}", i),
                format!("Song {}", i),
                format!("Artist {}", i % 4),
            );
            item.album = format!("Album {}", i % 3);
            item.year = Some(1980 + i as i32);
            item.genres = vec!["rock".to_string()];
            item
        })
        .collect()
}

/// In-memory store with one item per (rating, battles) pair, ids from 1
pub fn seeded_store(items: &[(i32, u32)]) -> Arc<InMemoryBattleStore> {
    let store = InMemoryBattleStore::new();
    for (entry, (elo, battles)) in sample_catalog(items.len()).into_iter().zip(items) {
        let ranked = store.insert_item(entry).expect("insert fixture item");
        let mut rating = ranked.rating;
        rating.rating = *elo;
        rating.wins = *battles;
        store.update_rating(rating).expect("update fixture rating");
    }
    Arc::new(store)
}

/// Store wrapper whose duel commits can be made to fail
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryBattleStore,
    fail_commits: AtomicBool,
    commit_attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryBattleStore) -> Self {
        Self {
            inner,
            fail_commits: AtomicBool::new(false),
            commit_attempts: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_commits.store(failing, Ordering::SeqCst);
    }

    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }
}

impl BattleStore for FlakyStore {
    fn insert_item(&self, item: NewItem) -> Result<RankedItem> {
        self.inner.insert_item(item)
    }

    fn find_item_by_external_id(&self, external_id: &str) -> Result<Option<Item>> {
        self.inner.find_item_by_external_id(external_id)
    }

    fn get_rating(&self, item_id: ItemId) -> Result<Option<Rating>> {
        self.inner.get_rating(item_id)
    }

    fn update_rating(&self, rating: Rating) -> Result<()> {
        self.inner.update_rating(rating)
    }

    fn commit_duel(&self, ratings: Vec<Rating>, record: MatchRecord) -> Result<MatchRecord> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("simulated disk failure"));
        }
        self.inner.commit_duel(ratings, record)
    }

    fn append_match_record(&self, record: MatchRecord) -> Result<MatchRecord> {
        self.inner.append_match_record(record)
    }

    fn list_ranked_items(&self) -> Result<Vec<RankedItem>> {
        self.inner.list_ranked_items()
    }

    fn top_ranked_items(&self, limit: usize) -> Result<Vec<RankedItem>> {
        self.inner.top_ranked_items(limit)
    }

    fn list_match_history(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        self.inner.list_match_history(limit)
    }

    fn item_count(&self) -> Result<usize> {
        self.inner.item_count()
    }

    fn match_count(&self) -> Result<usize> {
        self.inner.match_count()
    }
}
