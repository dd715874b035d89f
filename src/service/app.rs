//! Main application state and service coordination
//!
//! `AppState` wires configuration, the battle store, the rating engine, the
//! matchmaker and metrics together. Both the CLI and the HTTP surface go
//! through it so every duel is logged and counted the same way.

use crate::config::{AppConfig, StorageBackend};
use crate::error::{BattleError, Result};
use crate::export::{
    build_custom_playlist, build_playlist, build_range_playlist, validate_export_limit,
    ExportSelection, Playlist,
};
use crate::matchmaking::{MatchProposal, Matchmaker};
use crate::metrics::MetricsCollector;
use crate::rating::RatingEngine;
use crate::storage::{BattleStore, InMemoryBattleStore, SqliteBattleStore};
use crate::types::{
    DuelPreview, DuelResult, EloStats, ItemId, MatchRecord, MatchmakingStats, Outcome, RankedItem,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Combined statistics for `stats` surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    pub ratings: EloStats,
    pub matchmaking: MatchmakingStats,
    pub uptime_seconds: u64,
}

/// Application state shared by the CLI and the HTTP handlers
pub struct AppState {
    config: AppConfig,
    store: Arc<dyn BattleStore>,
    engine: RatingEngine,
    matchmaker: Matchmaker,
    metrics: Arc<MetricsCollector>,
    started_at: Instant,
    running: AtomicBool,
}

impl AppState {
    /// Open the configured store and build the service around it
    pub fn new(config: AppConfig) -> std::result::Result<Self, ServiceError> {
        let store: Arc<dyn BattleStore> = match config.storage.backend {
            StorageBackend::Memory => {
                warn!("Using in-memory storage, ratings will not survive a restart");
                Arc::new(InMemoryBattleStore::new())
            }
            StorageBackend::Sqlite => {
                let store = SqliteBattleStore::open(&config.storage.database_path).map_err(|e| {
                    ServiceError::Initialization {
                        message: format!("Failed to open battle store: {:#}", e),
                    }
                })?;
                Arc::new(store)
            }
        };

        Self::with_store(config, store)
    }

    /// Build the service around an existing store
    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn BattleStore>,
    ) -> std::result::Result<Self, ServiceError> {
        let metrics = MetricsCollector::new().map_err(|e| ServiceError::Initialization {
            message: format!("Failed to create metrics collector: {}", e),
        })?;

        let engine = RatingEngine::new(store.clone());
        let matchmaker = match config.matchmaking.seed {
            Some(seed) => {
                info!("Matchmaker seeded with {}", seed);
                Matchmaker::with_seed(store.clone(), seed)
            }
            None => Matchmaker::new(store.clone()),
        };

        Ok(Self {
            config,
            store,
            engine,
            matchmaker,
            metrics: Arc::new(metrics),
            started_at: Instant::now(),
            running: AtomicBool::new(false),
        })
    }

    /// Mark the service as accepting requests
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        if let Ok(count) = self.store.item_count() {
            self.metrics.update_rated_items(count);
        }
        info!("{} started", self.config.service.name);
    }

    /// Mark the service as stopped
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("{} stopped", self.config.service.name);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn BattleStore> {
        self.store.clone()
    }

    pub fn engine(&self) -> &RatingEngine {
        &self.engine
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Next pair to battle
    pub fn next_match(&self) -> Result<MatchProposal> {
        let timer = self.metrics.start_timer();

        match self.matchmaker.next_match() {
            Ok(proposal) => {
                self.metrics
                    .record_match_proposed(proposal.mode, proposal.quality, timer.stop());
                Ok(proposal)
            }
            Err(e) => {
                if matches!(
                    e.downcast_ref::<BattleError>(),
                    Some(BattleError::InsufficientData { .. })
                ) {
                    self.metrics.record_insufficient_data();
                } else {
                    error!("Failed to pick next match: {:#}", e);
                }
                Err(e)
            }
        }
    }

    /// Apply a duel outcome
    pub fn submit_duel(&self, left: ItemId, right: ItemId, outcome: Outcome) -> Result<DuelResult> {
        let timer = self.metrics.start_timer();

        match self.engine.process_outcome(left, right, outcome) {
            Ok(result) => {
                self.metrics
                    .record_duel(outcome, [&result.left, &result.right], timer.stop());
                Ok(result)
            }
            Err(e) => {
                let kind = BattleError::kind_of(&e);
                debug!("Duel {} vs {} rejected ({:?}): {:#}", left, right, kind, e);
                self.metrics.record_duel_error(kind);
                Err(e)
            }
        }
    }

    /// Projected result of a duel, nothing is written
    pub fn preview_duel(&self, left: ItemId, right: ItemId, outcome: Outcome) -> Result<DuelPreview> {
        self.engine.simulate_outcome(left, right, outcome)
    }

    /// Current ranking, using the configured default size when `limit` is absent
    pub fn ranking(&self, limit: Option<usize>) -> Result<Vec<RankedItem>> {
        let limit = limit.unwrap_or(self.config.matchmaking.ranking_limit);
        self.engine.current_ranking(limit)
    }

    /// Most recent match records
    pub fn history(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        self.store.list_match_history(limit)
    }

    pub fn stats(&self) -> Result<ServiceStats> {
        let ratings = self.engine.stats()?;
        self.metrics.update_rated_items(ratings.total_items);
        self.metrics.update_uptime(self.uptime());

        Ok(ServiceStats {
            ratings,
            matchmaking: self.matchmaker.stats()?,
            uptime_seconds: self.uptime().as_secs(),
        })
    }

    /// Playlist for the given selection
    pub fn export_playlist(&self, selection: &ExportSelection, name: Option<&str>) -> Result<Playlist> {
        match selection {
            ExportSelection::Top { limit } => {
                let limit = limit.unwrap_or(self.config.matchmaking.ranking_limit);
                validate_export_limit(limit)?;
                build_playlist(&self.engine.current_ranking(limit)?, name)
            }
            ExportSelection::Items(ids) => build_custom_playlist(self.store.as_ref(), ids, name),
            ExportSelection::EloRange { min, max } => {
                build_range_playlist(self.store.as_ref(), *min, *max, name)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::NewItem;

    fn memory_state(items: usize) -> AppState {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.matchmaking.seed = Some(1);

        let state = AppState::new(config).unwrap();
        for i in 0..items {
            state
                .store()
                .insert_item(NewItem::new(format!("ext-{}", i), format!("Song {}", i), "Artist"))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_lifecycle() {
        let state = memory_state(0);
        assert!(!state.is_running());
        state.start();
        assert!(state.is_running());
        state.shutdown();
        assert!(!state.is_running());
    }

    #[test]
    fn test_sqlite_backend_opens_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.database_path = dir.path().join("battle.db");

        let state = AppState::new(config).unwrap();
        assert_eq!(state.store().item_count().unwrap(), 0);
        assert!(dir.path().join("battle.db").exists());
    }

    #[test]
    fn test_next_match_and_submit_record_metrics() {
        let state = memory_state(2);

        let proposal = state.next_match().unwrap();
        state
            .submit_duel(proposal.left.id(), proposal.right.id(), Outcome::LeftWins)
            .unwrap();

        let metrics = state.metrics();
        assert_eq!(
            metrics
                .duels()
                .duels_processed_total
                .with_label_values(&["left"])
                .get(),
            1
        );
        assert_eq!(metrics.performance().next_match_duration.get_sample_count(), 1);
    }

    #[test]
    fn test_insufficient_data_is_counted() {
        let state = memory_state(1);
        let err = state.next_match().unwrap_err();
        assert_eq!(BattleError::kind_of(&err), ErrorKind::InsufficientData);
        assert_eq!(state.metrics().matchmaking().insufficient_data_total.get(), 1);
    }

    #[test]
    fn test_rejected_duel_is_counted() {
        let state = memory_state(1);
        assert!(state.submit_duel(1, 5, Outcome::Draw).is_err());
        assert_eq!(
            state
                .metrics()
                .duels()
                .duel_errors_total
                .with_label_values(&["not_found"])
                .get(),
            1
        );
    }

    #[test]
    fn test_ranking_uses_configured_limit() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.matchmaking.ranking_limit = 2;
        let state = AppState::new(config).unwrap();
        for i in 0..4 {
            state
                .store()
                .insert_item(NewItem::new(format!("ext-{}", i), "Song", "Artist"))
                .unwrap();
        }

        assert_eq!(state.ranking(None).unwrap().len(), 2);
        assert_eq!(state.ranking(Some(3)).unwrap().len(), 3);
    }

    #[test]
    fn test_stats_and_export() {
        let state = memory_state(3);
        state.submit_duel(1, 2, Outcome::RightWins).unwrap();

        let stats = state.stats().unwrap();
        assert_eq!(stats.ratings.total_items, 3);
        assert_eq!(stats.ratings.total_matches, 1);
        assert_eq!(stats.matchmaking.underplayed_items, 3);

        let playlist = state
            .export_playlist(&ExportSelection::Top { limit: Some(1) }, None)
            .unwrap();
        assert_eq!(playlist.tracks[0].item_id, 2);
    }

    #[test]
    fn test_export_selections() {
        let state = memory_state(3);
        state.submit_duel(1, 2, Outcome::RightWins).unwrap();

        let err = state
            .export_playlist(&ExportSelection::Top { limit: Some(1001) }, None)
            .unwrap_err();
        assert_eq!(BattleError::kind_of(&err), ErrorKind::Configuration);

        let custom = state
            .export_playlist(&ExportSelection::Items(vec![3, 1]), Some("Pick"))
            .unwrap();
        let ids: Vec<_> = custom.tracks.iter().map(|t| t.item_id).collect();
        assert_eq!(ids, vec![3, 1]);

        let band = state
            .export_playlist(&ExportSelection::EloRange { min: 1200, max: 1300 }, None)
            .unwrap();
        let ids: Vec<_> = band.tracks.iter().map(|t| t.item_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(band.name, "Song Battle Elo 1200-1300");
    }
}
