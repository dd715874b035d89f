//! Playlist export
//!
//! Serializes the top of the ranking, a hand-picked selection or an Elo band
//! as a JSON playlist that a catalog client can push to the music provider.

use crate::error::{BattleError, Result};
use crate::storage::BattleStore;
use crate::types::{ItemId, RankedItem};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// One playlist line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// 1-based position
    pub rank: usize,
    pub item_id: ItemId,
    pub title: String,
    pub artist: String,
    pub uri: String,
    pub rating: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub track_count: usize,
    pub tracks: Vec<PlaylistEntry>,
}

/// Largest playlist any export may produce
pub const MAX_EXPORT_LIMIT: usize = 1000;

/// Which items an export takes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSelection {
    /// Top of the ranking; `None` uses the configured ranking limit
    Top { limit: Option<usize> },
    /// Hand-picked items, in the order given
    Items(Vec<ItemId>),
    /// Every item rated within `min..=max`, in ranking order
    EloRange { min: i32, max: i32 },
}

/// Default name for a top-N export
pub fn default_playlist_name(track_count: usize) -> String {
    format!("Song Battle Top {}", track_count)
}

/// Reject export limits outside `1..=MAX_EXPORT_LIMIT`
pub fn validate_export_limit(limit: usize) -> Result<()> {
    if limit == 0 || limit > MAX_EXPORT_LIMIT {
        return Err(BattleError::ConfigurationError {
            message: format!(
                "export limit must be between 1 and {}, got {}",
                MAX_EXPORT_LIMIT, limit
            ),
        }
        .into());
    }
    Ok(())
}

fn playlist_from(items: &[RankedItem], name: String, description: String) -> Result<Playlist> {
    if items.is_empty() {
        return Err(BattleError::InsufficientData { available: 0 }.into());
    }
    validate_export_limit(items.len())?;

    let tracks: Vec<PlaylistEntry> = items
        .iter()
        .enumerate()
        .map(|(index, ranked)| PlaylistEntry {
            rank: index + 1,
            item_id: ranked.id(),
            title: ranked.item.title.clone(),
            artist: ranked.item.artist.clone(),
            uri: ranked.item.uri.clone(),
            rating: ranked.elo(),
        })
        .collect();

    Ok(Playlist {
        name,
        description,
        created_at: Utc::now(),
        track_count: tracks.len(),
        tracks,
    })
}

fn created_on() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

/// Build a playlist from ranked items, keeping their order
///
/// An empty ranking has nothing to export and fails with `InsufficientData`.
pub fn build_playlist(ranking: &[RankedItem], name: Option<&str>) -> Result<Playlist> {
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| default_playlist_name(ranking.len()));
    let description = format!(
        "Top {} songs according to Song Battle, created {}",
        ranking.len(),
        created_on()
    );

    playlist_from(ranking, name, description)
}

/// Build a playlist from specific item ids, in the order given
///
/// Ids without a rated item are skipped. Fails with `InsufficientData` if
/// none of them resolve.
pub fn build_custom_playlist(
    store: &dyn BattleStore,
    item_ids: &[ItemId],
    name: Option<&str>,
) -> Result<Playlist> {
    let ranked = store.list_ranked_items()?;
    let selection: Vec<RankedItem> = item_ids
        .iter()
        .filter_map(|id| {
            let found = ranked.iter().find(|r| r.id() == *id).cloned();
            if found.is_none() {
                warn!("Skipping unknown item {} in custom playlist", id);
            }
            found
        })
        .collect();

    let name = name.unwrap_or("Song Battle Custom Playlist").to_string();
    let description = format!(
        "Custom Song Battle playlist, {} songs, created {}",
        selection.len(),
        created_on()
    );

    playlist_from(&selection, name, description)
}

/// Build a playlist of every item rated between `min_elo` and `max_elo`
/// inclusive, highest rating first
pub fn build_range_playlist(
    store: &dyn BattleStore,
    min_elo: i32,
    max_elo: i32,
    name: Option<&str>,
) -> Result<Playlist> {
    if min_elo > max_elo {
        return Err(BattleError::ConfigurationError {
            message: format!("empty Elo range {}-{}", min_elo, max_elo),
        }
        .into());
    }

    let selection: Vec<RankedItem> = store
        .list_ranked_items()?
        .into_iter()
        .filter(|ranked| (min_elo..=max_elo).contains(&ranked.elo()))
        .collect();

    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| format!("Song Battle Elo {}-{}", min_elo, max_elo));
    let description = format!(
        "Songs rated between {} and {}, {} songs, created {}",
        min_elo,
        max_elo,
        selection.len(),
        created_on()
    );

    playlist_from(&selection, name, description)
}

/// Write a playlist as pretty-printed JSON
pub fn write_playlist(path: &Path, playlist: &Playlist) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(playlist)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write playlist to {}", path.display()))?;

    info!(
        "Exported playlist '{}' ({} tracks) to {}",
        playlist.name,
        playlist.track_count,
        path.display()
    );
    Ok(())
}
