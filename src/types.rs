//! Common types used throughout the song battle engine

use crate::error::BattleError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Store-assigned identifier for catalog items
pub type ItemId = i64;

/// Rating every item starts with
pub const INITIAL_RATING: i32 = 1200;

/// Catalog entry, immutable once imported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Identifier on the catalog provider's side
    pub external_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    /// Reference used by the catalog provider to play the item
    pub uri: String,
    pub preview_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Provider audio analysis (energy, tempo, ...) kept as imported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_features: Option<serde_json::Value>,
}

/// Item data before the store has assigned an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub external_id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub uri: String,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub audio_features: Option<serde_json::Value>,
}

impl NewItem {
    /// Minimal item with only the fields needed for ranking
    pub fn new(external_id: impl Into<String>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        let external_id = external_id.into();
        Self {
            uri: format!("track:{}", external_id),
            external_id,
            title: title.into(),
            artist: artist.into(),
            album: String::new(),
            year: None,
            genres: Vec::new(),
            preview_url: None,
            audio_features: None,
        }
    }

    /// Attach the store id and creation time
    pub fn into_item(self, id: ItemId, created_at: DateTime<Utc>) -> Item {
        Item {
            id,
            external_id: self.external_id,
            title: self.title,
            artist: self.artist,
            album: self.album,
            year: self.year,
            genres: self.genres,
            uri: self.uri,
            preview_url: self.preview_url,
            created_at,
            audio_features: self.audio_features,
        }
    }
}

/// Elo state of a single item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub item_id: ItemId,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub last_updated: DateTime<Utc>,
}

impl Rating {
    /// Fresh rating for a newly imported item
    pub fn initial(item_id: ItemId) -> Self {
        Self {
            item_id,
            rating: INITIAL_RATING,
            wins: 0,
            losses: 0,
            draws: 0,
            last_updated: Utc::now(),
        }
    }

    /// Number of rated duels this item took part in. Skips are not counted.
    pub fn total_battles(&self) -> u32 {
        self.wins + self.losses + self.draws
    }

    /// Win percentage, 0 when the item has never battled
    pub fn win_rate(&self) -> f64 {
        let total = self.total_battles();
        if total == 0 {
            return 0.0;
        }
        self.wins as f64 / total as f64 * 100.0
    }
}

/// Append-only log entry for a processed duel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Assigned by the store on append
    pub id: Option<i64>,
    pub left_item_id: ItemId,
    pub right_item_id: ItemId,
    /// Absent for draws and skips
    pub winner_item_id: Option<ItemId>,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(left_item_id: ItemId, right_item_id: ItemId, winner_item_id: Option<ItemId>) -> Self {
        Self {
            id: None,
            left_item_id,
            right_item_id,
            winner_item_id,
            created_at: Utc::now(),
        }
    }

    /// The other participant, if `item_id` took part in this duel
    pub fn opponent_of(&self, item_id: ItemId) -> Option<ItemId> {
        if self.left_item_id == item_id {
            Some(self.right_item_id)
        } else if self.right_item_id == item_id {
            Some(self.left_item_id)
        } else {
            None
        }
    }
}

/// Item joined with its rating. Built fresh on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item: Item,
    pub rating: Rating,
}

impl RankedItem {
    pub fn id(&self) -> ItemId {
        self.item.id
    }

    pub fn elo(&self) -> i32 {
        self.rating.rating
    }

    pub fn total_battles(&self) -> u32 {
        self.rating.total_battles()
    }
}

/// Resolved result of a duel, seen from the left item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    LeftWins,
    RightWins,
    Draw,
    Skip,
}

impl Outcome {
    /// Actual scores (left, right), `None` for a skip
    pub fn scores(&self) -> Option<(f64, f64)> {
        match self {
            Outcome::LeftWins => Some((1.0, 0.0)),
            Outcome::RightWins => Some((0.0, 1.0)),
            Outcome::Draw => Some((0.5, 0.5)),
            Outcome::Skip => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::LeftWins => "left",
            Outcome::RightWins => "right",
            Outcome::Draw => "draw",
            Outcome::Skip => "skip",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" | "left_wins" => Ok(Outcome::LeftWins),
            "right" | "right_wins" => Ok(Outcome::RightWins),
            "draw" => Ok(Outcome::Draw),
            "skip" => Ok(Outcome::Skip),
            other => Err(BattleError::InvalidOutcome {
                reason: format!("unknown outcome '{}'", other),
            }),
        }
    }
}

/// Rating movement of one side of a duel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub item_id: ItemId,
    pub old_rating: i32,
    pub new_rating: i32,
    pub change: i32,
    pub outcome: Outcome,
}

impl RatingChange {
    pub fn new(item_id: ItemId, old_rating: i32, new_rating: i32, outcome: Outcome) -> Self {
        Self {
            item_id,
            old_rating,
            new_rating,
            change: new_rating - old_rating,
            outcome,
        }
    }

    /// A change that leaves the rating untouched (skips)
    pub fn unchanged(item_id: ItemId, rating: i32, outcome: Outcome) -> Self {
        Self::new(item_id, rating, rating, outcome)
    }
}

/// Outcome of a committed duel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuelResult {
    pub record: MatchRecord,
    pub left: RatingChange,
    pub right: RatingChange,
}

/// Projected rating movement of a duel that was not committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuelPreview {
    pub left: RatingChange,
    pub right: RatingChange,
}

/// Collection-wide rating statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EloStats {
    pub total_items: usize,
    pub total_matches: usize,
    pub average_rating: f64,
    pub min_rating: i32,
    pub max_rating: i32,
}

/// Snapshot of the matchmaking pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchmakingStats {
    pub total_items: usize,
    pub underplayed_items: usize,
    pub experienced_items: usize,
    pub exploration_rate: f64,
    pub elo_range: i32,
}

/// Descriptive label for how even a pairing is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchQuality {
    Exploration,
    Perfect,
    Excellent,
    Good,
    Average,
    Unbalanced,
}

impl MatchQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchQuality::Exploration => "Exploration",
            MatchQuality::Perfect => "Perfect",
            MatchQuality::Excellent => "Excellent",
            MatchQuality::Good => "Good",
            MatchQuality::Average => "Average",
            MatchQuality::Unbalanced => "Unbalanced",
        }
    }
}

impl std::fmt::Display for MatchQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
