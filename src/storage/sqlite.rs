//! SQLite battle store
//!
//! One connection behind a mutex. Every multi-row write runs in a single
//! transaction, which gives the duel commit its all-or-nothing behaviour.

use crate::error::{BattleError, Result};
use crate::storage::BattleStore;
use crate::types::{Item, ItemId, MatchRecord, NewItem, RankedItem, Rating};
use crate::utils::current_timestamp;
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS items (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT    UNIQUE NOT NULL,
        title       TEXT    NOT NULL,
        artist      TEXT    NOT NULL,
        album       TEXT    NOT NULL DEFAULT '',
        year        INTEGER,
        genres_json TEXT    NOT NULL DEFAULT '[]',
        uri         TEXT    NOT NULL,
        preview_url TEXT,
        created_at  TEXT    NOT NULL,
        audio_features_json TEXT
    )",
    "CREATE TABLE IF NOT EXISTS ratings (
        item_id      INTEGER PRIMARY KEY,
        rating       INTEGER NOT NULL DEFAULT 1200,
        wins         INTEGER NOT NULL DEFAULT 0,
        losses       INTEGER NOT NULL DEFAULT 0,
        draws        INTEGER NOT NULL DEFAULT 0,
        last_updated TEXT    NOT NULL,
        FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS matches (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        left_item_id   INTEGER NOT NULL,
        right_item_id  INTEGER NOT NULL,
        winner_item_id INTEGER,
        created_at     TEXT    NOT NULL,
        FOREIGN KEY (left_item_id) REFERENCES items(id) ON DELETE CASCADE,
        FOREIGN KEY (right_item_id) REFERENCES items(id) ON DELETE CASCADE,
        FOREIGN KEY (winner_item_id) REFERENCES items(id) ON DELETE SET NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_items_external_id ON items(external_id)",
    "CREATE INDEX IF NOT EXISTS idx_ratings_rating ON ratings(rating DESC)",
    "CREATE INDEX IF NOT EXISTS idx_matches_created_at ON matches(created_at DESC)",
];

/// Columns added after the first schema, as (table, column, declaration)
const ADDED_COLUMNS: &[(&str, &str, &str)] = &[("items", "audio_features_json", "TEXT")];

const RANKED_SELECT: &str = "SELECT i.id, i.external_id, i.title, i.artist, i.album, i.year,
        i.genres_json, i.uri, i.preview_url, i.created_at, i.audio_features_json,
        r.rating, r.wins, r.losses, r.draws, r.last_updated
    FROM items i
    JOIN ratings r ON r.item_id = i.id
    ORDER BY r.rating DESC, i.id ASC";

/// SQLite-backed battle store
#[derive(Debug)]
pub struct SqliteBattleStore {
    conn: Mutex<Connection>,
}

impl SqliteBattleStore {
    /// Open (or create) the database at `path` and create the schema
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let store = Self::from_connection(conn)?;

        info!("Opened battle database at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        for migration in MIGRATIONS {
            conn.execute(migration, [])
                .with_context(|| format!("Failed to run migration: {}", migration))?;
        }
        add_missing_columns(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            BattleError::StoreFailure {
                message: "Failed to acquire database lock".to_string(),
            }
            .into()
        })
    }
}

/// Databases created before a column existed get it added in place
fn add_missing_columns(conn: &Connection) -> Result<()> {
    for (table, column, declaration) in ADDED_COLUMNS {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        if !names.iter().any(|name| name == column) {
            conn.execute(
                &format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, declaration),
                [],
            )
            .with_context(|| format!("Failed to add column {}.{}", table, column))?;
            info!("Added column {}.{}", table, column);
        }
    }
    Ok(())
}

fn json_column<T: serde::de::DeserializeOwned>(index: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let genres: Vec<String> = json_column(6, &row.get::<_, String>(6)?)?;
    let audio_features = row
        .get::<_, Option<String>>(10)?
        .map(|text| json_column(10, &text))
        .transpose()?;

    Ok(Item {
        id: row.get(0)?,
        external_id: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        album: row.get(4)?,
        year: row.get(5)?,
        genres,
        uri: row.get(7)?,
        preview_url: row.get(8)?,
        created_at: row.get(9)?,
        audio_features,
    })
}

fn ranked_from_row(row: &Row<'_>) -> rusqlite::Result<RankedItem> {
    let item = item_from_row(row)?;
    let rating = Rating {
        item_id: item.id,
        rating: row.get(11)?,
        wins: row.get(12)?,
        losses: row.get(13)?,
        draws: row.get(14)?,
        last_updated: row.get(15)?,
    };
    Ok(RankedItem { item, rating })
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<MatchRecord> {
    Ok(MatchRecord {
        id: row.get(0)?,
        left_item_id: row.get(1)?,
        right_item_id: row.get(2)?,
        winner_item_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn insert_match(conn: &Connection, mut record: MatchRecord) -> Result<MatchRecord> {
    conn.execute(
        "INSERT INTO matches (left_item_id, right_item_id, winner_item_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            record.left_item_id,
            record.right_item_id,
            record.winner_item_id,
            record.created_at
        ],
    )
    .context("Failed to insert match record")?;

    record.id = Some(conn.last_insert_rowid());
    Ok(record)
}

fn write_rating(conn: &Connection, rating: &Rating) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE ratings SET rating = ?1, wins = ?2, losses = ?3, draws = ?4, last_updated = ?5
             WHERE item_id = ?6",
            params![
                rating.rating,
                rating.wins,
                rating.losses,
                rating.draws,
                rating.last_updated,
                rating.item_id
            ],
        )
        .context("Failed to update rating")?;

    if updated == 0 {
        return Err(BattleError::ItemNotFound {
            item_id: rating.item_id,
        }
        .into());
    }
    Ok(())
}

/// SQLite cannot bind a `usize` above `i64::MAX`, and `-1` means no limit
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(-1)
}

impl BattleStore for SqliteBattleStore {
    fn insert_item(&self, item: NewItem) -> Result<RankedItem> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let now = current_timestamp();
        let genres_json = serde_json::to_string(&item.genres)?;
        let audio_features_json = item
            .audio_features
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        tx.execute(
            "INSERT INTO items (external_id, title, artist, album, year, genres_json, uri, preview_url, created_at, audio_features_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                item.external_id,
                item.title,
                item.artist,
                item.album,
                item.year,
                genres_json,
                item.uri,
                item.preview_url,
                now,
                audio_features_json
            ],
        )
        .with_context(|| format!("Failed to insert item {}", item.external_id))?;

        let id = tx.last_insert_rowid();
        let rating = Rating::initial(id);

        tx.execute(
            "INSERT INTO ratings (item_id, rating, wins, losses, draws, last_updated)
             VALUES (?1, ?2, 0, 0, 0, ?3)",
            params![id, rating.rating, rating.last_updated],
        )
        .context("Failed to insert initial rating")?;

        tx.commit().context("Failed to commit item insert")?;

        debug!("Inserted item {} ({})", id, item.title);
        Ok(RankedItem {
            item: item.into_item(id, now),
            rating,
        })
    }

    fn find_item_by_external_id(&self, external_id: &str) -> Result<Option<Item>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                "SELECT id, external_id, title, artist, album, year, genres_json, uri, preview_url, created_at,
                        audio_features_json
                 FROM items WHERE external_id = ?1",
                params![external_id],
                item_from_row,
            )
            .optional()
            .context("Failed to query item by external id")?;
        Ok(item)
    }

    fn get_rating(&self, item_id: ItemId) -> Result<Option<Rating>> {
        let conn = self.conn()?;
        let rating = conn
            .query_row(
                "SELECT item_id, rating, wins, losses, draws, last_updated
                 FROM ratings WHERE item_id = ?1",
                params![item_id],
                |row| {
                    Ok(Rating {
                        item_id: row.get(0)?,
                        rating: row.get(1)?,
                        wins: row.get(2)?,
                        losses: row.get(3)?,
                        draws: row.get(4)?,
                        last_updated: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("Failed to query rating")?;
        Ok(rating)
    }

    fn update_rating(&self, rating: Rating) -> Result<()> {
        let conn = self.conn()?;
        write_rating(&conn, &rating)
    }

    fn commit_duel(&self, ratings: Vec<Rating>, record: MatchRecord) -> Result<MatchRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for rating in &ratings {
            write_rating(&tx, rating)?;
        }
        let record = insert_match(&tx, record)?;

        // Dropping an uncommitted transaction rolls it back, so an early
        // return above leaves the database as it was.
        tx.commit().context("Failed to commit duel")?;
        Ok(record)
    }

    fn append_match_record(&self, record: MatchRecord) -> Result<MatchRecord> {
        let conn = self.conn()?;
        insert_match(&conn, record)
    }

    fn list_ranked_items(&self) -> Result<Vec<RankedItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(RANKED_SELECT)?;
        let ranked = stmt
            .query_map([], ranked_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read ranked items")?;
        Ok(ranked)
    }

    fn top_ranked_items(&self, limit: usize) -> Result<Vec<RankedItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} LIMIT ?1", RANKED_SELECT))?;
        let ranked = stmt
            .query_map(params![sql_limit(limit)], ranked_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read top ranked items")?;
        Ok(ranked)
    }

    fn list_match_history(&self, limit: usize) -> Result<Vec<MatchRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, left_item_id, right_item_id, winner_item_id, created_at
             FROM matches ORDER BY id DESC LIMIT ?1",
        )?;
        let history = stmt
            .query_map(params![sql_limit(limit)], match_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read match history")?;
        Ok(history)
    }

    fn item_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ratings", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn match_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store(count: usize) -> SqliteBattleStore {
        let store = SqliteBattleStore::open_in_memory().unwrap();
        for i in 0..count {
            let mut item = NewItem::new(format!("ext-{}", i), format!("Song {}", i), "Artist");
            item.genres = vec!["rock".to_string()];
            store.insert_item(item).unwrap();
        }
        store
    }

    #[test]
    fn test_insert_and_read_back() {
        let store = seeded_store(1);

        let item = store.find_item_by_external_id("ext-0").unwrap().unwrap();
        assert_eq!(item.title, "Song 0");
        assert_eq!(item.genres, vec!["rock".to_string()]);

        let rating = store.get_rating(item.id).unwrap().unwrap();
        assert_eq!(rating.rating, 1200);
        assert_eq!(rating.total_battles(), 0);
    }

    #[test]
    fn test_audio_features_round_trip() {
        let store = seeded_store(1);
        let mut item = NewItem::new("ext-af", "Loud", "Artist");
        item.audio_features = Some(serde_json::json!({"energy": 0.91, "tempo": 128.0}));
        store.insert_item(item).unwrap();

        let stored = store.find_item_by_external_id("ext-af").unwrap().unwrap();
        assert_eq!(stored.audio_features.unwrap()["tempo"], 128.0);

        let ranked = store.list_ranked_items().unwrap();
        assert!(ranked.iter().any(|r| r.item.audio_features.is_some()));
        assert!(store.find_item_by_external_id("ext-0").unwrap().unwrap().audio_features.is_none());
    }

    #[test]
    fn test_old_schema_gains_audio_features_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE items (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT    UNIQUE NOT NULL,
                title       TEXT    NOT NULL,
                artist      TEXT    NOT NULL,
                album       TEXT    NOT NULL DEFAULT '',
                year        INTEGER,
                genres_json TEXT    NOT NULL DEFAULT '[]',
                uri         TEXT    NOT NULL,
                preview_url TEXT,
                created_at  TEXT    NOT NULL
            )",
            [],
        )
        .unwrap();

        let store = SqliteBattleStore::from_connection(conn).unwrap();
        let mut item = NewItem::new("ext-old", "Song", "Artist");
        item.audio_features = Some(serde_json::json!({"energy": 0.5}));
        store.insert_item(item).unwrap();

        let stored = store.find_item_by_external_id("ext-old").unwrap().unwrap();
        assert_eq!(stored.audio_features.unwrap()["energy"], 0.5);
    }

    #[test]
    fn test_duplicate_external_id_rejected() {
        let store = seeded_store(1);
        assert!(store.insert_item(NewItem::new("ext-0", "Again", "Artist")).is_err());
        assert_eq!(store.item_count().unwrap(), 1);
    }

    #[test]
    fn test_missing_rating_is_none() {
        let store = seeded_store(1);
        assert!(store.get_rating(404).unwrap().is_none());
    }

    #[test]
    fn test_ranking_order() {
        let store = seeded_store(3);
        let mut rating = store.get_rating(2).unwrap().unwrap();
        rating.rating = 1250;
        store.update_rating(rating).unwrap();

        let ids: Vec<_> = store
            .list_ranked_items()
            .unwrap()
            .iter()
            .map(|r| r.item.id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);

        assert_eq!(store.top_ranked_items(1).unwrap()[0].item.id, 2);
    }

    #[test]
    fn test_commit_duel_rolls_back_on_missing_row() {
        let store = seeded_store(2);

        let mut left = store.get_rating(1).unwrap().unwrap();
        left.rating = 1216;
        left.wins = 1;

        let result = store.commit_duel(
            vec![left, Rating::initial(77)],
            MatchRecord::new(1, 77, Some(1)),
        );
        assert!(result.is_err());

        assert_eq!(store.get_rating(1).unwrap().unwrap().rating, 1200);
        assert_eq!(store.match_count().unwrap(), 0);
    }

    #[test]
    fn test_commit_duel_and_history() {
        let store = seeded_store(3);

        let mut left = store.get_rating(1).unwrap().unwrap();
        let mut right = store.get_rating(2).unwrap().unwrap();
        left.rating = 1216;
        left.wins = 1;
        right.rating = 1184;
        right.losses = 1;

        let record = store
            .commit_duel(vec![left, right], MatchRecord::new(1, 2, Some(1)))
            .unwrap();
        assert!(record.id.is_some());

        store.append_match_record(MatchRecord::new(2, 3, None)).unwrap();

        let history = store.list_match_history(10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].left_item_id, 2);
        assert_eq!(history[0].winner_item_id, None);
        assert_eq!(history[1].winner_item_id, Some(1));

        assert_eq!(store.get_rating(2).unwrap().unwrap().losses, 1);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("battle.db");

        {
            let store = SqliteBattleStore::open(&path).unwrap();
            store.insert_item(NewItem::new("x", "Song", "Artist")).unwrap();
        }

        let reopened = SqliteBattleStore::open(&path).unwrap();
        assert_eq!(reopened.item_count().unwrap(), 1);
    }
}
