//! Catalog import
//!
//! Reads catalog entries (as fetched from the music provider) from a JSON
//! file and turns new ones into rated items.

use crate::error::Result;
use crate::storage::BattleStore;
use crate::types::NewItem;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Counts reported after an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    /// Entries whose external id was already in the store
    pub skipped: usize,
}

/// Parse a JSON array of catalog entries
pub fn parse_catalog(json: &str) -> Result<Vec<NewItem>> {
    let entries: Vec<NewItem> =
        serde_json::from_str(json).context("Catalog must be a JSON array of items")?;
    Ok(entries)
}

/// Load catalog entries from a JSON file
pub fn load_catalog_file(path: &Path) -> Result<Vec<NewItem>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog file {}", path.display()))?;
    parse_catalog(&contents).with_context(|| format!("Invalid catalog file {}", path.display()))
}

/// Insert every entry whose external id is not known yet
///
/// Each new item gets its initial rating in the same store write. Entries
/// repeated within `entries` are only imported once.
pub fn import_items(store: &dyn BattleStore, entries: Vec<NewItem>) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for entry in entries {
        if store.find_item_by_external_id(&entry.external_id)?.is_some() {
            debug!("Skipping known item {}", entry.external_id);
            summary.skipped += 1;
            continue;
        }

        store.insert_item(entry)?;
        summary.imported += 1;
    }

    info!(
        "Catalog import finished: {} imported, {} skipped",
        summary.imported, summary.skipped
    );
    Ok(summary)
}
