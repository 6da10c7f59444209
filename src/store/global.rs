//! Statistics tables that are not scoped to a league season.

use super::{StoreError, StoreResult};
use crate::persist::{self, with_saved_at};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// A global statistics table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalTable {
    /// Both teams to score
    Btts,
    /// Over 2.5 goals
    Over25,
}

impl GlobalTable {
    /// Both tables
    pub const ALL: [GlobalTable; 2] = [GlobalTable::Btts, GlobalTable::Over25];

    /// Filename under the stats directory
    pub fn file_name(&self) -> &'static str {
        match self {
            GlobalTable::Btts => "btts_stats.json",
            GlobalTable::Over25 => "over25_stats.json",
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            GlobalTable::Btts => "btts",
            GlobalTable::Over25 => "over25",
        }
    }
}

/// `<data>/stats/*.json`
#[derive(Debug, Clone)]
pub struct GlobalStore {
    dir: PathBuf,
}

impl GlobalStore {
    /// Store rooted at `dir`; created lazily on first save
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stats directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Replace a table
    pub fn save(&self, table: GlobalTable, payload: Value) -> StoreResult<()> {
        let path = self.dir.join(table.file_name());
        persist::write_json_atomic(&path, &with_saved_at(payload)).map_err(|e| StoreError::io(&path, e))
    }

    /// Read a table
    pub fn load(&self, table: GlobalTable) -> Option<Value> {
        let path = self.dir.join(table.file_name());
        match persist::read_json(&path) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read stats table");
                None
            }
        }
    }

    /// Replace the BTTS table
    pub fn save_btts_stats(&self, payload: Value) -> StoreResult<()> {
        self.save(GlobalTable::Btts, payload)
    }

    /// Read the BTTS table
    pub fn load_btts_stats(&self) -> Option<Value> {
        self.load(GlobalTable::Btts)
    }

    /// Replace the Over 2.5 table
    pub fn save_over25_stats(&self, payload: Value) -> StoreResult<()> {
        self.save(GlobalTable::Over25, payload)
    }

    /// Read the Over 2.5 table
    pub fn load_over25_stats(&self) -> Option<Value> {
        self.load(GlobalTable::Over25)
    }
}
