//! Entity persistence
//!
//! Collectors depend on the [`LeagueStore`] trait; [`JsonFileStore`] is the
//! filesystem implementation. Layout under one league/season directory:
//!
//! ```text
//! <league_key>_<season_id>/
//!   metadata.json  league_stats.json  league_table.json
//!   teams/<id>_<name>.json   teams/<id>_<name>_lastx.json
//!   matches/<id>.json        match_details/<id>.json
//!   players/<id>_<name>.json referees/<id>_<name>.json
//!   h2h/<low>_vs_<high>.json
//! ```
//!
//! Global tables live in [`GlobalStore`].

pub mod global;
pub mod json;
pub mod naming;

pub use global::{GlobalStore, GlobalTable};
pub use json::JsonFileStore;

use crate::persist::saved_at_now;
use crate::LeagueSeason;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Per-id entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// `teams/<id>_<name>.json`
    Team,
    /// `teams/<id>_<name>_lastx.json`
    TeamLastX,
    /// `matches/<id>.json`
    Match,
    /// `match_details/<id>.json`
    MatchDetail,
    /// `players/<id>_<name>.json`
    Player,
    /// `referees/<id>_<name>.json`
    Referee,
}

impl EntityKind {
    /// Subdirectory holding this kind
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Team | EntityKind::TeamLastX => "teams",
            EntityKind::Match => "matches",
            EntityKind::MatchDetail => "match_details",
            EntityKind::Player => "players",
            EntityKind::Referee => "referees",
        }
    }

    /// Whether filenames carry a sanitised display name after the id
    pub fn is_named(&self) -> bool {
        !matches!(self, EntityKind::Match | EntityKind::MatchDetail)
    }

    /// Suffix before `.json`
    pub fn suffix(&self) -> &'static str {
        match self {
            EntityKind::TeamLastX => "_lastx",
            _ => "",
        }
    }
}

/// Singleton documents of a league season
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Document {
    /// League key, season id and year
    Metadata,
    /// League season statistics
    LeagueStats,
    /// League standings envelope
    LeagueTable,
}

impl Document {
    /// Filename in the league directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Document::Metadata => "metadata.json",
            Document::LeagueStats => "league_stats.json",
            Document::LeagueTable => "league_table.json",
        }
    }
}

/// Canonical H2H key: lower team id first
pub fn h2h_key(team_a: i64, team_b: i64) -> (i64, i64) {
    if team_a <= team_b {
        (team_a, team_b)
    } else {
        (team_b, team_a)
    }
}

/// Persistence of one league season's entities.
///
/// Saves stamp `_saved_at` and replace any previous file for the same id.
/// Loads return `None` when the file is missing or unreadable. Id listings
/// are sorted ascending.
pub trait LeagueStore: Send + Sync {
    /// League season this store belongs to
    fn league_season(&self) -> &LeagueSeason;

    /// Write a singleton document
    fn save_document(&self, document: Document, payload: Value) -> StoreResult<()>;

    /// Read a singleton document
    fn load_document(&self, document: Document) -> Option<Value>;

    /// Write a per-id entity; `name` is ignored for unnamed kinds
    fn save_entity(&self, kind: EntityKind, id: i64, name: &str, payload: Value) -> StoreResult<()>;

    /// Read a per-id entity
    fn load_entity(&self, kind: EntityKind, id: i64) -> Option<Value>;

    /// Every stored id of a kind
    fn entity_ids(&self, kind: EntityKind) -> Vec<i64>;

    /// Write the H2H document of a team pair (order-insensitive)
    fn save_h2h(&self, team_a: i64, team_b: i64, payload: Value) -> StoreResult<()>;

    /// Read the H2H document of a team pair (order-insensitive)
    fn load_h2h(&self, team_a: i64, team_b: i64) -> Option<Value>;

    /// Every stored H2H pair, canonical order
    fn h2h_pairs(&self) -> Vec<(i64, i64)>;

    /// Save `metadata.json`
    fn save_metadata(&self, payload: Value) -> StoreResult<()> {
        self.save_document(Document::Metadata, payload)
    }

    /// Load `metadata.json`
    fn load_metadata(&self) -> Option<Value> {
        self.load_document(Document::Metadata)
    }

    /// Save `league_stats.json`
    fn save_league_stats(&self, payload: Value) -> StoreResult<()> {
        self.save_document(Document::LeagueStats, payload)
    }

    /// Load `league_stats.json`
    fn load_league_stats(&self) -> Option<Value> {
        self.load_document(Document::LeagueStats)
    }

    /// Save `league_table.json`
    fn save_league_table(&self, payload: Value) -> StoreResult<()> {
        self.save_document(Document::LeagueTable, payload)
    }

    /// Load `league_table.json`
    fn load_league_table(&self) -> Option<Value> {
        self.load_document(Document::LeagueTable)
    }

    /// Save a team
    fn save_team(&self, id: i64, name: &str, payload: Value) -> StoreResult<()> {
        self.save_entity(EntityKind::Team, id, name, payload)
    }

    /// Load a team
    fn load_team(&self, id: i64) -> Option<Value> {
        self.load_entity(EntityKind::Team, id)
    }

    /// Stored team ids
    fn get_all_team_ids(&self) -> Vec<i64> {
        self.entity_ids(EntityKind::Team)
    }

    /// Save a team's last-N form, wrapped with the team id and name
    fn save_team_lastx(&self, id: i64, name: &str, data: Value) -> StoreResult<()> {
        let wrapped = json!({
            "team_id": id,
            "team_name": name,
            "data": data,
            "_saved_at": saved_at_now(),
        });
        self.save_entity(EntityKind::TeamLastX, id, name, wrapped)
    }

    /// Load a team's last-N form wrapper
    fn load_team_lastx(&self, id: i64) -> Option<Value> {
        self.load_entity(EntityKind::TeamLastX, id)
    }

    /// Team ids with a stored last-N form
    fn get_all_team_lastx_ids(&self) -> Vec<i64> {
        self.entity_ids(EntityKind::TeamLastX)
    }

    /// Save a match
    fn save_match(&self, id: i64, payload: Value) -> StoreResult<()> {
        self.save_entity(EntityKind::Match, id, "", payload)
    }

    /// Load a match
    fn load_match(&self, id: i64) -> Option<Value> {
        self.load_entity(EntityKind::Match, id)
    }

    /// Stored match ids
    fn get_all_match_ids(&self) -> Vec<i64> {
        self.entity_ids(EntityKind::Match)
    }

    /// Save match details
    fn save_match_details(&self, id: i64, payload: Value) -> StoreResult<()> {
        self.save_entity(EntityKind::MatchDetail, id, "", payload)
    }

    /// Load match details
    fn load_match_details(&self, id: i64) -> Option<Value> {
        self.load_entity(EntityKind::MatchDetail, id)
    }

    /// Match ids with stored details
    fn get_all_match_detail_ids(&self) -> Vec<i64> {
        self.entity_ids(EntityKind::MatchDetail)
    }

    /// Save a player
    fn save_player(&self, id: i64, name: &str, payload: Value) -> StoreResult<()> {
        self.save_entity(EntityKind::Player, id, name, payload)
    }

    /// Load a player
    fn load_player(&self, id: i64) -> Option<Value> {
        self.load_entity(EntityKind::Player, id)
    }

    /// Stored player ids
    fn get_all_player_ids(&self) -> Vec<i64> {
        self.entity_ids(EntityKind::Player)
    }

    /// Save a referee
    fn save_referee(&self, id: i64, name: &str, payload: Value) -> StoreResult<()> {
        self.save_entity(EntityKind::Referee, id, name, payload)
    }

    /// Load a referee
    fn load_referee(&self, id: i64) -> Option<Value> {
        self.load_entity(EntityKind::Referee, id)
    }

    /// Stored referee ids
    fn get_all_referee_ids(&self) -> Vec<i64> {
        self.entity_ids(EntityKind::Referee)
    }
}
