//! # Footy Ingest Library
//!
//! Resumable ingestion of football statistics from a rate-limited HTTP API into
//! per-league JSON files. Designed for a single operator running long batch
//! pulls that may be interrupted at any point and resumed later.
//!
//! ## Features
//!
//! - **Hourly Quota**: Fixed-window rate limiter whose counters survive restarts
//! - **Retry Policy**: Exponential backoff for transient failures, cooldown on 429,
//!   immediate failure on 403
//! - **Resume Ledger**: Per league/season progress ledger with monotonic id sets
//! - **Idempotent Merge**: Every fetched record is written by id, so re-running a
//!   stage converges on the same files
//! - **Derived Data**: Head-to-head summaries generated from stored matches
//!
//! ## Quick Start
//!
//! ```no_run
//! use footy_ingest::config::IngestConfig;
//! use footy_ingest::ingest::IngestionRunner;
//! use footy_ingest::LeagueSeason;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestConfig::new("my-api-key", "./data");
//! let runner = IngestionRunner::from_config(&config)?;
//!
//! let league = LeagueSeason::new("england_premier_league", 9660, "2023/2024");
//! let summary = runner.run(&league).await?;
//! println!("{} API calls", summary.api_calls);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`client`] - Rate limiter, HTTP transport and the retrying API client
//! - [`store`] - On-disk JSON layout for every entity type
//! - [`resume`] - Per league/season progress ledger and the run lock
//! - [`collector`] - One collector per ingestion stage
//! - [`ingest`] - Runs the collectors in dependency order
//! - [`cli`] - Command line surface
//!
//! ## Concurrency
//!
//! Ingestion is a single sequential task. Two processes ingesting the same
//! league/season would race on file writes; the runner takes an advisory lock
//! to refuse that case.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// API client, transport and rate limiting
pub mod client;

/// Per-stage collectors
pub mod collector;

/// Runtime configuration
pub mod config;

/// Pipeline orchestration
pub mod ingest;

/// Metrics instrumentation
pub mod metrics;

/// Atomic JSON file helpers shared by the store, ledger and rate limiter
pub mod persist;

/// Progress ledger for resumable ingestion
pub mod resume;

/// Graceful shutdown coordination
pub mod shutdown;

/// Entity persistence
pub mod store;

/// One named phase of ingestion, tracked independently in the ledger.
///
/// Variants are declared in pipeline order; `Ord` follows that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// League season statistics
    #[serde(rename = "league_stats")]
    LeagueStats,
    /// League standings
    #[serde(rename = "league_table")]
    LeagueTable,
    /// Teams of the league season
    #[serde(rename = "teams")]
    Teams,
    /// Rolling last-N form per team
    #[serde(rename = "team_lastx")]
    TeamLastX,
    /// Fixtures and results
    #[serde(rename = "matches")]
    Matches,
    /// Detailed statistics for completed matches
    #[serde(rename = "match_details")]
    MatchDetails,
    /// Player statistics
    #[serde(rename = "players")]
    Players,
    /// Referee statistics
    #[serde(rename = "referees")]
    Referees,
    /// Head-to-head summaries derived from stored matches
    #[serde(rename = "h2h")]
    HeadToHead,
}

impl Stage {
    /// Every stage in the order the pipeline runs them.
    pub const ALL: [Stage; 9] = [
        Stage::LeagueStats,
        Stage::LeagueTable,
        Stage::Teams,
        Stage::TeamLastX,
        Stage::Matches,
        Stage::MatchDetails,
        Stage::Players,
        Stage::Referees,
        Stage::HeadToHead,
    ];

    /// Ledger key of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::LeagueStats => "league_stats",
            Stage::LeagueTable => "league_table",
            Stage::Teams => "teams",
            Stage::TeamLastX => "team_lastx",
            Stage::Matches => "matches",
            Stage::MatchDetails => "match_details",
            Stage::Players => "players",
            Stage::Referees => "referees",
            Stage::HeadToHead => "h2h",
        }
    }

    /// Which id list the ledger keeps for this stage, if any
    pub fn id_key(&self) -> Option<IdKey> {
        match self {
            Stage::Teams | Stage::TeamLastX => Some(IdKey::TeamIds),
            Stage::Matches | Stage::MatchDetails => Some(IdKey::MatchIds),
            Stage::Players => Some(IdKey::PlayerIds),
            Stage::Referees => Some(IdKey::RefereeIds),
            Stage::LeagueStats | Stage::LeagueTable | Stage::HeadToHead => None,
        }
    }

    /// Refresh policy from [`STAGE_POLICIES`]
    pub fn policy(&self) -> RefreshPolicy {
        STAGE_POLICIES
            .iter()
            .find(|(stage, _)| stage == self)
            .map(|(_, policy)| *policy)
            .unwrap_or(RefreshPolicy::AlwaysRefresh)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .find(|stage| stage.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Invalid stage: {s}"))
    }
}

/// Whether a completed stage is re-run on the next ingestion.
///
/// Completion marks "structure fully discovered", not "content frozen": most
/// stages re-fetch to pick up score, status and stat changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Run on every ingestion, even when already complete
    AlwaysRefresh,
    /// Skip entirely once complete
    OnceOnly,
}

/// Per-stage refresh policy table consulted by the orchestrator.
pub const STAGE_POLICIES: [(Stage, RefreshPolicy); 9] = [
    (Stage::LeagueStats, RefreshPolicy::AlwaysRefresh),
    (Stage::LeagueTable, RefreshPolicy::AlwaysRefresh),
    (Stage::Teams, RefreshPolicy::OnceOnly),
    (Stage::TeamLastX, RefreshPolicy::AlwaysRefresh),
    (Stage::Matches, RefreshPolicy::AlwaysRefresh),
    (Stage::MatchDetails, RefreshPolicy::AlwaysRefresh),
    (Stage::Players, RefreshPolicy::AlwaysRefresh),
    (Stage::Referees, RefreshPolicy::OnceOnly),
    (Stage::HeadToHead, RefreshPolicy::AlwaysRefresh),
];

/// Name of the id list a stage records in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKey {
    /// `team_ids`
    TeamIds,
    /// `match_ids`
    MatchIds,
    /// `player_ids`
    PlayerIds,
    /// `referee_ids`
    RefereeIds,
}

impl IdKey {
    /// JSON field name in the ledger
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKey::TeamIds => "team_ids",
            IdKey::MatchIds => "match_ids",
            IdKey::PlayerIds => "player_ids",
            IdKey::RefereeIds => "referee_ids",
        }
    }
}

/// Status of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Not started yet
    #[default]
    Pending,
    /// Started and not finished; progress may be partial
    InProgress,
    /// Structure fully discovered
    Complete,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// Status of a whole league/season ingestion, derived from its stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    /// No stage has started
    #[default]
    NotStarted,
    /// Some stage started, not all complete
    InProgress,
    /// Every stage complete
    Complete,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OverallStatus::NotStarted => "not_started",
            OverallStatus::InProgress => "in_progress",
            OverallStatus::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

/// A league key together with the API season it is ingested for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeagueSeason {
    /// Stable league key (e.g., "england_premier_league")
    pub league_key: String,
    /// API season id
    pub season_id: i64,
    /// Display year (e.g., "2023/2024"); may be empty
    pub season_year: String,
}

impl LeagueSeason {
    /// Create a new league season
    pub fn new(league_key: impl Into<String>, season_id: i64, season_year: impl Into<String>) -> Self {
        Self {
            league_key: league_key.into(),
            season_id,
            season_year: season_year.into(),
        }
    }

    /// Directory and ledger stem: `<league_key>_<season_id>`
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.league_key, self.season_id)
    }
}

impl std::fmt::Display for LeagueSeason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.season_year.is_empty() {
            write!(f, "{} (season {})", self.league_key, self.season_id)
        } else {
            write!(
                f,
                "{} {} (season {})",
                self.league_key, self.season_year, self.season_id
            )
        }
    }
}

/// Parses `league_key:season_id[:season_year]`
impl FromStr for LeagueSeason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let league_key = parts
            .next()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| format!("Missing league key in '{s}'"))?;
        if !league_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(format!("Invalid league key: {league_key}"));
        }
        let season_id = parts
            .next()
            .ok_or_else(|| format!("Missing season id in '{s}' (expected league:season_id)"))?
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("Invalid season id in '{s}': {e}"))?;
        let season_year = parts.next().unwrap_or_default().to_string();
        Ok(Self::new(league_key, season_id, season_year))
    }
}
