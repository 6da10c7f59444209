//! Statistics API client
//!
//! - [`rate_limit`] - persisted hourly quota
//! - [`transport`] - one HTTP GET behind a trait
//! - [`retry`] - failure classification
//! - [`http`] - [`ApiClient`], the only component that talks to the network

pub mod http;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use http::ApiClient;
pub use rate_limit::{RateLimitError, RateLimitStatus, RateLimiter};
pub use retry::FailureKind;
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named API endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Available leagues and seasons
    LeagueList,
    /// League season statistics
    LeagueStats,
    /// League standings
    LeagueTable,
    /// Teams of a league season (paged)
    LeagueTeams,
    /// Matches of a league season (paged)
    LeagueMatches,
    /// Players of a league season (paged)
    LeaguePlayers,
    /// Referees of a league season
    LeagueReferees,
    /// Single team
    Team,
    /// Last-N form of a team
    TeamLastX,
    /// Single match with detailed statistics
    Match,
    /// Single player
    Player,
    /// Single referee
    Referee,
    /// Both-teams-to-score table
    BttsStats,
    /// Over 2.5 goals table
    Over25Stats,
}

impl Endpoint {
    /// Every endpoint
    pub const ALL: [Endpoint; 14] = [
        Endpoint::LeagueList,
        Endpoint::LeagueStats,
        Endpoint::LeagueTable,
        Endpoint::LeagueTeams,
        Endpoint::LeagueMatches,
        Endpoint::LeaguePlayers,
        Endpoint::LeagueReferees,
        Endpoint::Team,
        Endpoint::TeamLastX,
        Endpoint::Match,
        Endpoint::Player,
        Endpoint::Referee,
        Endpoint::BttsStats,
        Endpoint::Over25Stats,
    ];

    /// Short name used in logs, metrics and as a lookup key
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::LeagueList => "league_list",
            Endpoint::LeagueStats => "league_stats",
            Endpoint::LeagueTable => "league_table",
            Endpoint::LeagueTeams => "league_teams",
            Endpoint::LeagueMatches => "league_matches",
            Endpoint::LeaguePlayers => "league_players",
            Endpoint::LeagueReferees => "league_referees",
            Endpoint::Team => "team",
            Endpoint::TeamLastX => "team_lastx",
            Endpoint::Match => "match",
            Endpoint::Player => "player",
            Endpoint::Referee => "referee",
            Endpoint::BttsStats => "btts_stats",
            Endpoint::Over25Stats => "over25_stats",
        }
    }

    /// URL path relative to the base URL
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::LeagueList => "/league-list",
            Endpoint::LeagueStats => "/league-season",
            Endpoint::LeagueTable => "/league-tables",
            Endpoint::LeagueTeams => "/league-teams",
            Endpoint::LeagueMatches => "/league-matches",
            Endpoint::LeaguePlayers => "/league-players",
            Endpoint::LeagueReferees => "/league-referees",
            Endpoint::Team => "/team",
            Endpoint::TeamLastX => "/lastx",
            Endpoint::Match => "/match",
            Endpoint::Player => "/player-stats",
            Endpoint::Referee => "/referee",
            Endpoint::BttsStats => "/stats-data-btts",
            Endpoint::Over25Stats => "/stats-data-over25",
        }
    }

    /// Look an endpoint up by its short name
    pub fn from_name(name: &str) -> Option<Endpoint> {
        Endpoint::ALL.iter().find(|e| e.name() == name).copied()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Paging information of a list response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    /// Page this response holds
    #[serde(default, alias = "current_page", skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Last available page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_page: Option<u32>,
    /// Total records across all pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
}

/// Response envelope: `{success, data, pager?}`
///
/// Unknown top-level fields are kept so the envelope can be stored whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Whether the API reports success
    #[serde(default)]
    pub success: bool,
    /// Payload: a list of records or a single record
    #[serde(default)]
    pub data: Value,
    /// Present on paged endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pager: Option<Pager>,
    /// Any other top-level fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiResponse {
    /// Records carried in `data`: the elements of a list, a lone object as a
    /// single record, nothing for null or scalars.
    pub fn records(&self) -> Vec<Value> {
        match &self.data {
            Value::Array(items) => items.clone(),
            Value::Object(map) if !map.is_empty() => vec![self.data.clone()],
            _ => Vec::new(),
        }
    }

    /// Whether `data` holds nothing usable
    pub fn is_empty(&self) -> bool {
        match &self.data {
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        }
    }

    /// Whether `page` is the last page. Missing pager means a single page.
    pub fn is_last_page(&self, page: u32) -> bool {
        let max_page = self
            .pager
            .as_ref()
            .and_then(|p| p.max_page)
            .unwrap_or(1);
        page >= max_page
    }

    /// The whole envelope as JSON
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// API client errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP 403; the key is missing, invalid or not entitled
    #[error("access denied (403) for {endpoint}")]
    Unauthorized {
        /// Endpoint that was refused
        endpoint: String,
    },

    /// Retry budget spent without a 200
    #[error("{endpoint} failed after {attempts} attempts: {last_failure}")]
    RetriesExhausted {
        /// Endpoint requested
        endpoint: String,
        /// Attempts made
        attempts: u32,
        /// Classification of the final failure
        last_failure: FailureKind,
    },

    /// Shutdown requested during a wait
    #[error("request to {endpoint} cancelled by shutdown")]
    Cancelled {
        /// Endpoint requested
        endpoint: String,
    },

    /// Transport could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Setup(#[from] TransportError),
}

impl ApiError {
    /// Whether the failure should abort the current stage immediately
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. } | ApiError::Cancelled { .. })
    }
}
