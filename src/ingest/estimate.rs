//! Rough API call estimates shown before a run.

use crate::config::MATCHES_PER_PAGE;
use crate::resume::IngestionState;
use crate::{Stage, StageStatus};
use serde::Serialize;
use std::collections::BTreeMap;

/// Typical team count when the ledger has none yet
const DEFAULT_TEAMS: u64 = 20;

/// Typical fixture count of a season
const DEFAULT_MATCHES: u64 = 380;

/// Expected number of calls per endpoint for the remaining work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallEstimate {
    /// Calls per endpoint name
    pub calls: BTreeMap<&'static str, u64>,
    /// Sum over all endpoints
    pub total: u64,
}

impl CallEstimate {
    fn set(&mut self, endpoint: &'static str, calls: u64) {
        self.calls.insert(endpoint, calls);
    }

    fn finish(mut self) -> Self {
        self.total = self.calls.values().sum();
        self
    }
}

/// Estimate the calls a run still needs given the ledger
///
/// Completed stages cost nothing except the always-refreshed ones, which are
/// charged as a re-check.
pub fn estimate_api_calls(state: &IngestionState) -> CallEstimate {
    let mut estimate = CallEstimate::default();
    let done = |stage: Stage| state.collection(stage).status == StageStatus::Complete;

    let teams = state.collection(Stage::Teams);
    let known_teams = if teams.total > 0 { teams.total } else { DEFAULT_TEAMS };

    estimate.set("league_stats", u64::from(!done(Stage::LeagueStats)));
    estimate.set("league_table", u64::from(!done(Stage::LeagueTable)));
    estimate.set("league_teams", u64::from(!done(Stage::Teams)));
    estimate.set("team_lastx", known_teams);

    let matches = state.collection(Stage::Matches);
    let expected_matches = if matches.total > 0 { matches.total } else { DEFAULT_MATCHES };
    let per_page = u64::from(MATCHES_PER_PAGE);
    estimate.set("league_matches", expected_matches.div_ceil(per_page).max(1));

    let details = state.collection(Stage::MatchDetails);
    estimate.set(
        "match",
        expected_matches.saturating_sub(details.fetched),
    );

    estimate.set("league_players", if done(Stage::Players) { 1 } else { 3 });
    estimate.set("league_referees", u64::from(!done(Stage::Referees)));
    estimate.set("btts_stats", 1);
    estimate.set("over25_stats", 1);

    estimate.finish()
}

/// Human readable duration, e.g. `2h 15m 30s`
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes < 60 {
        return format!("{minutes}m {secs}s");
    }
    format!("{}h {}m {}s", minutes / 60, minutes % 60, secs)
}
