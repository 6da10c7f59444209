//! Head-to-head summaries derived from stored matches
//!
//! No network calls. Every run regenerates the file of each unordered team
//! pair that has at least one stored match between the two teams. The lower
//! team id is always `team_a`.

use super::match_details::is_completed;
use super::{Collector, CollectorContext, CollectorError, CollectorResult, StageReport};
use crate::store::naming::as_id;
use crate::store::h2h_key;
use crate::Stage;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Aggregate record of one team pair over their completed matches
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeadToHeadSummary {
    /// Completed matches between the two teams
    pub total_matches: u64,
    /// Wins of `team_a`
    pub team_a_wins: u64,
    /// Wins of `team_b`
    pub team_b_wins: u64,
    /// Draws
    pub draws: u64,
    /// `team_a` win rate in percent
    pub team_a_win_percentage: f64,
    /// `team_b` win rate in percent
    pub team_b_win_percentage: f64,
    /// Draw rate in percent
    pub draw_percentage: f64,
    /// Goals scored by `team_a`
    pub team_a_goals: u64,
    /// Goals scored by `team_b`
    pub team_b_goals: u64,
    /// `team_a` goals per match
    pub team_a_avg_goals: f64,
    /// `team_b` goals per match
    pub team_b_avg_goals: f64,
    /// Matches where both teams scored
    pub btts_count: u64,
    /// Both-teams-scored rate in percent
    pub btts_percentage: f64,
    /// Matches with 2+ goals
    pub over15_count: u64,
    /// Over 1.5 rate in percent
    pub over15_percentage: f64,
    /// Matches with 3+ goals
    pub over25_count: u64,
    /// Over 2.5 rate in percent
    pub over25_percentage: f64,
    /// Matches with 4+ goals
    pub over35_count: u64,
    /// Over 3.5 rate in percent
    pub over35_percentage: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(count as f64 / total as f64 * 100.0)
}

fn average(sum: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(sum as f64 / total as f64)
}

fn goals(record: &Value, field: &str) -> u64 {
    record
        .get(field)
        .and_then(as_id)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

/// Home and away team ids of a match record
fn teams_of(record: &Value) -> Option<(i64, i64)> {
    let home = as_id(record.get("homeID")?)?;
    let away = as_id(record.get("awayID")?)?;
    Some((home, away))
}

impl HeadToHeadSummary {
    /// Summarise the completed matches in `matches` from `team_a`'s side
    pub fn from_matches(matches: &[Value], team_a: i64) -> Self {
        let mut summary = HeadToHeadSummary::default();

        for record in matches.iter().filter(|m| is_completed(m)) {
            let Some((home, _)) = teams_of(record) else {
                continue;
            };
            let home_goals = goals(record, "homeGoalCount");
            let away_goals = goals(record, "awayGoalCount");
            let (a, b) = if home == team_a {
                (home_goals, away_goals)
            } else {
                (away_goals, home_goals)
            };

            summary.total_matches += 1;
            summary.team_a_goals += a;
            summary.team_b_goals += b;
            match a.cmp(&b) {
                std::cmp::Ordering::Greater => summary.team_a_wins += 1,
                std::cmp::Ordering::Less => summary.team_b_wins += 1,
                std::cmp::Ordering::Equal => summary.draws += 1,
            }
            if a > 0 && b > 0 {
                summary.btts_count += 1;
            }
            let total_goals = a + b;
            if total_goals >= 2 {
                summary.over15_count += 1;
            }
            if total_goals >= 3 {
                summary.over25_count += 1;
            }
            if total_goals >= 4 {
                summary.over35_count += 1;
            }
        }

        let n = summary.total_matches;
        summary.team_a_win_percentage = percentage(summary.team_a_wins, n);
        summary.team_b_win_percentage = percentage(summary.team_b_wins, n);
        summary.draw_percentage = percentage(summary.draws, n);
        summary.team_a_avg_goals = average(summary.team_a_goals, n);
        summary.team_b_avg_goals = average(summary.team_b_goals, n);
        summary.btts_percentage = percentage(summary.btts_count, n);
        summary.over15_percentage = percentage(summary.over15_count, n);
        summary.over25_percentage = percentage(summary.over25_count, n);
        summary.over35_percentage = percentage(summary.over35_count, n);
        summary
    }
}

/// Group match records by canonical team pair, keeping only pairs of known teams
fn group_by_pair(matches: Vec<Value>, teams: &BTreeSet<i64>) -> BTreeMap<(i64, i64), Vec<Value>> {
    let mut pairs: BTreeMap<(i64, i64), Vec<Value>> = BTreeMap::new();
    for record in matches {
        let Some((home, away)) = teams_of(&record) else {
            continue;
        };
        if home == away || !teams.contains(&home) || !teams.contains(&away) {
            continue;
        }
        pairs.entry(h2h_key(home, away)).or_default().push(record);
    }
    pairs
}

/// Regenerates every head-to-head file from stored matches
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadToHeadCollector;

#[async_trait]
impl Collector for HeadToHeadCollector {
    fn stage(&self) -> Stage {
        Stage::HeadToHead
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let stage = self.stage();
        let teams: BTreeSet<i64> = ctx.store.get_all_team_ids().into_iter().collect();
        if teams.len() < 2 {
            return Err(CollectorError::Precondition {
                stage,
                reason: "fewer than two teams stored".to_string(),
            });
        }

        let matches: Vec<Value> = ctx
            .store
            .get_all_match_ids()
            .into_iter()
            .filter_map(|id| ctx.store.load_match(id))
            .collect();
        if matches.is_empty() {
            return Err(CollectorError::Precondition {
                stage,
                reason: "no matches stored, collect matches first".to_string(),
            });
        }

        if ctx.state.is_collection_complete(stage) {
            info!(stage = %stage, "Regenerating head-to-head data from updated matches");
        } else {
            info!(stage = %stage, "Generating head-to-head data from matches");
        }
        ctx.state.mark_collection_in_progress(stage)?;

        let existing: BTreeSet<(i64, i64)> = ctx.store.h2h_pairs().into_iter().collect();
        let pairs = group_by_pair(matches, &teams);
        let pb = ctx.progress_bar(pairs.len() as u64, "Head-to-head");

        let mut report = StageReport::default();
        for ((team_a, team_b), pair_matches) in pairs {
            pb.inc(1);
            let stats = HeadToHeadSummary::from_matches(&pair_matches, team_a);
            let document = json!({
                "team_a_id": team_a,
                "team_b_id": team_b,
                "matches": pair_matches,
                "stats": stats,
            });

            match ctx.store.save_h2h(team_a, team_b, document) {
                Ok(()) if existing.contains(&(team_a, team_b)) => report.updated += 1,
                Ok(()) => report.new += 1,
                Err(e) => warn!(stage = %stage, team_a = team_a, team_b = team_b, error = %e, "Failed to save head-to-head"),
            }
        }
        pb.finish_and_clear();

        report.total = report.new + report.updated;
        ctx.state.record_h2h_generated(report.total)?;
        ctx.state.mark_collection_complete(stage)?;

        info!(stage = %stage, pairs = report.total, "Head-to-head data generated");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(home: i64, away: i64, home_goals: u64, away_goals: u64) -> Value {
        json!({
            "id": home * 1000 + away,
            "homeID": home,
            "awayID": away,
            "homeGoalCount": home_goals,
            "awayGoalCount": away_goals,
            "status": "complete",
        })
    }

    #[test]
    fn test_summary_from_lower_team_side() {
        let matches = vec![
            fixture(1, 2, 2, 1),
            fixture(2, 1, 3, 3),
            fixture(2, 1, 1, 0),
            json!({"homeID": 1, "awayID": 2, "status": "incomplete", "homeGoalCount": 0, "awayGoalCount": 0}),
        ];
        let s = HeadToHeadSummary::from_matches(&matches, 1);

        assert_eq!(s.total_matches, 3);
        assert_eq!((s.team_a_wins, s.team_b_wins, s.draws), (1, 1, 1));
        assert_eq!((s.team_a_goals, s.team_b_goals), (5, 5));
        assert_eq!(s.team_a_win_percentage, 33.33);
        assert_eq!(s.team_a_avg_goals, 1.67);
        assert_eq!(s.btts_count, 2);
        assert_eq!((s.over15_count, s.over25_count, s.over35_count), (2, 2, 1));
        assert_eq!(s.over35_percentage, 33.33);
    }

    #[test]
    fn test_summary_without_completed_matches() {
        let s = HeadToHeadSummary::from_matches(&[], 7);
        assert_eq!(s, HeadToHeadSummary::default());
    }

    #[test]
    fn test_group_by_pair_is_order_insensitive() {
        let teams: BTreeSet<i64> = [1, 2, 3].into_iter().collect();
        let pairs = group_by_pair(
            vec![fixture(2, 1, 0, 0), fixture(1, 2, 1, 0), fixture(3, 9, 1, 1), fixture(3, 3, 0, 0)],
            &teams,
        );
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[&(1, 2)].len(), 2);
    }
}
