//! Teams and their rolling last-N form.

use super::{
    abort_on, run_paged_stage, Checkpointer, Collector, CollectorContext, CollectorError, CollectorResult,
    PagedStage, StageReport,
};
use crate::client::Endpoint;
use crate::config::LASTX_CHECKPOINT_INTERVAL;
use crate::store::naming::team_name;
use crate::Stage;
use async_trait::async_trait;
use tracing::{info, warn};

/// League teams with stats; known teams are not re-saved
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamsCollector;

#[async_trait]
impl Collector for TeamsCollector {
    fn stage(&self) -> Stage {
        Stage::Teams
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let paged = PagedStage {
            stage: self.stage(),
            endpoint: Endpoint::LeagueTeams,
            params: vec![
                ("season_id", ctx.season_id().to_string()),
                ("include", "stats".to_string()),
            ],
            refresh_existing: false,
            stored_ids: |store| store.get_all_team_ids(),
            save: |store, id, record| {
                let name = team_name(&record, id);
                store.save_team(id, &name, record)
            },
        };
        run_paged_stage(ctx, paged).await
    }
}

/// Last-N form for every stored team, refreshed on every run
#[derive(Debug, Clone, Copy, Default)]
pub struct TeamLastXCollector;

#[async_trait]
impl Collector for TeamLastXCollector {
    fn stage(&self) -> Stage {
        Stage::TeamLastX
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let stage = self.stage();
        let team_ids = ctx.store.get_all_team_ids();
        if team_ids.is_empty() {
            return Err(CollectorError::Precondition {
                stage,
                reason: "no teams stored, collect teams first".to_string(),
            });
        }

        ctx.state.mark_collection_in_progress(stage)?;
        let total = team_ids.len() as u64;
        info!(stage = %stage, teams = total, "Fetching last-N form for all teams");

        let mut report = StageReport::default();
        let mut refreshed: u64 = 0;
        let mut checkpoint = Checkpointer::new(stage, LASTX_CHECKPOINT_INTERVAL);
        let known = ctx.state.fetched_ids(stage);
        let pb = ctx.progress_bar(total, "Team form");

        for team_id in team_ids {
            pb.inc(1);
            let Some(team) = ctx.store.load_team(team_id) else {
                warn!(stage = %stage, team_id = team_id, "Stored team unreadable, skipping");
                continue;
            };
            let name = team_name(&team, team_id);

            let result = ctx.client.team_lastx(team_id).await;
            report.api_calls += 1;
            checkpoint.record_call();

            match result {
                Ok(response) if response.success && !response.is_empty() => {
                    match ctx.store.save_team_lastx(team_id, &name, response.data) {
                        Ok(()) => {
                            refreshed += 1;
                            if known.contains(&team_id) {
                                report.updated += 1;
                            } else {
                                report.new += 1;
                            }
                            checkpoint.add_id(team_id);
                        }
                        Err(e) => warn!(stage = %stage, team_id = team_id, error = %e, "Failed to save team form"),
                    }
                }
                Ok(_) => warn!(stage = %stage, team_id = team_id, "No form data returned"),
                Err(e) => {
                    if let Some(fatal) = abort_on(stage, e) {
                        checkpoint.flush(ctx.state, refreshed, total)?;
                        pb.abandon();
                        return Err(fatal);
                    }
                }
            }

            if checkpoint.due() {
                checkpoint.flush(ctx.state, refreshed, total)?;
            }
            if ctx.shutdown_requested() {
                checkpoint.flush(ctx.state, refreshed, total)?;
                pb.abandon();
                return Err(CollectorError::Cancelled { stage });
            }
        }

        checkpoint.flush(ctx.state, refreshed, total)?;
        pb.finish_and_clear();
        ctx.state.mark_collection_complete(stage)?;

        report.total = refreshed;
        info!(stage = %stage, refreshed = refreshed, teams = total, "Team form collected");
        Ok(report)
    }
}
