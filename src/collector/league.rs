//! League season statistics and standings.

use super::{failed_call, finish_single_call, Collector, CollectorContext, CollectorError, CollectorResult, StageReport};
use crate::Stage;
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

/// `league_stats.json`: the first element when the API returns a list
#[derive(Debug, Clone, Copy, Default)]
pub struct LeagueStatsCollector;

/// The stats object out of `data`
fn season_stats(data: Value) -> Option<Value> {
    match data {
        Value::Array(items) => items.into_iter().next(),
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map)),
        _ => None,
    }
}

#[async_trait]
impl Collector for LeagueStatsCollector {
    fn stage(&self) -> Stage {
        Stage::LeagueStats
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let stage = self.stage();
        ctx.state.mark_collection_in_progress(stage)?;

        let stats = match ctx.client.league_stats(ctx.season_id()).await {
            Ok(response) if response.success => season_stats(response.data),
            Ok(_) => return Err(failed_call(ctx.state, stage, CollectorError::Unsuccessful { stage })),
            Err(e) => return Err(failed_call(ctx.state, stage, CollectorError::api(stage, e))),
        };
        let Some(stats) = stats else {
            return Err(failed_call(ctx.state, stage, CollectorError::NoData { stage }));
        };

        ctx.store
            .save_league_stats(stats)
            .map_err(|source| failed_call(ctx.state, stage, CollectorError::Store { stage, source }))?;

        info!(season_id = ctx.season_id(), "League stats saved");
        finish_single_call(ctx.state, stage)
    }
}

/// `league_table.json`: the whole response envelope
#[derive(Debug, Clone, Copy, Default)]
pub struct LeagueTableCollector;

#[async_trait]
impl Collector for LeagueTableCollector {
    fn stage(&self) -> Stage {
        Stage::LeagueTable
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let stage = self.stage();
        ctx.state.mark_collection_in_progress(stage)?;

        let response = match ctx.client.league_table(ctx.season_id()).await {
            Ok(response) if !response.success => {
                return Err(failed_call(ctx.state, stage, CollectorError::Unsuccessful { stage }))
            }
            Ok(response) if response.is_empty() => {
                return Err(failed_call(ctx.state, stage, CollectorError::NoData { stage }))
            }
            Ok(response) => response,
            Err(e) => return Err(failed_call(ctx.state, stage, CollectorError::api(stage, e))),
        };

        ctx.store
            .save_league_table(response.to_value())
            .map_err(|source| failed_call(ctx.state, stage, CollectorError::Store { stage, source }))?;

        info!(season_id = ctx.season_id(), "League table saved");
        finish_single_call(ctx.state, stage)
    }
}
