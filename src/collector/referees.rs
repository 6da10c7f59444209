//! League referees.

use super::{run_paged_stage, Collector, CollectorContext, CollectorResult, PagedStage, StageReport};
use crate::client::Endpoint;
use crate::store::naming::referee_name;
use crate::Stage;
use async_trait::async_trait;

/// Referees of the season, fetched once; known referees are not re-saved
#[derive(Debug, Clone, Copy, Default)]
pub struct RefereesCollector;

#[async_trait]
impl Collector for RefereesCollector {
    fn stage(&self) -> Stage {
        Stage::Referees
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let paged = PagedStage {
            stage: self.stage(),
            endpoint: Endpoint::LeagueReferees,
            params: vec![("season_id", ctx.season_id().to_string())],
            refresh_existing: false,
            stored_ids: |store| store.get_all_referee_ids(),
            save: |store, id, record| {
                let name = referee_name(&record, id);
                store.save_referee(id, &name, record)
            },
        };
        run_paged_stage(ctx, paged).await
    }
}
