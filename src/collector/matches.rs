//! League fixtures and results.

use super::{run_paged_stage, Collector, CollectorContext, CollectorResult, PagedStage, StageReport};
use crate::client::Endpoint;
use crate::config::MATCHES_PER_PAGE;
use crate::Stage;
use async_trait::async_trait;

/// Every match of the season; known matches are re-saved so status
/// transitions (fixture to complete) land on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchesCollector;

#[async_trait]
impl Collector for MatchesCollector {
    fn stage(&self) -> Stage {
        Stage::Matches
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let paged = PagedStage {
            stage: self.stage(),
            endpoint: Endpoint::LeagueMatches,
            params: vec![
                ("season_id", ctx.season_id().to_string()),
                ("max_per_page", MATCHES_PER_PAGE.to_string()),
            ],
            refresh_existing: true,
            stored_ids: |store| store.get_all_match_ids(),
            save: |store, id, record| store.save_match(id, record),
        };
        run_paged_stage(ctx, paged).await
    }
}
