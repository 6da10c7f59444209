//! League players.

use super::{run_paged_stage, Collector, CollectorContext, CollectorResult, PagedStage, StageReport};
use crate::client::Endpoint;
use crate::store::naming::player_name;
use crate::Stage;
use async_trait::async_trait;

/// Player season stats; known players are refreshed
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayersCollector;

#[async_trait]
impl Collector for PlayersCollector {
    fn stage(&self) -> Stage {
        Stage::Players
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let paged = PagedStage {
            stage: self.stage(),
            endpoint: Endpoint::LeaguePlayers,
            params: vec![("season_id", ctx.season_id().to_string())],
            refresh_existing: true,
            stored_ids: |store| store.get_all_player_ids(),
            save: |store, id, record| {
                let name = player_name(&record, id);
                store.save_player(id, &name, record)
            },
        };
        run_paged_stage(ctx, paged).await
    }
}
