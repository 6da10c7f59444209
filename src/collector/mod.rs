//! Per-stage collectors
//!
//! Each ingestion stage is a [`Collector`]. The shared lifecycle is:
//! mark the stage in progress, seed the known ids from disk and ledger,
//! fetch and save every record, checkpoint after every page (per-id stages
//! every N calls), mark the stage complete. A collector returns `Err` on a
//! fatal failure and leaves its last checkpoint behind; the runner logs it
//! and moves on to the next stage.

pub mod global_stats;
pub mod h2h;
pub mod league;
pub mod match_details;
pub mod matches;
pub mod pagination;
pub mod players;
pub mod referees;
pub mod teams;

pub use global_stats::GlobalStatsCollector;
pub use h2h::{HeadToHeadCollector, HeadToHeadSummary};
pub use league::{LeagueStatsCollector, LeagueTableCollector};
pub use match_details::MatchDetailsCollector;
pub use matches::MatchesCollector;
pub use pagination::{Page, PageCursor, PageError};
pub use players::PlayersCollector;
pub use referees::RefereesCollector;
pub use teams::{TeamLastXCollector, TeamsCollector};

use crate::client::{ApiClient, ApiError, Endpoint};
use crate::resume::{IngestionState, StateError};
use crate::shutdown;
use crate::store::naming::entity_id;
use crate::store::{LeagueStore, StoreError, StoreResult};
use crate::Stage;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Collector errors
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// A single-call stage could not fetch its data
    #[error("{stage}: request failed: {source}")]
    Api {
        /// Stage
        stage: Stage,
        /// Client failure
        #[source]
        source: ApiError,
    },

    /// Envelope reported `success: false`
    #[error("{stage}: API reported failure")]
    Unsuccessful {
        /// Stage
        stage: Stage,
    },

    /// API returned no records at all
    #[error("{stage}: no data returned")]
    NoData {
        /// Stage
        stage: Stage,
    },

    /// Paging stopped before the last page; progress up to it is saved
    #[error("{stage}: {source}")]
    Page {
        /// Stage
        stage: Stage,
        /// Page failure
        #[source]
        source: PageError,
    },

    /// An upstream stage has not produced what this stage needs
    #[error("{stage}: {reason}")]
    Precondition {
        /// Stage
        stage: Stage,
        /// What is missing
        reason: String,
    },

    /// Fetched data could not be written
    #[error("{stage}: failed to save: {source}")]
    Store {
        /// Stage
        stage: Stage,
        /// Store failure
        #[source]
        source: StoreError,
    },

    /// Shutdown requested; progress up to the last checkpoint is saved
    #[error("{stage}: interrupted by shutdown")]
    Cancelled {
        /// Stage
        stage: Stage,
    },

    /// Ledger could not be written
    #[error("ledger update failed: {0}")]
    State(#[from] StateError),

    /// Global statistics tables could not be refreshed
    #[error("global stats: {0}")]
    GlobalStats(String),
}

impl CollectorError {
    /// Map a client failure of a single-call stage
    pub fn api(stage: Stage, source: ApiError) -> Self {
        match source {
            ApiError::Cancelled { .. } => CollectorError::Cancelled { stage },
            source => CollectorError::Api { stage, source },
        }
    }

    /// Map a paging failure
    pub fn page(stage: Stage, source: PageError) -> Self {
        match source {
            PageError::Request {
                source: ApiError::Cancelled { .. },
                ..
            } => CollectorError::Cancelled { stage },
            source => CollectorError::Page { stage, source },
        }
    }

    /// Whether the run should stop instead of moving to the next stage
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CollectorError::Cancelled { .. })
    }
}

/// Result type for collectors
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Outcome of one stage run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Records not seen before
    pub new: u64,
    /// Previously known records written again
    pub updated: u64,
    /// Known records left untouched
    pub unchanged: u64,
    /// Records known after the run
    pub total: u64,
    /// Logical API calls made
    pub api_calls: u64,
}

/// What a collector works with
pub struct CollectorContext<'a> {
    /// API client
    pub client: &'a ApiClient,
    /// League store
    pub store: &'a dyn LeagueStore,
    /// Ledger of the league season
    pub state: &'a mut IngestionState,
    /// Draw terminal progress bars for per-id worklists
    pub show_progress: bool,
}

impl CollectorContext<'_> {
    /// Season being ingested
    pub fn season_id(&self) -> i64 {
        self.state.season_id()
    }

    /// Whether Ctrl+C was pressed
    pub fn shutdown_requested(&self) -> bool {
        shutdown::is_requested(self.client.shutdown())
    }

    fn progress_bar(&self, len: u64, message: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb
    }
}

/// One ingestion stage
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stage this collector fills
    fn stage(&self) -> Stage;

    /// Run the stage
    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport>;
}

/// Every league-scoped collector in pipeline order
pub fn pipeline() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(LeagueStatsCollector),
        Box::new(LeagueTableCollector),
        Box::new(TeamsCollector),
        Box::new(TeamLastXCollector),
        Box::new(MatchesCollector),
        Box::new(MatchDetailsCollector),
        Box::new(PlayersCollector),
        Box::new(RefereesCollector),
        Box::new(HeadToHeadCollector),
    ]
}

/// Description of a paged list stage
pub(crate) struct PagedStage {
    pub stage: Stage,
    pub endpoint: Endpoint,
    pub params: Vec<(&'static str, String)>,
    /// Re-save records that are already known
    pub refresh_existing: bool,
    pub stored_ids: fn(&dyn LeagueStore) -> Vec<i64>,
    pub save: fn(&dyn LeagueStore, i64, Value) -> StoreResult<()>,
}

/// Walk every page of a list endpoint, saving records and checkpointing the
/// merged id set after each page.
pub(crate) async fn run_paged_stage(
    ctx: &mut CollectorContext<'_>,
    paged: PagedStage,
) -> CollectorResult<StageReport> {
    let stage = paged.stage;
    let refreshing = ctx.state.is_collection_complete(stage);
    ctx.state.mark_collection_in_progress(stage)?;

    let mut known: BTreeSet<i64> = (paged.stored_ids)(ctx.store).into_iter().collect();
    known.extend(ctx.state.fetched_ids(stage));

    if refreshing {
        info!(stage = %stage, known = known.len(), "Checking for new records and updating existing");
    } else {
        info!(stage = %stage, known = known.len(), "Fetching records");
    }

    let mut seen: BTreeSet<i64> = BTreeSet::new();
    let mut report = StageReport::default();
    let mut cursor = PageCursor::new(paged.endpoint, paged.params);

    loop {
        let page = match cursor.next(ctx.client).await {
            Ok(Some(page)) => page,
            Ok(None) => break,
            Err(e) => {
                let fetched = known.union(&seen).count() as u64;
                let calls = u64::from(!matches!(e, PageError::TooManyPages(_)));
                if let Err(state_err) =
                    ctx.state
                        .update_collection_progress(stage, fetched, None, std::iter::empty(), calls)
                {
                    warn!(stage = %stage, error = %state_err, "Failed to record failed page");
                }
                return Err(CollectorError::page(stage, e));
            }
        };
        report.api_calls += 1;

        let page_number = page.number;
        let record_count = page.records.len();
        let mut page_ids = Vec::with_capacity(record_count);

        for record in page.records {
            let Some(id) = entity_id(&record) else {
                warn!(stage = %stage, page = page_number, "Record without id skipped");
                continue;
            };

            if !paged.refresh_existing && known.contains(&id) {
                report.unchanged += 1;
                page_ids.push(id);
                continue;
            }

            match (paged.save)(ctx.store, id, record) {
                Ok(()) => {
                    if known.contains(&id) {
                        report.updated += 1;
                    } else {
                        report.new += 1;
                    }
                    page_ids.push(id);
                }
                Err(e) => warn!(stage = %stage, id = id, error = %e, "Failed to save record"),
            }
        }

        seen.extend(page_ids.iter().copied());
        let fetched = known.union(&seen).count() as u64;
        ctx.state
            .update_collection_progress(stage, fetched, Some(fetched), page_ids, 1)?;

        info!(
            stage = %stage,
            page = page_number,
            records = record_count,
            fetched = fetched,
            "Page saved"
        );

        if ctx.shutdown_requested() {
            return Err(CollectorError::Cancelled { stage });
        }
    }

    let total = known.union(&seen).count() as u64;
    if total == 0 {
        return Err(CollectorError::NoData { stage });
    }
    report.total = total;

    ctx.state.mark_collection_complete(stage)?;
    info!(
        stage = %stage,
        total = total,
        new = report.new,
        updated = report.updated,
        "Stage collected"
    );
    Ok(report)
}

/// Batches ledger checkpoints for per-id worklists
pub(crate) struct Checkpointer {
    stage: Stage,
    every: u64,
    pending_calls: u64,
    pending_ids: Vec<i64>,
}

impl Checkpointer {
    pub fn new(stage: Stage, every: u64) -> Self {
        Self {
            stage,
            every: every.max(1),
            pending_calls: 0,
            pending_ids: Vec::new(),
        }
    }

    pub fn record_call(&mut self) {
        self.pending_calls += 1;
    }

    pub fn add_id(&mut self, id: i64) {
        self.pending_ids.push(id);
    }

    pub fn due(&self) -> bool {
        self.pending_calls >= self.every
    }

    pub fn flush(&mut self, state: &mut IngestionState, fetched: u64, total: u64) -> Result<(), StateError> {
        let ids = std::mem::take(&mut self.pending_ids);
        let calls = std::mem::take(&mut self.pending_calls);
        state.update_collection_progress(self.stage, fetched, Some(total), ids, calls)
    }
}

/// Record the API call of a failed single-call stage and pass the error on
pub(crate) fn failed_call(state: &mut IngestionState, stage: Stage, error: CollectorError) -> CollectorError {
    let fetched = state.collection(stage).fetched;
    if let Err(state_err) = state.update_collection_progress(stage, fetched, None, std::iter::empty(), 1) {
        warn!(stage = %stage, error = %state_err, "Failed to record failed call");
    }
    error
}

/// Checkpoint and complete a stage that stores one document from one call
pub(crate) fn finish_single_call(state: &mut IngestionState, stage: Stage) -> CollectorResult<StageReport> {
    state.update_collection_progress(stage, 1, Some(1), std::iter::empty(), 1)?;
    state.mark_collection_complete(stage)?;
    Ok(StageReport {
        updated: 1,
        total: 1,
        api_calls: 1,
        ..StageReport::default()
    })
}

/// Whether a per-id fetch failure must end the stage; other failures skip the id
pub(crate) fn abort_on(stage: Stage, error: ApiError) -> Option<CollectorError> {
    if error.is_fatal() {
        Some(CollectorError::api(stage, error))
    } else {
        warn!(stage = %stage, error = %error, "Skipping after failed request");
        None
    }
}
