//! Ingestion runner: one league season through the whole pipeline

use super::IngestError;
use crate::client::{ApiClient, RateLimiter};
use crate::collector::{pipeline, CollectorContext, GlobalStatsCollector, StageReport};
use crate::config::IngestConfig;
use crate::metrics::StageMetrics;
use crate::resume::{state_path, IngestionLock, IngestionState};
use crate::shutdown::{self, SharedShutdown};
use crate::store::global::GlobalStore;
use crate::store::{JsonFileStore, LeagueStore};
use crate::{LeagueSeason, OverallStatus, RefreshPolicy, Stage};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// What happened to one stage in a run
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StageResult {
    /// Stage ran to completion
    Completed(StageReport),
    /// Already complete and fetched only once
    Skipped,
    /// Stage stopped with an error; progress up to its last checkpoint is kept
    Failed {
        /// Error message
        error: String,
    },
}

/// Outcome of one stage
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    /// Stage
    pub stage: Stage,
    /// Result
    #[serde(flatten)]
    pub result: StageResult,
}

/// Result of running the pipeline for one league season
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// League season ingested
    pub league: LeagueSeason,
    /// Stage outcomes in pipeline order; stages after a shutdown are absent
    pub stages: Vec<StageOutcome>,
    /// Global stats refresh result, `None` when not attempted
    pub global_stats: Option<bool>,
    /// API calls this run recorded in the ledger
    pub api_calls: u64,
    /// Overall ledger status after the run
    pub status: OverallStatus,
    /// Stopped early by shutdown
    pub cancelled: bool,
    /// Wall clock time
    #[serde(skip)]
    pub duration: Duration,
}

impl RunSummary {
    /// Number of stages that failed
    pub fn failed_stages(&self) -> usize {
        self.stages
            .iter()
            .filter(|o| matches!(o.result, StageResult::Failed { .. }))
            .count()
    }

    /// Every stage ran or was skipped without error
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed_stages() == 0
    }
}

/// Tally of a multi-league update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Leagues whose every stage succeeded
    pub successful: usize,
    /// Leagues with a failed stage or a setup error
    pub failed: usize,
    /// Leagues locked by another process
    pub skipped: usize,
    /// Stopped early by shutdown
    pub cancelled: bool,
}

/// Runs the collector pipeline
pub struct IngestionRunner {
    client: Arc<ApiClient>,
    leagues_dir: PathBuf,
    state_dir: PathBuf,
    global_store: GlobalStore,
    include_global_stats: bool,
    show_progress: bool,
}

impl IngestionRunner {
    /// Build limiter, client and stores from configuration
    pub fn from_config(config: &IngestConfig) -> Result<Self, IngestError> {
        Self::from_config_with_shutdown(config, None)
    }

    /// Same as [`from_config`](Self::from_config) with a shutdown handle that
    /// interrupts quota waits and backoff sleeps
    pub fn from_config_with_shutdown(
        config: &IngestConfig,
        shutdown: Option<SharedShutdown>,
    ) -> Result<Self, IngestError> {
        config.validate()?;

        let mut limiter = RateLimiter::persistent(config.requests_per_hour, config.rate_limiter_state_path());
        if let Some(handle) = &shutdown {
            limiter = limiter.with_shutdown(handle.clone());
        }

        let mut client = ApiClient::new(config, Arc::new(limiter))?;
        if let Some(handle) = shutdown {
            client = client.with_shutdown(handle);
        }

        Ok(Self::new(
            Arc::new(client),
            config.leagues_dir(),
            config.state_dir(),
            GlobalStore::new(config.stats_dir()),
        ))
    }

    /// Runner over an existing client and explicit directories
    pub fn new(
        client: Arc<ApiClient>,
        leagues_dir: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        global_store: GlobalStore,
    ) -> Self {
        Self {
            client,
            leagues_dir: leagues_dir.into(),
            state_dir: state_dir.into(),
            global_store,
            include_global_stats: true,
            show_progress: false,
        }
    }

    /// Refresh the BTTS / Over 2.5 tables after the pipeline
    pub fn with_global_stats(mut self, include: bool) -> Self {
        self.include_global_stats = include;
        self
    }

    /// Draw progress bars for per-id stages
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// API client
    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    /// Ledger directory
    pub fn state_dir(&self) -> &std::path::Path {
        &self.state_dir
    }

    fn shutdown_requested(&self) -> bool {
        shutdown::is_requested(self.client.shutdown())
    }

    /// Ingest one league season, resuming from its ledger
    pub async fn run(&self, league: &LeagueSeason) -> Result<RunSummary, IngestError> {
        let started = Instant::now();

        let mut lock = IngestionLock::open(&state_path(&self.state_dir, league))?;
        let _guard = lock.try_hold()?;

        let store = JsonFileStore::open(&self.leagues_dir, league)?;
        let mut state = IngestionState::open(&self.state_dir, league)?;
        let calls_before = state.total_api_calls();

        match state.get_overall_status() {
            OverallStatus::Complete => info!(league = %league, "Season fully ingested before, updating"),
            OverallStatus::InProgress => info!(league = %league, "Resuming from last checkpoint"),
            OverallStatus::NotStarted => info!(league = %league, "Starting ingestion"),
        }

        store.save_metadata(json!({
            "league_key": league.league_key,
            "season_id": league.season_id,
            "season_year": league.season_year,
        }))?;

        let mut outcomes = Vec::with_capacity(Stage::ALL.len());
        let mut cancelled = false;

        for collector in pipeline() {
            let stage = collector.stage();

            if stage.policy() == RefreshPolicy::OnceOnly && state.is_collection_complete(stage) {
                info!(stage = %stage, "Already complete, skipping");
                outcomes.push(StageOutcome {
                    stage,
                    result: StageResult::Skipped,
                });
                continue;
            }
            if self.shutdown_requested() {
                cancelled = true;
                break;
            }

            let stage_metrics = StageMetrics::start(stage.as_str(), league.dir_name());
            let mut ctx = CollectorContext {
                client: &self.client,
                store: &store,
                state: &mut state,
                show_progress: self.show_progress,
            };

            match collector.collect(&mut ctx).await {
                Ok(report) => {
                    stage_metrics.record_success(report.total, report.api_calls);
                    outcomes.push(StageOutcome {
                        stage,
                        result: StageResult::Completed(report),
                    });
                }
                Err(e) => {
                    stage_metrics.record_failure(&e.to_string());
                    let stop = e.is_cancelled();
                    if stop {
                        warn!(stage = %stage, "Interrupted, progress saved up to the last checkpoint");
                    } else {
                        error!(stage = %stage, error = %e, "Stage failed, continuing with the next stage");
                    }
                    outcomes.push(StageOutcome {
                        stage,
                        result: StageResult::Failed { error: e.to_string() },
                    });
                    if stop {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        let global_stats = if self.include_global_stats && !cancelled {
            match GlobalStatsCollector.collect(&self.client, &self.global_store).await {
                Ok(()) => Some(true),
                Err(e) => {
                    error!(error = %e, "Global stats refresh failed");
                    Some(false)
                }
            }
        } else {
            None
        };

        let status = state.get_overall_status();
        if status == OverallStatus::Complete {
            state.mark_complete()?;
        }

        let summary = RunSummary {
            league: league.clone(),
            stages: outcomes,
            global_stats,
            api_calls: state.total_api_calls().saturating_sub(calls_before),
            status,
            cancelled,
            duration: started.elapsed(),
        };

        info!(
            league = %league,
            status = %summary.status,
            api_calls = summary.api_calls,
            failed_stages = summary.failed_stages(),
            cancelled = summary.cancelled,
            duration_secs = summary.duration.as_secs(),
            "Ingestion run finished"
        );
        Ok(summary)
    }

    /// Ingest several league seasons in sequence
    ///
    /// A league with a failed stage or a setup error counts as failed, a
    /// league locked by another process as skipped. Shutdown stops the batch.
    pub async fn run_many(&self, leagues: &[LeagueSeason]) -> BatchSummary {
        let mut batch = BatchSummary::default();

        for (idx, league) in leagues.iter().enumerate() {
            if self.shutdown_requested() {
                batch.cancelled = true;
                break;
            }
            info!(league = %league, position = idx + 1, of = leagues.len(), "Updating league");

            match self.run(league).await {
                Ok(summary) if summary.cancelled => {
                    batch.cancelled = true;
                    break;
                }
                Ok(summary) if summary.is_success() => batch.successful += 1,
                Ok(_) => batch.failed += 1,
                Err(e) if e.is_locked() => {
                    warn!(league = %league, error = %e, "League is being ingested elsewhere, skipping");
                    batch.skipped += 1;
                }
                Err(e) => {
                    error!(league = %league, error = %e, "League update failed");
                    batch.failed += 1;
                }
            }
        }

        info!(
            successful = batch.successful,
            failed = batch.failed,
            skipped = batch.skipped,
            "Bulk update finished"
        );
        batch
    }
}

impl std::fmt::Debug for IngestionRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionRunner")
            .field("leagues_dir", &self.leagues_dir)
            .field("state_dir", &self.state_dir)
            .field("include_global_stats", &self.include_global_stats)
            .finish()
    }
}
