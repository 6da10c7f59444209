//! `ingest` and `update` commands

use super::{Cli, CliError, OutputFormat};
use crate::ingest::{
    estimate_api_calls, format_duration, BatchSummary, IngestionRunner, RunSummary, StageResult,
};
use crate::resume::{state_path, IngestionState};
use crate::shutdown::SharedShutdown;
use crate::LeagueSeason;
use clap::Args;
use tracing::info;

/// Arguments for ingesting one league season
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// League key (e.g., england_premier_league)
    #[arg(long)]
    pub league: String,

    /// API season id
    #[arg(long)]
    pub season_id: i64,

    /// Display year (e.g., 2023/2024)
    #[arg(long, default_value = "")]
    pub season_year: String,

    /// Do not refresh the global BTTS / Over 2.5 tables
    #[arg(long, default_value_t = false)]
    pub skip_global_stats: bool,
}

impl IngestArgs {
    /// League season named by the arguments
    pub fn league_season(&self) -> Result<LeagueSeason, CliError> {
        let raw = format!("{}:{}:{}", self.league, self.season_id, self.season_year);
        raw.parse().map_err(CliError::InvalidArgument)
    }

    /// Execute the ingest command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = cli.ingest_config()?;
        let league = self.league_season()?;

        if let Ok(state) = IngestionState::load(&state_path(&config.state_dir(), &league)) {
            let estimate = estimate_api_calls(&state);
            info!(
                league = %league,
                status = %state.get_overall_status(),
                estimated_calls = estimate.total,
                "Ingestion plan"
            );
        }

        let runner = IngestionRunner::from_config_with_shutdown(&config, Some(shutdown))?
            .with_global_stats(!self.skip_global_stats)
            .with_progress(!cli.no_progress && cli.output_format == OutputFormat::Human);

        let summary = runner.run(&league).await?;
        let quota = runner.client().rate_limiter().get_status();

        match cli.output_format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "summary": summary,
                    "duration_secs": summary.duration.as_secs(),
                    "rate_limit": quota,
                });
                println!(
                    "{}",
                    serde_json::to_string(&output).map_err(|e| CliError::OutputError(e.to_string()))?
                );
            }
            OutputFormat::Human => {
                print_run_summary(&summary);
                println!(
                    "Rate limit: {}/{} used, {} remaining",
                    quota.calls_this_hour, quota.requests_per_hour, quota.remaining
                );
            }
        }

        if summary.cancelled {
            return Err(CliError::Incomplete(
                "interrupted, progress saved; run again to resume".to_string(),
            ));
        }
        if summary.failed_stages() > 0 {
            return Err(CliError::Incomplete(format!(
                "{} stage(s) failed; run again to resume",
                summary.failed_stages()
            )));
        }
        Ok(())
    }
}

/// Arguments for updating several league seasons
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// League seasons as `league_key:season_id[:season_year]`
    #[arg(required = true, value_parser = parse_league_season)]
    pub leagues: Vec<LeagueSeason>,

    /// Do not refresh the global BTTS / Over 2.5 tables
    #[arg(long, default_value_t = false)]
    pub skip_global_stats: bool,
}

fn parse_league_season(s: &str) -> Result<LeagueSeason, String> {
    s.parse()
}

impl UpdateArgs {
    /// Execute the update command
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let config = cli.ingest_config()?;
        let runner = IngestionRunner::from_config_with_shutdown(&config, Some(shutdown))?
            .with_global_stats(!self.skip_global_stats)
            .with_progress(!cli.no_progress && cli.output_format == OutputFormat::Human);

        let batch = runner.run_many(&self.leagues).await;

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string(&batch).map_err(|e| CliError::OutputError(e.to_string()))?
            ),
            OutputFormat::Human => print_batch_summary(&batch),
        }

        if batch.cancelled {
            return Err(CliError::Incomplete("bulk update interrupted".to_string()));
        }
        if batch.failed > 0 {
            return Err(CliError::Incomplete(format!("{} league(s) failed", batch.failed)));
        }
        Ok(())
    }
}

fn print_run_summary(summary: &RunSummary) {
    println!("\nIngestion of {} finished: {}", summary.league, summary.status);
    for outcome in &summary.stages {
        match &outcome.result {
            StageResult::Completed(report) => println!(
                "  {:<14} {} new, {} updated, {} total ({} calls)",
                outcome.stage.as_str(),
                report.new,
                report.updated,
                report.total,
                report.api_calls
            ),
            StageResult::Skipped => println!("  {:<14} already complete", outcome.stage.as_str()),
            StageResult::Failed { error } => println!("  {:<14} FAILED: {error}", outcome.stage.as_str()),
        }
    }
    match summary.global_stats {
        Some(true) => println!("  {:<14} refreshed", "global_stats"),
        Some(false) => println!("  {:<14} FAILED", "global_stats"),
        None => {}
    }
    println!("Duration: {}", format_duration(summary.duration.as_secs()));
    println!("API calls: {}", summary.api_calls);
    if summary.cancelled {
        println!("Interrupted. Progress has been saved, run again to resume.");
    }
}

fn print_batch_summary(batch: &BatchSummary) {
    println!("\nBulk update complete");
    println!("Successful: {}", batch.successful);
    println!("Failed: {}", batch.failed);
    println!("Skipped: {}", batch.skipped);
}
