//! `status` and `rate-limit` commands

use super::{Cli, CliError, OutputFormat};
use crate::client::RateLimiter;
use crate::config::{rate_limiter_state_path, state_dir};
use crate::ingest::estimate_api_calls;
use crate::resume::IngestionState;
use crate::{Stage, StageStatus};
use clap::Args;

/// Status subcommand
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only show ledgers of this league key
    #[arg(long)]
    pub league: Option<String>,
}

impl StatusCommand {
    /// Execute the status command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let mut states = IngestionState::list_all(&state_dir(&cli.data_dir));
        if let Some(league) = &self.league {
            states.retain(|s| s.league() == league);
        }

        match cli.output_format {
            OutputFormat::Json => {
                let summaries: Vec<_> = states.iter().map(IngestionState::summary).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summaries).map_err(|e| CliError::OutputError(e.to_string()))?
                );
            }
            OutputFormat::Human => print_status_table(&states),
        }
        Ok(())
    }
}

fn stage_cell(state: &IngestionState, stage: Stage) -> String {
    let collection = state.collection(stage);
    match collection.status {
        StageStatus::Complete => "done".to_string(),
        StageStatus::InProgress => format!("{}/{}", collection.fetched, collection.total),
        StageStatus::Pending => "-".to_string(),
    }
}

fn print_status_table(states: &[IngestionState]) {
    if states.is_empty() {
        println!("No ingestion ledgers found");
        return;
    }

    println!(
        "{:<32} {:<10} {:<12} {:>6}  {:>9}  {:>9}  {:>10}  {}",
        "league", "season", "status", "stages", "matches", "details", "api calls", "last updated"
    );
    for state in states {
        let summary = state.summary();
        println!(
            "{:<32} {:<10} {:<12} {:>6}  {:>9}  {:>9}  {:>10}  {}",
            state.league(),
            state.season_id(),
            summary.status.to_string(),
            format!("{}/{}", summary.stages_complete, summary.stages_total),
            stage_cell(state, Stage::Matches),
            stage_cell(state, Stage::MatchDetails),
            summary.total_api_calls,
            summary.last_updated.format("%Y-%m-%d %H:%M")
        );
        let remaining = estimate_api_calls(state).total;
        if summary.status != crate::OverallStatus::Complete {
            println!("{:<32} ~{remaining} calls to finish", "");
        }
    }
}

/// Rate-limit subcommand
#[derive(Debug, Args)]
pub struct RateLimitCommand {}

impl RateLimitCommand {
    /// Execute the rate-limit command
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let limiter = RateLimiter::persistent(cli.requests_per_hour, rate_limiter_state_path(&cli.data_dir));
        let status = limiter.get_status();

        match cli.output_format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::to_string(&status).map_err(|e| CliError::OutputError(e.to_string()))?
            ),
            OutputFormat::Human => {
                println!(
                    "Rate limit: {}/{} used, {} remaining",
                    status.calls_this_hour, status.requests_per_hour, status.remaining
                );
                println!(
                    "Window started {}, resets in {}s",
                    status.current_hour_start.format("%Y-%m-%d %H:%M:%S UTC"),
                    status.reset_in_secs
                );
            }
        }
        Ok(())
    }
}
