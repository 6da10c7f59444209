//! CLI command implementations

pub mod error;
pub mod ingest;
pub mod status;

pub use error::CliError;
pub use ingest::{IngestArgs, UpdateArgs};
pub use status::{RateLimitCommand, StatusCommand};

use crate::config::{IngestConfig, DEFAULT_API_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_REQUESTS_PER_HOUR};
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Football statistics ingestion CLI
#[derive(Parser, Debug)]
#[command(name = "footy-ingest")]
#[command(about = "Resumable, rate-limited ingestion of football statistics", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// API key
    #[arg(long, global = true, env = "FOOTYSTATS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API base URL
    #[arg(long, global = true, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL)]
    pub base_url: String,

    /// Root data directory (leagues/, stats/, ingestion_state/)
    #[arg(long, global = true, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Hourly request quota shared by every run against this data directory
    #[arg(
        long,
        global = true,
        env = "REQUESTS_PER_HOUR",
        default_value_t = DEFAULT_REQUESTS_PER_HOUR,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub requests_per_hour: u32,

    /// Attempts per request before a stage gives up (range: 1-20)
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_RETRIES,
        value_parser = clap::value_parser!(u32).range(1..=20)
    )]
    pub max_retries: u32,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// Disable progress bars
    #[arg(long, global = true, default_value_t = false)]
    pub no_progress: bool,
}

impl Cli {
    /// Ingestion configuration from flags and environment
    pub fn ingest_config(&self) -> Result<IngestConfig, CliError> {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CliError::ConfigurationError(
                    "API key is required (set FOOTYSTATS_API_KEY or pass --api-key)".to_string(),
                )
            })?;

        let config = IngestConfig::new(api_key, self.data_dir.clone())
            .with_base_url(self.base_url.clone())
            .with_requests_per_hour(self.requests_per_hour)
            .with_max_retries(self.max_retries);
        config.validate()?;
        Ok(config)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest one league season, resuming from its ledger
    Ingest(IngestArgs),

    /// Ingest several league seasons in sequence
    Update(UpdateArgs),

    /// Show the ledger of every ingested league season
    Status(StatusCommand),

    /// Show the hourly quota
    RateLimit(RateLimitCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_command_parses() {
        let cli = Cli::try_parse_from([
            "footy-ingest",
            "--api-key",
            "k",
            "--data-dir",
            "/tmp/footy",
            "ingest",
            "--league",
            "england_premier_league",
            "--season-id",
            "9660",
            "--season-year",
            "2023/2024",
        ])
        .unwrap();

        let Commands::Ingest(args) = &cli.command else {
            panic!("expected ingest");
        };
        let league = args.league_season().unwrap();
        assert_eq!(league.season_id, 9660);
        assert_eq!(league.season_year, "2023/2024");

        let config = cli.ingest_config().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/footy"));
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_update_takes_league_specs() {
        let cli = Cli::try_parse_from(["footy-ingest", "update", "a_league:1", "b_league:2:2024"]).unwrap();
        let Commands::Update(args) = &cli.command else {
            panic!("expected update");
        };
        assert_eq!(args.leagues.len(), 2);
        assert_eq!(args.leagues[1].season_year, "2024");
    }

    #[test]
    fn test_zero_quota_rejected() {
        let result = Cli::try_parse_from(["footy-ingest", "--requests-per-hour", "0", "rate-limit"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_api_key() {
        let mut cli = Cli::try_parse_from(["footy-ingest", "status"]).unwrap();
        cli.api_key = None;
        assert!(matches!(cli.ingest_config(), Err(CliError::ConfigurationError(_))));
    }
}
