//! CLI error types and conversions

use crate::config::ConfigError;
use crate::ingest::IngestError;
use crate::resume::StateError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Ingestion could not run
    #[error("ingestion error: {0}")]
    IngestError(#[from] IngestError),

    /// Ledger could not be read
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// Output could not be rendered
    #[error("output error: {0}")]
    OutputError(String),

    /// Run finished with failed stages or leagues
    #[error("{0}")]
    Incomplete(String),
}
