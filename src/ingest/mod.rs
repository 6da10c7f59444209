//! Pipeline orchestration
//!
//! [`IngestionRunner`] drives one league season through every collector in
//! dependency order, consulting the refresh policy table before each stage,
//! then refreshes the global statistics tables.
//!
//! # Error Handling
//!
//! Setup failures (bad configuration, unwritable data directory, a ledger
//! held by another process) are returned as [`IngestError`]. Stage failures
//! are not: they are logged, recorded in the [`RunSummary`] and the run moves
//! on to the next stage.

pub mod estimate;
pub mod runner;

pub use estimate::{estimate_api_calls, format_duration, CallEstimate};
pub use runner::{BatchSummary, IngestionRunner, RunSummary, StageOutcome, StageResult};

use crate::client::ApiError;
use crate::config::ConfigError;
use crate::resume::StateError;
use crate::store::StoreError;

/// Errors that prevent a run from starting or finishing its bookkeeping
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP client could not be built
    #[error("client setup failed: {0}")]
    Api(#[from] ApiError),

    /// League directory could not be prepared
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Ledger or lock failure
    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl IngestError {
    /// Another process is ingesting the same league season
    pub fn is_locked(&self) -> bool {
        matches!(self, IngestError::State(StateError::Locked(_)))
    }
}
