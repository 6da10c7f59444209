//! Resumable ingestion progress
//!
//! Persistent per league/season ledger with atomic writes, plus the advisory
//! lock that keeps a second process off the same league season.

pub mod lock;
pub mod state;

pub use lock::IngestionLock;
pub use state::{state_path, CollectionState, IngestionState, StateError, StateSummary};
