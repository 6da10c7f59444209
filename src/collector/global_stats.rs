//! Cross-league statistics tables.
//!
//! These live outside any league season and outside the ledger, so a run
//! refreshes them unconditionally after the league pipeline.

use super::{CollectorError, CollectorResult};
use crate::client::{ApiClient, ApiError, ApiResponse};
use crate::store::global::{GlobalStore, GlobalTable};
use tracing::{info, warn};

/// Fetches the BTTS and Over 2.5 tables
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalStatsCollector;

impl GlobalStatsCollector {
    async fn fetch(client: &ApiClient, table: GlobalTable) -> Result<ApiResponse, ApiError> {
        match table {
            GlobalTable::Btts => client.btts_stats().await,
            GlobalTable::Over25 => client.over25_stats().await,
        }
    }

    /// Refresh one table; the whole response envelope is stored
    pub async fn collect_table(&self, client: &ApiClient, store: &GlobalStore, table: GlobalTable) -> CollectorResult<()> {
        let response = Self::fetch(client, table)
            .await
            .map_err(|e| CollectorError::GlobalStats(format!("{}: {}", table.label(), e)))?;

        if !response.success {
            return Err(CollectorError::GlobalStats(format!(
                "{}: API reported failure",
                table.label()
            )));
        }

        store
            .save(table, response.to_value())
            .map_err(|e| CollectorError::GlobalStats(format!("{}: {}", table.label(), e)))?;

        info!(table = table.label(), "Global stats saved");
        Ok(())
    }

    /// Refresh every table; a failed table does not stop the others
    pub async fn collect(&self, client: &ApiClient, store: &GlobalStore) -> CollectorResult<()> {
        let mut failures = Vec::new();

        for table in GlobalTable::ALL {
            if let Err(e) = self.collect_table(client, store, table).await {
                warn!(table = table.label(), error = %e, "Failed to refresh global stats");
                failures.push(table.label());
            }
            if crate::shutdown::is_requested(client.shutdown()) {
                break;
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CollectorError::GlobalStats(format!("failed tables: {}", failures.join(", "))))
        }
    }
}
