//! Detailed statistics for completed matches.

use super::{abort_on, Checkpointer, Collector, CollectorContext, CollectorError, CollectorResult, StageReport};
use crate::config::MATCH_DETAILS_CHECKPOINT_INTERVAL;
use crate::Stage;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Fetches details once per completed match; matches with details already
/// in the ledger or on disk are never requested again
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchDetailsCollector;

/// Whether a stored match record has finished
pub(crate) fn is_completed(record: &Value) -> bool {
    record.get("status").and_then(Value::as_str) == Some("complete")
}

#[async_trait]
impl Collector for MatchDetailsCollector {
    fn stage(&self) -> Stage {
        Stage::MatchDetails
    }

    async fn collect(&self, ctx: &mut CollectorContext<'_>) -> CollectorResult<StageReport> {
        let stage = self.stage();
        let match_ids = ctx.store.get_all_match_ids();
        if match_ids.is_empty() {
            return Err(CollectorError::Precondition {
                stage,
                reason: "no matches stored, collect matches first".to_string(),
            });
        }

        if ctx.state.is_collection_complete(stage) {
            info!(stage = %stage, "Checking for new match details");
        }
        ctx.state.mark_collection_in_progress(stage)?;

        let completed: Vec<i64> = match_ids
            .into_iter()
            .filter(|id| ctx.store.load_match(*id).is_some_and(|m| is_completed(&m)))
            .collect();
        let total = completed.len() as u64;

        let in_ledger = ctx.state.fetched_ids(stage);
        let on_disk: BTreeSet<i64> = ctx.store.get_all_match_detail_ids().into_iter().collect();
        let mut known: BTreeSet<i64> = in_ledger.union(&on_disk).copied().collect();

        let mut checkpoint = Checkpointer::new(stage, MATCH_DETAILS_CHECKPOINT_INTERVAL);
        for id in on_disk.difference(&in_ledger) {
            checkpoint.add_id(*id);
        }

        let worklist: Vec<i64> = completed.iter().copied().filter(|id| !known.contains(id)).collect();
        info!(
            stage = %stage,
            completed = total,
            already_collected = known.len(),
            to_fetch = worklist.len(),
            "Match details worklist"
        );

        let mut report = StageReport {
            unchanged: total - worklist.len() as u64,
            ..StageReport::default()
        };
        let pb = ctx.progress_bar(worklist.len() as u64, "Match details");

        for match_id in worklist {
            pb.inc(1);
            let result = ctx.client.match_details(match_id).await;
            report.api_calls += 1;
            checkpoint.record_call();

            match result {
                Ok(response) if response.success && !response.is_empty() => {
                    match ctx.store.save_match_details(match_id, response.data) {
                        Ok(()) => {
                            known.insert(match_id);
                            checkpoint.add_id(match_id);
                            report.new += 1;
                            debug!(stage = %stage, match_id = match_id, "Match details saved");
                        }
                        Err(e) => warn!(stage = %stage, match_id = match_id, error = %e, "Failed to save match details"),
                    }
                }
                Ok(_) => warn!(stage = %stage, match_id = match_id, "No details returned"),
                Err(e) => {
                    if let Some(fatal) = abort_on(stage, e) {
                        checkpoint.flush(ctx.state, known.len() as u64, total)?;
                        pb.abandon();
                        return Err(fatal);
                    }
                }
            }

            if checkpoint.due() {
                checkpoint.flush(ctx.state, known.len() as u64, total)?;
            }
            if ctx.shutdown_requested() {
                checkpoint.flush(ctx.state, known.len() as u64, total)?;
                pb.abandon();
                return Err(CollectorError::Cancelled { stage });
            }
        }

        checkpoint.flush(ctx.state, known.len() as u64, total)?;
        pb.finish_and_clear();
        ctx.state.mark_collection_complete(stage)?;

        report.total = known.len() as u64;
        info!(stage = %stage, collected = report.total, completed = total, "Match details collected");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_only_complete_status_counts() {
        assert!(is_completed(&json!({"status": "complete"})));
        assert!(!is_completed(&json!({"status": "incomplete"})));
        assert!(!is_completed(&json!({"status": "suspended"})));
        assert!(!is_completed(&json!({"id": 1})));
    }
}
