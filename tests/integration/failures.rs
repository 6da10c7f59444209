//! Stage failures, retries, shutdown and locking

use crate::support::{self, FakeApi};
use footy_ingest::ingest::StageResult;
use footy_ingest::resume::{state_path, IngestionLock, IngestionState};
use footy_ingest::shutdown::ShutdownCoordinator;
use footy_ingest::store::{JsonFileStore, LeagueStore};
use footy_ingest::{OverallStatus, Stage, StageStatus};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn result_of(summary: &footy_ingest::ingest::RunSummary, stage: Stage) -> &StageResult {
    &summary
        .stages
        .iter()
        .find(|o| o.stage == stage)
        .unwrap_or_else(|| panic!("no outcome for {stage}"))
        .result
}

fn ledger(dir: &TempDir) -> IngestionState {
    let config = support::config(dir.path());
    IngestionState::load(&state_path(&config.state_dir(), &support::league())).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_fails_stage_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.force_statuses("/league-players", &[403]);
    let runner = support::runner(api.clone(), dir.path());
    let league = support::league();

    let summary = runner.run(&league).await.unwrap();

    assert_eq!(api.calls_to("/league-players"), 1);
    assert!(matches!(result_of(&summary, Stage::Players), StageResult::Failed { .. }));
    assert!(matches!(result_of(&summary, Stage::Referees), StageResult::Completed(_)));
    assert!(matches!(result_of(&summary, Stage::HeadToHead), StageResult::Completed(_)));
    assert_eq!(summary.failed_stages(), 1);
    assert_eq!(summary.status, OverallStatus::InProgress);

    let state = ledger(&dir);
    assert_eq!(state.collection(Stage::Players).status, StageStatus::InProgress);
    assert_eq!(state.collection(Stage::Players).api_calls, 1);
    assert!(state.completed_at().is_none());

    // The next run picks the stage up again
    let summary = runner.run(&league).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.status, OverallStatus::Complete);
    assert!(ledger(&dir).completed_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling_fails_stage() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.force_statuses("/league-referees", &[500, 500, 500]);
    let runner = support::runner(api.clone(), dir.path());

    let summary = runner.run(&support::league()).await.unwrap();

    assert_eq!(api.calls_to("/league-referees"), 3);
    match result_of(&summary, Stage::Referees) {
        StageResult::Failed { error } => assert!(error.contains("referees"), "{error}"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    // One logical call in the ledger, three responses against the quota
    assert_eq!(ledger(&dir).collection(Stage::Referees).api_calls, 1);
    assert_eq!(
        runner.client().rate_limiter().calls_this_hour() as usize,
        api.total_calls()
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_within_budget() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.force_statuses("/league-teams", &[503, 429]);
    let runner = support::runner(api.clone(), dir.path());

    let summary = runner.run(&support::league()).await.unwrap();

    assert!(summary.is_success());
    assert_eq!(api.calls_to("/league-teams"), 3);
    assert_eq!(ledger(&dir).collection(Stage::Teams).api_calls, 1);
}

fn store(dir: &TempDir) -> JsonFileStore {
    JsonFileStore::open(support::config(dir.path()).leagues_dir(), &support::league()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_failed_later_page_resumes_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.set_pages(
        "/league-teams",
        vec![
            vec![support::team(1, "Alpha FC"), support::team(2, "Beta United")],
            vec![support::team(3, "Gamma Town"), support::team(4, "Delta City")],
        ],
    );
    api.force_page_statuses("/league-teams", 2, &[500, 500, 500]);
    let runner = support::runner(api.clone(), dir.path());
    let league = support::league();

    let summary = runner.run(&league).await.unwrap();

    assert!(matches!(result_of(&summary, Stage::Teams), StageResult::Failed { .. }));
    assert_eq!(api.calls_to("/league-teams"), 4);
    let teams = ledger(&dir).collection(Stage::Teams);
    assert_eq!(teams.status, StageStatus::InProgress);
    assert_eq!(teams.team_ids, Some(BTreeSet::from([1, 2])));
    assert_eq!(teams.fetched, 2);
    assert_eq!(teams.api_calls, 2);
    let first_write = store(&dir).load_team(1).unwrap();

    let summary = runner.run(&league).await.unwrap();

    match result_of(&summary, Stage::Teams) {
        StageResult::Completed(report) => {
            assert_eq!(report.new, 2);
            assert_eq!(report.unchanged, 2);
            assert_eq!(report.total, 4);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(summary.is_success());
    let teams = ledger(&dir).collection(Stage::Teams);
    assert_eq!(teams.status, StageStatus::Complete);
    assert_eq!(teams.team_ids, Some(BTreeSet::from([1, 2, 3, 4])));
    assert_eq!(teams.fetched, 4);
    assert_eq!(teams.api_calls, 4);
    // Known teams are not written again
    assert_eq!(store(&dir).load_team(1).unwrap(), first_write);
    assert_eq!(store(&dir).get_all_team_ids(), vec![1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_between_pages_resumes_from_checkpoint() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let shutdown = ShutdownCoordinator::shared();
    api.shutdown_after_page("/league-matches", 1, shutdown.clone());
    let client = support::client(api.clone(), dir.path(), 1800).with_shutdown(shutdown);
    let league = support::league();

    let summary = support::runner_with_client(client, dir.path()).run(&league).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.stages.last().map(|o| o.stage), Some(Stage::Matches));
    assert_eq!(summary.global_stats, None);
    assert_eq!(api.calls_to("/league-matches"), 1);
    assert_eq!(api.calls_to("/match"), 0);
    let matches = ledger(&dir).collection(Stage::Matches);
    assert_eq!(matches.status, StageStatus::InProgress);
    assert_eq!(matches.match_ids, Some(BTreeSet::from([101, 102, 103])));
    assert_eq!(matches.api_calls, 1);
    assert_eq!(store(&dir).get_all_match_ids(), vec![101, 102, 103]);

    let summary = support::runner(api.clone(), dir.path()).run(&league).await.unwrap();

    assert!(summary.is_success());
    assert!(matches!(result_of(&summary, Stage::Teams), StageResult::Skipped));
    match result_of(&summary, Stage::Matches) {
        StageResult::Completed(report) => {
            assert_eq!(report.updated, 3);
            assert_eq!(report.new, 3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    let matches = ledger(&dir).collection(Stage::Matches);
    assert_eq!(matches.status, StageStatus::Complete);
    assert_eq!(matches.match_ids, Some(BTreeSet::from([101, 102, 103, 104, 105, 106])));
    assert_eq!(matches.fetched, 6);
    assert_eq!(summary.status, OverallStatus::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_missing_upstream_data_fails_dependent_stages() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.set_pages("/league-matches", vec![]);
    let runner = support::runner(api.clone(), dir.path());

    let summary = runner.run(&support::league()).await.unwrap();

    for stage in [Stage::Matches, Stage::MatchDetails, Stage::HeadToHead] {
        assert!(
            matches!(result_of(&summary, stage), StageResult::Failed { .. }),
            "{stage} should fail"
        );
    }
    assert_eq!(summary.failed_stages(), 3);
    assert_eq!(api.calls_to("/match"), 0);
    assert!(matches!(result_of(&summary, Stage::Players), StageResult::Completed(_)));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_before_next_stage() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let shutdown = ShutdownCoordinator::shared();
    shutdown.request_shutdown();
    let client = support::client(api.clone(), dir.path(), 1800).with_shutdown(shutdown);
    let runner = support::runner_with_client(client, dir.path());

    let summary = runner.run(&support::league()).await.unwrap();

    assert!(summary.cancelled);
    assert!(summary.stages.is_empty());
    assert_eq!(summary.global_stats, None);
    assert_eq!(api.total_calls(), 0);
    assert_eq!(ledger(&dir).get_overall_status(), OverallStatus::NotStarted);
}

#[tokio::test]
async fn test_locked_league_is_refused() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let runner = support::runner(api.clone(), dir.path());
    let league = support::league();

    let path = state_path(&support::config(dir.path()).state_dir(), &league);
    let mut lock = IngestionLock::open(&path).unwrap();
    let _guard = lock.try_hold().unwrap();

    let err = runner.run(&league).await.unwrap_err();
    assert!(err.is_locked(), "{err}");
    assert_eq!(api.total_calls(), 0);

    let batch = runner.run_many(std::slice::from_ref(&league)).await;
    assert_eq!(batch.skipped, 1);
    assert_eq!(batch.successful + batch.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_many_counts_outcomes() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let runner = support::runner(api.clone(), dir.path());

    let other = footy_ingest::LeagueSeason::new("other_league", 7, "2024");
    let batch = runner.run_many(&[support::league(), other]).await;

    assert_eq!(batch.successful, 2);
    assert_eq!(batch.failed, 0);
    assert!(!batch.cancelled);
}
