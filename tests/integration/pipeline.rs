//! End-to-end ingestion against the scripted API

use crate::support::{self, fixture, FakeApi};
use footy_ingest::ingest::StageResult;
use footy_ingest::resume::{state_path, IngestionState};
use footy_ingest::store::{JsonFileStore, LeagueStore};
use footy_ingest::{IdKey, OverallStatus, Stage, StageStatus};
use std::collections::BTreeSet;
use tempfile::TempDir;

fn ledger(dir: &TempDir) -> IngestionState {
    let config = support::config(dir.path());
    IngestionState::load(&state_path(&config.state_dir(), &support::league())).unwrap()
}

fn store(dir: &TempDir) -> JsonFileStore {
    JsonFileStore::open(support::config(dir.path()).leagues_dir(), &support::league()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_full_run_populates_every_stage() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let runner = support::runner(api.clone(), dir.path());

    let summary = runner.run(&support::league()).await.unwrap();

    assert!(summary.is_success(), "{summary:?}");
    assert_eq!(summary.status, OverallStatus::Complete);
    assert_eq!(summary.global_stats, Some(true));
    assert_eq!(summary.api_calls, 16);
    assert_eq!(api.total_calls(), 18);
    assert_eq!(api.calls_to("/league-matches"), 2);
    assert_eq!(api.calls_to("/match"), 5);

    let store = store(&dir);
    assert_eq!(store.get_all_team_ids(), vec![1, 2, 3, 4]);
    assert_eq!(store.get_all_team_lastx_ids(), vec![1, 2, 3, 4]);
    assert_eq!(store.get_all_match_ids(), vec![101, 102, 103, 104, 105, 106]);
    assert_eq!(store.get_all_match_detail_ids(), vec![101, 102, 103, 104, 105]);
    assert_eq!(store.get_all_player_ids(), vec![501, 502]);
    assert_eq!(store.get_all_referee_ids(), vec![901]);
    assert!(store.load_metadata().is_some());
    assert_eq!(store.load_league_stats().unwrap()["id"], 9660);
    assert!(store.load_league_table().is_some());

    let state = ledger(&dir);
    assert_eq!(state.get_overall_status(), OverallStatus::Complete);
    assert!(state.completed_at().is_some());
    assert_eq!(state.total_api_calls(), 16);
    let matches = state.collection(Stage::Matches);
    assert_eq!(matches.fetched, 6);
    assert_eq!(matches.api_calls, 2);
    assert_eq!(state.collection(Stage::HeadToHead).generated, Some(5));

    let stats_dir = support::config(dir.path()).stats_dir();
    assert!(stats_dir.join("btts_stats.json").exists());
    assert!(stats_dir.join("over25_stats.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_second_run_is_idempotent_and_skips_once_only_stages() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let runner = support::runner(api.clone(), dir.path());
    let league = support::league();

    runner.run(&league).await.unwrap();
    let before = ledger(&dir);
    api.reset_calls();

    let summary = runner.run(&league).await.unwrap();
    assert!(summary.is_success());

    let skipped: Vec<Stage> = summary
        .stages
        .iter()
        .filter(|o| matches!(o.result, StageResult::Skipped))
        .map(|o| o.stage)
        .collect();
    assert_eq!(skipped, vec![Stage::Teams, Stage::Referees]);

    assert_eq!(api.calls_to("/league-teams"), 0);
    assert_eq!(api.calls_to("/league-referees"), 0);
    // Every completed match already has details
    assert_eq!(api.calls_to("/match"), 0);
    assert_eq!(api.calls_to("/league-matches"), 2);

    let after = ledger(&dir);
    for stage in Stage::ALL {
        assert_eq!(after.fetched_ids(stage), before.fetched_ids(stage), "{stage}");
    }
    assert_eq!(after.total_api_calls(), before.total_api_calls() + summary.api_calls);
    assert_eq!(store(&dir).get_all_match_ids().len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_ledger_ids_merge_across_runs() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.set_pages(
        "/league-matches",
        vec![vec![fixture(101, 1, 2, 1, 0, "complete"), fixture(102, 3, 4, 0, 2, "complete")]],
    );
    let runner = support::runner(api.clone(), dir.path());
    let league = support::league();

    runner.run(&league).await.unwrap();
    let first = ledger(&dir).collection(Stage::Matches);
    assert_eq!(first.ids(IdKey::MatchIds).unwrap(), &BTreeSet::from([101, 102]));
    assert_eq!(first.fetched, 2);
    assert_eq!(first.api_calls, 1);

    api.set_pages(
        "/league-matches",
        vec![vec![
            fixture(101, 1, 2, 1, 0, "complete"),
            fixture(102, 3, 4, 0, 2, "complete"),
            fixture(103, 2, 3, 2, 2, "complete"),
        ]],
    );
    api.set_record("/match", "match_id", 103, serde_json::json!({"id": 103}));
    runner.run(&league).await.unwrap();

    let second = ledger(&dir).collection(Stage::Matches);
    assert_eq!(second.ids(IdKey::MatchIds).unwrap(), &BTreeSet::from([101, 102, 103]));
    assert_eq!(second.fetched, 3);
    assert_eq!(second.api_calls, 2);
    assert_eq!(second.status, StageStatus::Complete);
}

#[tokio::test(start_paused = true)]
async fn test_finished_fixture_gets_details_on_next_run() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let runner = support::runner(api.clone(), dir.path());
    let league = support::league();

    runner.run(&league).await.unwrap();
    assert_eq!(store(&dir).load_match(106).unwrap()["status"], "incomplete");

    api.set_pages(
        "/league-matches",
        vec![
            vec![
                fixture(101, 1, 2, 2, 1, "complete"),
                fixture(102, 3, 4, 0, 0, "complete"),
                fixture(103, 2, 1, 1, 1, "complete"),
            ],
            vec![
                fixture(104, 4, 1, 3, 2, "complete"),
                fixture(105, 2, 3, 1, 0, "complete"),
                fixture(106, 1, 3, 2, 0, "complete"),
            ],
        ],
    );
    api.reset_calls();

    runner.run(&league).await.unwrap();

    assert_eq!(api.calls_to("/match"), 1);
    let store = store(&dir);
    assert_eq!(store.load_match(106).unwrap()["status"], "complete");
    assert!(store.load_match_details(106).is_some());

    let h2h = store.load_h2h(1, 3).unwrap();
    assert_eq!(h2h["stats"]["total_matches"], 1);
    assert_eq!(h2h["stats"]["team_a_wins"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_head_to_head_is_symmetric() {
    let dir = TempDir::new().unwrap();
    let runner = support::runner(FakeApi::small_league(), dir.path());
    runner.run(&support::league()).await.unwrap();

    let store = store(&dir);
    assert_eq!(store.h2h_pairs(), vec![(1, 2), (1, 3), (1, 4), (2, 3), (3, 4)]);

    let forward = store.load_h2h(1, 2).unwrap();
    let backward = store.load_h2h(2, 1).unwrap();
    assert_eq!(forward, backward);
    assert_eq!(forward["team_a_id"], 1);
    assert_eq!(forward["team_b_id"], 2);
    assert_eq!(forward["matches"].as_array().unwrap().len(), 2);

    let stats = &forward["stats"];
    assert_eq!(stats["total_matches"], 2);
    assert_eq!(stats["team_a_wins"], 1);
    assert_eq!(stats["draws"], 1);
    assert_eq!(stats["team_a_goals"], 3);
    assert_eq!(stats["team_b_goals"], 2);
    assert_eq!(stats["btts_percentage"], 100.0);

    // 4 beat 1 at home: team_a (1) lost
    let stats = &store.load_h2h(4, 1).unwrap()["stats"];
    assert_eq!(stats["team_b_wins"], 1);
    assert_eq!(stats["over35_count"], 1);
}

#[tokio::test(start_paused = true)]
async fn test_skip_global_stats() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let runner = support::runner(api.clone(), dir.path()).with_global_stats(false);

    let summary = runner.run(&support::league()).await.unwrap();
    assert_eq!(summary.global_stats, None);
    assert_eq!(api.calls_to("/stats-data-btts"), 0);
    assert_eq!(api.calls_to("/stats-data-over25"), 0);
}
