//! Scripted in-memory API for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use footy_ingest::client::{ApiClient, RateLimiter, RawResponse, Transport, TransportError};
use footy_ingest::config::IngestConfig;
use footy_ingest::ingest::IngestionRunner;
use footy_ingest::shutdown::SharedShutdown;
use footy_ingest::store::GlobalStore;
use footy_ingest::LeagueSeason;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const BASE_URL: &str = "http://fake.test";

/// Serves list endpoints page by page, per-id endpoints from a map, and
/// singleton documents; forced statuses are served first, per path or per
/// page of a path.
#[derive(Default)]
pub struct FakeApi {
    pages: Mutex<HashMap<String, Vec<Vec<Value>>>>,
    records: Mutex<HashMap<String, HashMap<String, Value>>>,
    documents: Mutex<HashMap<String, Value>>,
    forced: Mutex<HashMap<String, VecDeque<u16>>>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    shutdown_after: Mutex<Option<(String, SharedShutdown)>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A small league: four teams, six matches (one unfinished), two players, one referee
    pub fn small_league() -> Arc<Self> {
        let api = Self::new();
        api.set_pages(
            "/league-teams",
            vec![vec![team(1, "Alpha FC"), team(2, "Beta United"), team(3, "Gamma Town"), team(4, "Delta City")]],
        );
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
                    fixture(106, 1, 3, 0, 0, "incomplete"),
                ],
            ],
        );
        api.set_pages("/league-players", vec![vec![player(501, "Sam Keeper"), player(502, "Alex Striker")]]);
        api.set_pages("/league-referees", vec![vec![referee(901, "Pat Whistle")]]);
        api.set_document("/league-season", json!([{"id": 9660, "name": "Test League"}]));
        api.set_document("/league-tables", json!({"league_table": [{"id": 1, "position": 1}]}));
        api.set_document("/stats-data-btts", json!({"top_teams": {"data": []}}));
        api.set_document("/stats-data-over25", json!({"top_teams": {"data": []}}));
        for id in 101..=106 {
            api.set_record("/match", "match_id", id, json!({"id": id, "team_a_xg": 1.2}));
        }
        for id in 1..=4 {
            api.set_record("/lastx", "team_id", id, json!([{"id": id, "last_x_match_num": 5}]));
        }
        api
    }

    pub fn set_pages(&self, path: &str, pages: Vec<Vec<Value>>) {
        self.pages.lock().unwrap().insert(path.to_string(), pages);
    }

    pub fn set_document(&self, path: &str, data: Value) {
        self.documents.lock().unwrap().insert(path.to_string(), data);
    }

    pub fn set_record(&self, path: &str, param: &str, id: i64, data: Value) {
        self.records
            .lock()
            .unwrap()
            .entry(format!("{path}?{param}"))
            .or_default()
            .insert(id.to_string(), data);
    }

    /// Serve these statuses on `path` before normal responses
    pub fn force_statuses(&self, path: &str, statuses: &[u16]) {
        self.forced
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    /// Serve these statuses on one page of `path` before its normal response
    pub fn force_page_statuses(&self, path: &str, page: u32, statuses: &[u16]) {
        self.force_statuses(&page_key(path, page), statuses);
    }

    /// Request shutdown once `page` of `path` has been served
    pub fn shutdown_after_page(&self, path: &str, page: u32, shutdown: SharedShutdown) {
        *self.shutdown_after.lock().unwrap() = Some((page_key(path, page), shutdown));
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(p, _)| p == path).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn respond(&self, path: &str, query: &[(String, String)]) -> RawResponse {
        let param = |name: &str| query.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone());

        if let Some(pages) = self.pages.lock().unwrap().get(path) {
            let page: usize = param("page").and_then(|p| p.parse().ok()).unwrap_or(1);
            let data = pages.get(page - 1).cloned().unwrap_or_default();
            let body = json!({
                "success": true,
                "pager": {"current_page": page, "max_page": pages.len(), "total_results": 0},
                "data": data,
            });
            return RawResponse::new(200, body.to_string());
        }

        for (key, by_id) in self.records.lock().unwrap().iter() {
            let Some((record_path, id_param)) = key.split_once('?') else {
                continue;
            };
            if record_path != path {
                continue;
            }
            let data = param(id_param)
                .and_then(|id| by_id.get(&id).cloned())
                .unwrap_or_else(|| json!([]));
            return RawResponse::new(200, json!({"success": true, "data": data}).to_string());
        }

        if let Some(data) = self.documents.lock().unwrap().get(path) {
            return RawResponse::new(200, json!({"success": true, "data": data}).to_string());
        }

        RawResponse::new(404, "{}")
    }
}

#[async_trait]
impl Transport for FakeApi {
    async fn get(&self, url: &str, query: &[(String, String)]) -> Result<RawResponse, TransportError> {
        let path = url.strip_prefix(BASE_URL).unwrap_or(url).to_string();
        self.calls.lock().unwrap().push((path.clone(), query.to_vec()));

        let page = query.iter().find(|(k, _)| k == "page").map(|(_, v)| v.as_str());
        let paged = page.map(|p| format!("{path}?page={p}"));

        {
            let mut forced = self.forced.lock().unwrap();
            let status = forced
                .get_mut(&path)
                .and_then(VecDeque::pop_front)
                .or_else(|| paged.as_ref().and_then(|key| forced.get_mut(key)?.pop_front()));
            if let Some(status) = status {
                return Ok(RawResponse::new(status, "{}"));
            }
        }

        let response = self.respond(&path, query);
        if let (Some(key), Some((trigger, shutdown))) = (&paged, &*self.shutdown_after.lock().unwrap()) {
            if key == trigger {
                shutdown.request_shutdown();
            }
        }
        Ok(response)
    }
}

fn page_key(path: &str, page: u32) -> String {
    format!("{path}?page={page}")
}

pub fn team(id: i64, name: &str) -> Value {
    json!({"id": id, "name": name, "cleanName": name, "country": "Testland"})
}

pub fn player(id: i64, name: &str) -> Value {
    json!({"id": id, "known_as": name, "full_name": name})
}

pub fn referee(id: i64, name: &str) -> Value {
    json!({"id": id, "known_as": name})
}

pub fn fixture(id: i64, home: i64, away: i64, home_goals: u64, away_goals: u64, status: &str) -> Value {
    json!({
        "id": id,
        "homeID": home,
        "awayID": away,
        "homeGoalCount": home_goals,
        "awayGoalCount": away_goals,
        "status": status,
    })
}

pub fn league() -> LeagueSeason {
    LeagueSeason::new("test_league", 9660, "2023/2024")
}

pub fn config(data_dir: &Path) -> IngestConfig {
    IngestConfig::new("test-key", data_dir).with_base_url(BASE_URL)
}

/// Client on the fake API with a limiter persisted under `data_dir`
pub fn client(api: Arc<FakeApi>, data_dir: &Path, requests_per_hour: u32) -> ApiClient {
    let config = config(data_dir);
    let limiter = RateLimiter::persistent(requests_per_hour, config.rate_limiter_state_path());
    ApiClient::with_transport(api, BASE_URL, "test-key", Arc::new(limiter)).with_max_retries(3)
}

pub fn runner(api: Arc<FakeApi>, data_dir: &Path) -> IngestionRunner {
    runner_with_client(client(api, data_dir, 1800), data_dir)
}

pub fn runner_with_client(client: ApiClient, data_dir: &Path) -> IngestionRunner {
    let config = config(data_dir);
    IngestionRunner::new(
        Arc::new(client),
        config.leagues_dir(),
        config.state_dir(),
        GlobalStore::new(config.stats_dir()),
    )
}
