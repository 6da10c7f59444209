//! Hourly quota accounting across the client and restarts

use crate::support::{self, FakeApi};
use chrono::{Duration as ChronoDuration, Utc};
use footy_ingest::client::RateLimiter;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_call_count_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rate_limiter_state.json");

    let limiter = RateLimiter::persistent(100, &path);
    for _ in 0..7 {
        limiter.record_request();
    }
    drop(limiter);

    let reopened = RateLimiter::persistent(100, &path);
    assert_eq!(reopened.calls_this_hour(), 7);
    assert_eq!(reopened.remaining_requests(), 93);
}

#[test]
fn test_stale_window_on_disk_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rate_limiter_state.json");
    let stale = json!({
        "current_hour_start": Utc::now() - ChronoDuration::hours(2),
        "calls_this_hour": 1800,
        "requests_per_hour": 1800,
    });
    std::fs::write(&path, stale.to_string()).unwrap();

    let limiter = RateLimiter::persistent(1800, &path);
    assert_eq!(limiter.calls_this_hour(), 0);
    assert!(limiter.can_make_request());
}

#[test]
fn test_unreadable_state_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rate_limiter_state.json");
    std::fs::write(&path, "{ not json").unwrap();

    let limiter = RateLimiter::persistent(50, &path);
    assert_eq!(limiter.calls_this_hour(), 0);

    // Rewritten with a valid window
    limiter.record_request();
    assert_eq!(RateLimiter::persistent(50, &path).calls_this_hour(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_quota_waits_for_next_window() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    let client = support::client(api.clone(), dir.path(), 2);

    client.league_stats(9660).await.unwrap();
    client.league_table(9660).await.unwrap();
    assert_eq!(client.rate_limiter().remaining_requests(), 0);

    let started = tokio::time::Instant::now();
    client.league_stats(9660).await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(3600));
    assert_eq!(client.rate_limiter().calls_this_hour(), 1);
    assert_eq!(api.total_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_every_response_counts_against_quota() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.force_statuses("/league-season", &[429, 500]);
    let client = support::client(api.clone(), dir.path(), 100);

    client.league_stats(9660).await.unwrap();

    assert_eq!(api.calls_to("/league-season"), 3);
    assert_eq!(client.rate_limiter().calls_this_hour(), 3);

    let persisted = RateLimiter::persistent(100, support::config(dir.path()).rate_limiter_state_path());
    assert_eq!(persisted.calls_this_hour(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let api = FakeApi::small_league();
    api.force_statuses("/league-season", &[403]);
    let client = support::client(api.clone(), dir.path(), 100);

    let err = client.league_stats(9660).await.unwrap_err();

    assert!(matches!(err, footy_ingest::client::ApiError::Unauthorized { .. }), "{err}");
    assert_eq!(api.calls_to("/league-season"), 1);
    assert_eq!(client.rate_limiter().calls_this_hour(), 1);
}
