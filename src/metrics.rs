//! Ingestion metrics
//!
//! Counters and histograms for API requests, 429 responses, retries, quota
//! waits and stage outcomes. The macros are always called; without an
//! installed recorder they do nothing. The Prometheus scrape endpoint is
//! installed by [`init_metrics`] when `--metrics-addr` is given.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

static EXPORTER_ADDR: OnceCell<SocketAddr> = OnceCell::new();

/// Share of the hourly quota at which a warning is logged, in percent
const QUOTA_WARN_PERCENT: u32 = 80;

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus exporter could not bind or install
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    Exporter {
        /// Requested listen address
        addr: SocketAddr,
        /// Exporter error
        reason: String,
    },
}

/// Install the Prometheus exporter on `addr` and describe every metric.
///
/// A second call is a no-op.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = EXPORTER_ADDR.get() {
        debug!(addr = %existing, "Metrics exporter already installed");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Exporter {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!("api_requests_total", Unit::Count, "HTTP responses and network errors by endpoint");
    describe_counter!("api_429_responses_total", Unit::Count, "Rate limit responses by endpoint");
    describe_counter!("api_retries_total", Unit::Count, "Backoff sleeps before a retry");
    describe_histogram!("api_request_duration_seconds", Unit::Seconds, "Time per HTTP attempt");
    describe_histogram!("retry_backoff_duration_seconds", Unit::Seconds, "Backoff before a retry");
    describe_histogram!("quota_wait_seconds", Unit::Seconds, "Time blocked on the hourly quota");
    describe_gauge!("quota_calls_this_hour", Unit::Count, "Requests in the current quota window");
    describe_counter!("stage_runs_total", Unit::Count, "Stage runs by stage and outcome");
    describe_counter!("stage_records_total", Unit::Count, "Records known after a completed stage");
    describe_histogram!("stage_duration_seconds", Unit::Seconds, "Wall time per stage run");

    let _ = EXPORTER_ADDR.set(addr);
    info!(addr = %addr, "Prometheus exporter listening");
    Ok(())
}

/// Whether the Prometheus exporter is installed
pub fn is_initialized() -> bool {
    EXPORTER_ADDR.get().is_some()
}

/// Times one HTTP attempt against an endpoint
#[derive(Debug)]
pub struct RequestTimer {
    endpoint: String,
    attempt: u32,
    started: Instant,
}

impl RequestTimer {
    /// Start timing attempt `attempt` (1-based)
    pub fn start(endpoint: impl Into<String>, attempt: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            attempt,
            started: Instant::now(),
        }
    }

    fn observe(&self, status: String) -> Duration {
        let elapsed = self.started.elapsed();
        counter!("api_requests_total", "endpoint" => self.endpoint.clone(), "status" => status).increment(1);
        histogram!("api_request_duration_seconds", "endpoint" => self.endpoint.clone())
            .record(elapsed.as_secs_f64());
        elapsed
    }

    /// The attempt produced an HTTP response
    pub fn record_complete(&self, status: u16) {
        let elapsed = self.observe(status.to_string());
        if status == 429 {
            counter!("api_429_responses_total", "endpoint" => self.endpoint.clone()).increment(1);
        }
        debug!(
            endpoint = %self.endpoint,
            attempt = self.attempt,
            status = status,
            duration_ms = elapsed.as_millis(),
            "API response"
        );
    }

    /// The attempt failed before any response
    pub fn record_network_error(&self) {
        let elapsed = self.observe("network_error".to_string());
        debug!(
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = elapsed.as_millis(),
            "API request got no response"
        );
    }
}

/// Count a backoff sleep before attempt `attempt + 1`
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!("api_retries_total", "attempt" => attempt.to_string()).increment(1);
    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());
}

/// Time spent blocked on the hourly quota
pub fn record_quota_wait(duration: Duration) {
    histogram!("quota_wait_seconds").record(duration.as_secs_f64());
}

/// Quota usage after a request was counted; warns once when usage crosses
/// [`QUOTA_WARN_PERCENT`]
pub fn record_quota_usage(calls_this_hour: u32, requests_per_hour: u32) {
    gauge!("quota_calls_this_hour").set(f64::from(calls_this_hour));

    let threshold = requests_per_hour.saturating_mul(QUOTA_WARN_PERCENT) / 100;
    if requests_per_hour > 0 && calls_this_hour == threshold.max(1) {
        warn!(
            calls_this_hour = calls_this_hour,
            requests_per_hour = requests_per_hour,
            "Hourly quota {}% used",
            QUOTA_WARN_PERCENT
        );
    }
}

/// Outcome and duration of one stage run
#[derive(Debug)]
pub struct StageMetrics {
    stage: &'static str,
    league: String,
    started: Instant,
}

impl StageMetrics {
    /// Stage `stage` of `league` is starting
    pub fn start(stage: &'static str, league: impl Into<String>) -> Self {
        let league = league.into();
        info!(stage = stage, league = %league, "Stage started");
        Self {
            stage,
            league,
            started: Instant::now(),
        }
    }

    fn finish(&self, outcome: &'static str) -> Duration {
        let elapsed = self.started.elapsed();
        counter!("stage_runs_total", "stage" => self.stage, "outcome" => outcome).increment(1);
        histogram!("stage_duration_seconds", "stage" => self.stage).record(elapsed.as_secs_f64());
        elapsed
    }

    /// Stage completed with `records` known records after `api_calls` calls
    pub fn record_success(&self, records: u64, api_calls: u64) {
        let elapsed = self.finish("completed");
        counter!("stage_records_total", "stage" => self.stage).increment(records);
        info!(
            stage = self.stage,
            league = %self.league,
            records = records,
            api_calls = api_calls,
            duration_secs = elapsed.as_secs(),
            "Stage completed"
        );
    }

    /// Stage stopped with `error`
    pub fn record_failure(&self, error: &str) {
        let elapsed = self.finish("failed");
        error!(
            stage = self.stage,
            league = %self.league,
            error = %error,
            duration_secs = elapsed.as_secs(),
            "Stage failed"
        );
    }
}
