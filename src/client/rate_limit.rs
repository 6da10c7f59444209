//! Hourly request quota with persisted state
//!
//! Fixed-window limiter: a window opens at `current_hour_start` and admits
//! `requests_per_hour` requests. Every entry point first rolls the window
//! over if it is more than one hour old, so quota never leaks from one hour
//! into the next. The window is written to disk after every change so a
//! restart inside the same hour resumes the count instead of starting at 0.
//!
//! The limiter is shared as `Arc<RateLimiter>`; interior state sits behind a
//! `std::sync::Mutex` that is never held across an `.await`.

use crate::persist;
use crate::shutdown::{self, SharedShutdown};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Length of one quota window in seconds
pub const WINDOW_SECS: i64 = 3600;

/// Margin added to the computed wait so the window has certainly rolled
const WAIT_MARGIN_SECS: i64 = 1;

/// On-disk shape of the limiter state
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedWindow {
    current_hour_start: Option<DateTime<Utc>>,
    calls_this_hour: u32,
    requests_per_hour: u32,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: DateTime<Utc>,
    calls: u32,
}

/// Snapshot of the quota for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    /// Requests recorded in the current window
    pub calls_this_hour: u32,
    /// Configured quota
    pub requests_per_hour: u32,
    /// Requests still allowed in the current window
    pub remaining: u32,
    /// Start of the current window
    pub current_hour_start: DateTime<Utc>,
    /// Seconds until the window rolls over
    pub reset_in_secs: i64,
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Shutdown requested while waiting for the window to roll over
    #[error("quota wait interrupted by shutdown")]
    Cancelled,
}

/// Hourly fixed-window request limiter
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_hour: u32,
    state_path: Option<PathBuf>,
    window: Mutex<Window>,
    shutdown: Option<SharedShutdown>,
}

impl RateLimiter {
    /// In-memory limiter starting a fresh window now
    pub fn new(requests_per_hour: u32) -> Self {
        Self {
            requests_per_hour,
            state_path: None,
            window: Mutex::new(Window {
                start: Utc::now(),
                calls: 0,
            }),
            shutdown: None,
        }
    }

    /// Limiter backed by a state file.
    ///
    /// A window still open on disk is resumed; a stale, missing or unreadable
    /// state file starts a fresh window.
    pub fn persistent(requests_per_hour: u32, state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let mut limiter = Self::new(requests_per_hour);

        match persist::read_json::<PersistedWindow>(&state_path) {
            Ok(Some(saved)) => {
                if let Some(start) = saved.current_hour_start {
                    limiter = limiter.with_window(start, saved.calls_this_hour);
                    debug!(
                        path = %state_path.display(),
                        calls_this_hour = saved.calls_this_hour,
                        current_hour_start = %start,
                        "Rate limiter state loaded"
                    );
                }
            }
            Ok(None) => {
                debug!(path = %state_path.display(), "No rate limiter state, starting fresh window");
            }
            Err(e) => {
                warn!(
                    path = %state_path.display(),
                    error = %e,
                    "Unreadable rate limiter state, starting fresh window"
                );
            }
        }

        limiter.state_path = Some(state_path);
        {
            let mut window = limiter.lock();
            limiter.roll_over_if_needed(&mut window, Utc::now());
        }
        limiter.persist();
        limiter
    }

    /// Restore a window explicitly (start time and calls already made)
    pub fn with_window(self, start: DateTime<Utc>, calls_this_hour: u32) -> Self {
        {
            let mut window = self.lock();
            window.start = start;
            window.calls = calls_this_hour;
        }
        self
    }

    /// Interrupt quota waits on shutdown
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Configured quota
    pub fn requests_per_hour(&self) -> u32 {
        self.requests_per_hour
    }

    /// State file, if persistent
    pub fn state_path(&self) -> Option<&Path> {
        self.state_path.as_deref()
    }

    /// Block until a request may be made.
    ///
    /// Returns the time slept, or `None` when no wait was needed. After a
    /// wait the window is reset to start now with zero calls.
    pub async fn wait_if_needed(&self) -> Result<Option<Duration>, RateLimitError> {
        let wait = {
            let now = Utc::now();
            let mut window = self.lock();
            let rolled = self.roll_over_if_needed(&mut window, now);
            if rolled || window.calls < self.requests_per_hour {
                drop(window);
                if rolled {
                    self.persist();
                }
                return Ok(None);
            }

            let window_end = window.start + chrono::Duration::seconds(WINDOW_SECS);
            let secs = ((window_end - now).num_seconds() + WAIT_MARGIN_SECS).max(1);
            info!(
                calls_this_hour = window.calls,
                requests_per_hour = self.requests_per_hour,
                wait_secs = secs,
                "Hourly quota reached, waiting for next window"
            );
            Duration::from_secs(secs as u64)
        };

        if !shutdown::sleep_unless_shutdown(wait, self.shutdown.as_ref()).await {
            info!("Quota wait interrupted by shutdown");
            return Err(RateLimitError::Cancelled);
        }
        crate::metrics::record_quota_wait(wait);

        {
            let mut window = self.lock();
            window.start = Utc::now();
            window.calls = 0;
        }
        self.persist();
        info!("Quota window reset, resuming requests");
        Ok(Some(wait))
    }

    /// Count one request against the current window and persist.
    pub fn record_request(&self) {
        let calls = {
            let mut window = self.lock();
            self.roll_over_if_needed(&mut window, Utc::now());
            window.calls = window.calls.saturating_add(1);
            window.calls
        };
        crate::metrics::record_quota_usage(calls, self.requests_per_hour);
        self.persist();
    }

    /// Whether a request can be made without waiting
    pub fn can_make_request(&self) -> bool {
        self.remaining_requests() > 0
    }

    /// Requests left in the current window
    pub fn remaining_requests(&self) -> u32 {
        self.get_status().remaining
    }

    /// Requests recorded in the current window
    pub fn calls_this_hour(&self) -> u32 {
        self.get_status().calls_this_hour
    }

    /// Snapshot of the quota
    pub fn get_status(&self) -> RateLimitStatus {
        let now = Utc::now();
        let (window, rolled) = {
            let mut window = self.lock();
            let rolled = self.roll_over_if_needed(&mut window, now);
            (*window, rolled)
        };
        if rolled {
            self.persist();
        }

        let window_end = window.start + chrono::Duration::seconds(WINDOW_SECS);
        RateLimitStatus {
            calls_this_hour: window.calls,
            requests_per_hour: self.requests_per_hour,
            remaining: self.requests_per_hour.saturating_sub(window.calls),
            current_hour_start: window.start,
            reset_in_secs: (window_end - now).num_seconds().max(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the window when it is more than one hour old
    fn roll_over_if_needed(&self, window: &mut Window, now: DateTime<Utc>) -> bool {
        if now - window.start >= chrono::Duration::seconds(WINDOW_SECS) {
            debug!(
                previous_start = %window.start,
                previous_calls = window.calls,
                "Quota window rolled over"
            );
            window.start = now;
            window.calls = 0;
            true
        } else {
            false
        }
    }

    fn persist(&self) {
        let Some(path) = &self.state_path else {
            return;
        };
        let window = *self.lock();
        let saved = PersistedWindow {
            current_hour_start: Some(window.start),
            calls_this_hour: window.calls,
            requests_per_hour: self.requests_per_hour,
        };
        if let Err(e) = persist::write_json_atomic(path, &saved) {
            warn!(path = %path.display(), error = %e, "Failed to persist rate limiter state");
        }
    }
}
