//! Retrying, quota-aware API client
//!
//! Every logical call:
//! 1. waits on the hourly quota once,
//! 2. makes up to `max_retries` attempts,
//! 3. counts every attempt that produced an HTTP response against the quota.
//!
//! Per attempt: 200 is parsed and returned; 429 sleeps the cooldown and moves
//! to the next attempt; 403 fails at once; any other status and transport
//! failures back off `2^attempt` seconds before the next attempt.

use super::rate_limit::RateLimiter;
use super::retry::FailureKind;
use super::transport::{ReqwestTransport, Transport};
use super::{ApiError, ApiResponse, Endpoint};
use crate::config::{calculate_backoff, IngestConfig, DEFAULT_MAX_RETRIES, MATCHES_PER_PAGE, RATE_LIMIT_COOLDOWN};
use crate::metrics::{record_retry_backoff, RequestTimer};
use crate::shutdown::{self, SharedShutdown};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Client for the statistics API
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
    max_retries: u32,
    rate_limit_cooldown: Duration,
    shutdown: Option<SharedShutdown>,
}

impl ApiClient {
    /// Build a client with the production reqwest transport
    pub fn new(config: &IngestConfig, rate_limiter: Arc<RateLimiter>) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.connect_timeout, config.request_timeout)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            config.api_base_url.clone(),
            config.api_key.clone(),
            rate_limiter,
        )
        .with_max_retries(config.max_retries)
        .with_rate_limit_cooldown(config.rate_limit_cooldown))
    }

    /// Build a client on an arbitrary transport
    ///
    /// # Arguments
    /// * `transport` - Performs the actual GET
    /// * `base_url` - Base URL for API endpoints (e.g., "<https://api.football-data-api.com>")
    /// * `api_key` - Sent as the `key` query parameter
    /// * `rate_limiter` - Shared hourly quota
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            rate_limiter,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
            shutdown: None,
        }
    }

    /// Attempts used by the convenience calls
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Sleep after a 429
    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    /// Interrupt cooldown and backoff sleeps on shutdown
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Attempts used by the convenience calls
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The shared quota
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Shutdown handle, if any
    pub fn shutdown(&self) -> Option<&SharedShutdown> {
        self.shutdown.as_ref()
    }

    /// Full URL for an endpoint name (see [`Endpoint::name`]) or a raw path
    pub fn url_for(&self, endpoint: &str) -> String {
        let path = match Endpoint::from_name(endpoint) {
            Some(known) => known.path().to_string(),
            None if endpoint.starts_with('/') => endpoint.to_string(),
            None => format!("/{endpoint}"),
        };
        format!("{}{}", self.base_url, path)
    }

    /// GET that never fails: logs and returns `None` when the call did not
    /// produce a 200 with a valid envelope.
    pub async fn get(&self, endpoint: &str, params: &[(&str, String)], max_retries: u32) -> Option<ApiResponse> {
        match self.fetch(endpoint, params, max_retries).await {
            Ok(response) => Some(response),
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "API request failed");
                None
            }
        }
    }

    /// GET with the failure reason preserved.
    pub async fn fetch(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        max_retries: u32,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url_for(endpoint);
        let max_retries = max_retries.max(1);

        let mut query: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        query.push(("key".to_string(), self.api_key.clone()));

        self.rate_limiter
            .wait_if_needed()
            .await
            .map_err(|_| ApiError::Cancelled {
                endpoint: endpoint.to_string(),
            })?;

        debug!("Making GET request to: {} with {} params", url, params.len());

        let mut last_failure = FailureKind::Network;

        for attempt in 0..max_retries {
            let attempt_no = attempt + 1;
            let timer = RequestTimer::start(endpoint, attempt_no);

            let failure = match self.transport.get(&url, &query).await {
                Ok(raw) => {
                    self.rate_limiter.record_request();
                    timer.record_complete(raw.status);

                    match raw.status {
                        200 => match serde_json::from_str::<ApiResponse>(&raw.body) {
                            Ok(response) => return Ok(response),
                            Err(e) => {
                                warn!(endpoint = %endpoint, error = %e, "Malformed response body");
                                FailureKind::MalformedBody
                            }
                        },
                        429 => {
                            last_failure = FailureKind::RateLimited;
                            warn!(
                                "Rate limit error (429) on attempt {}/{}, cooling down {}s",
                                attempt_no,
                                max_retries,
                                self.rate_limit_cooldown.as_secs()
                            );
                            self.pause(endpoint, self.rate_limit_cooldown).await?;
                            continue;
                        }
                        403 => {
                            error!(
                                endpoint = %endpoint,
                                "Access denied (403): {}",
                                FailureKind::Forbidden.suggestion()
                            );
                            return Err(ApiError::Unauthorized {
                                endpoint: endpoint.to_string(),
                            });
                        }
                        status => FailureKind::from_status(status),
                    }
                }
                Err(e) => {
                    timer.record_network_error();
                    debug!(endpoint = %endpoint, error = %e, "Transport error");
                    FailureKind::from_transport(&e)
                }
            };
            last_failure = failure;

            if attempt_no < max_retries {
                let backoff = calculate_backoff(attempt);
                warn!("{}", failure.attempt_message(attempt_no, max_retries, Some(backoff)));
                record_retry_backoff(backoff, attempt_no);
                self.pause(endpoint, backoff).await?;
            } else {
                warn!("{}", failure.attempt_message(attempt_no, max_retries, None));
            }
        }

        warn!(
            endpoint = %endpoint,
            attempts = max_retries,
            "Giving up: {}",
            last_failure.suggestion()
        );
        Err(ApiError::RetriesExhausted {
            endpoint: endpoint.to_string(),
            attempts: max_retries,
            last_failure,
        })
    }

    /// [`fetch`](Self::fetch) a named endpoint with the configured retry budget
    pub async fn request(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<ApiResponse, ApiError> {
        self.fetch(endpoint.name(), params, self.max_retries).await
    }

    async fn pause(&self, endpoint: &str, duration: Duration) -> Result<(), ApiError> {
        if shutdown::sleep_unless_shutdown(duration, self.shutdown.as_ref()).await {
            Ok(())
        } else {
            Err(ApiError::Cancelled {
                endpoint: endpoint.to_string(),
            })
        }
    }

    /// Available leagues and seasons
    pub async fn league_list(&self) -> Result<ApiResponse, ApiError> {
        self.request(Endpoint::LeagueList, &[]).await
    }

    /// League season statistics
    pub async fn league_stats(&self, season_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(Endpoint::LeagueStats, &[("season_id", season_id.to_string())])
            .await
    }

    /// League standings
    pub async fn league_table(&self, season_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(
            Endpoint::LeagueTable,
            &[("season_id", season_id.to_string()), ("include", "stats".to_string())],
        )
        .await
    }

    /// One page of league teams
    pub async fn league_teams(&self, season_id: i64, page: u32) -> Result<ApiResponse, ApiError> {
        self.request(
            Endpoint::LeagueTeams,
            &[
                ("season_id", season_id.to_string()),
                ("include", "stats".to_string()),
                ("page", page.to_string()),
            ],
        )
        .await
    }

    /// One page of league matches
    pub async fn league_matches(&self, season_id: i64, page: u32) -> Result<ApiResponse, ApiError> {
        self.request(
            Endpoint::LeagueMatches,
            &[
                ("season_id", season_id.to_string()),
                ("page", page.to_string()),
                ("max_per_page", MATCHES_PER_PAGE.to_string()),
            ],
        )
        .await
    }

    /// One page of league players
    pub async fn league_players(&self, season_id: i64, page: u32) -> Result<ApiResponse, ApiError> {
        self.request(
            Endpoint::LeaguePlayers,
            &[("season_id", season_id.to_string()), ("page", page.to_string())],
        )
        .await
    }

    /// League referees
    pub async fn league_referees(&self, season_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(Endpoint::LeagueReferees, &[("season_id", season_id.to_string())])
            .await
    }

    /// Last-N form of a team
    pub async fn team_lastx(&self, team_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(Endpoint::TeamLastX, &[("team_id", team_id.to_string())])
            .await
    }

    /// Detailed statistics of a match
    pub async fn match_details(&self, match_id: i64) -> Result<ApiResponse, ApiError> {
        self.request(Endpoint::Match, &[("match_id", match_id.to_string())])
            .await
    }

    /// Both-teams-to-score table
    pub async fn btts_stats(&self) -> Result<ApiResponse, ApiError> {
        self.request(Endpoint::BttsStats, &[]).await
    }

    /// Over 2.5 goals table
    pub async fn over25_stats(&self) -> Result<ApiResponse, ApiError> {
        self.request(Endpoint::Over25Stats, &[]).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("rate_limit_cooldown", &self.rate_limit_cooldown)
            .finish_non_exhaustive()
    }
}
