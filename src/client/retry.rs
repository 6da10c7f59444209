//! Failure classification for retry decisions and log messages.

use super::transport::TransportError;
use std::time::Duration;

/// Why a single attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request timed out
    Timeout,
    /// Connection refused, DNS failure or similar
    Offline,
    /// Other transport failure
    Network,
    /// HTTP 429
    RateLimited,
    /// HTTP 403, the key was rejected
    Forbidden,
    /// HTTP 5xx
    ServerError(u16),
    /// Any other non-200 status
    UnexpectedStatus(u16),
    /// 200 with a body that is not the expected JSON envelope
    MalformedBody,
}

impl FailureKind {
    /// Classify an HTTP status other than 200
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            403 => Self::Forbidden,
            500..=599 => Self::ServerError(status),
            other => Self::UnexpectedStatus(other),
        }
    }

    /// Classify a transport failure
    pub fn from_transport(error: &TransportError) -> Self {
        match error {
            TransportError::Timeout(_) => Self::Timeout,
            TransportError::Connect(_) => Self::Offline,
            TransportError::Other(_) => Self::Network,
        }
    }

    /// Short description for log lines.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "network timeout",
            Self::Offline => "connection failed",
            Self::Network => "network error",
            Self::RateLimited => "rate limit exceeded",
            Self::Forbidden => "access denied (403)",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::UnexpectedStatus(code) => match code {
                401 => "unauthorized (401)",
                404 => "endpoint not found",
                _ => "unexpected status",
            },
            Self::MalformedBody => "malformed response body",
        }
    }

    /// Suggested remediation shown when retries are exhausted.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Timeout => "Check your network connection and firewall settings",
            Self::Offline => "Verify internet connectivity and DNS resolution",
            Self::Network => "Check network connectivity and try again",
            Self::RateLimited => "Lower --requests-per-hour to stay under the plan quota",
            Self::Forbidden => "Verify the API key and that the plan covers this league",
            Self::ServerError(_) => "The API may be experiencing issues, run the update again later",
            Self::UnexpectedStatus(_) => "Check the base URL and endpoint parameters",
            Self::MalformedBody => "The API returned an unexpected payload, try again later",
        }
    }

    /// 403 is the only failure that is never retried
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Forbidden)
    }

    /// Format the warning logged after a failed attempt
    pub fn attempt_message(&self, attempt: u32, max_attempts: u32, backoff: Option<Duration>) -> String {
        match backoff {
            Some(delay) => format!(
                "Attempt {attempt}/{max_attempts} failed: {}. Retrying in {}s...",
                self.description(),
                delay.as_secs()
            ),
            None => format!(
                "Attempt {attempt}/{max_attempts} failed: {}.",
                self.description()
            ),
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServerError(code) | Self::UnexpectedStatus(code) => {
                write!(f, "{} ({code})", self.description())
            }
            _ => f.write_str(self.description()),
        }
    }
}
