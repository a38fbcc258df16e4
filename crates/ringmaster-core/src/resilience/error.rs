use std::time::Duration;

use thiserror::Error;

/// API error codes treated as transient.
const RETRYABLE_CODES: &[&str] = &[
    "rate_limited",
    "ratelimited",
    "internal_error",
    "request_timeout",
    "service_unavailable",
];

/// Classified failure of an outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboundError {
    /// HTTP-level failure.  `retry_after` carries a parsed `Retry-After`
    /// header when the server sent one.
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Transport/socket failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The attempt exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Application-level error code returned by the remote API.
    #[error("{code}: {message}")]
    Api { code: String, message: String },

    /// Fast-fail raised while the breaker is open; no call was made.
    #[error("circuit_open: retry after {retry_after_seconds}s")]
    CircuitOpen { retry_after_seconds: u64 },
}

impl OutboundError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the retry executor may try this call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Io(_) | Self::Timeout(_) => true,
            Self::Api { code, .. } => RETRYABLE_CODES.contains(&code.to_lowercase().as_str()),
            Self::CircuitOpen { .. } => false,
        }
    }

    /// Whether this failure counts toward tripping the breaker
    /// (infrastructure failures: I/O, timeouts, HTTP 5xx).
    pub fn counts_toward_breaker(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status >= 500,
            Self::Io(_) | Self::Timeout(_) => true,
            Self::Api { .. } | Self::CircuitOpen { .. } => false,
        }
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_http_statuses() {
        for status in [429, 500, 502, 503, 504] {
            assert!(OutboundError::http(status, "x").is_retryable(), "{status}");
        }
        for status in [400, 401, 403, 404, 409, 422] {
            assert!(!OutboundError::http(status, "x").is_retryable(), "{status}");
        }
    }

    #[test]
    fn retryable_api_codes_are_case_insensitive() {
        assert!(OutboundError::api("rate_limited", "x").is_retryable());
        assert!(OutboundError::api("RateLimited", "x").is_retryable());
        assert!(OutboundError::api("service_unavailable", "x").is_retryable());
        assert!(!OutboundError::api("invalid_request", "x").is_retryable());
    }

    #[test]
    fn breaker_counts_infrastructure_failures_only() {
        assert!(OutboundError::http(503, "x").counts_toward_breaker());
        assert!(OutboundError::Io("reset".into()).counts_toward_breaker());
        assert!(OutboundError::Timeout(Duration::from_secs(1)).counts_toward_breaker());

        assert!(!OutboundError::http(429, "x").counts_toward_breaker());
        assert!(!OutboundError::api("rate_limited", "x").counts_toward_breaker());
    }

    #[test]
    fn io_and_timeout_are_retryable() {
        assert!(OutboundError::Io("reset".into()).is_retryable());
        assert!(OutboundError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(
            !OutboundError::CircuitOpen {
                retry_after_seconds: 30
            }
            .is_retryable()
        );
    }
}
