use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::error::OutboundError;

// ─── EndpointState ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct EndpointState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

// ─── CircuitBreaker ──────────────────────────────────────────────────────────

/// Per-endpoint failure tracker.
///
/// State machine: CLOSED → (`failure_threshold` consecutive counted
/// failures) → OPEN for `open_duration` → next call is let through
/// (half-open); success closes the circuit, failure re-opens it.
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    states: DashMap<String, EndpointState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            states: DashMap::new(),
        }
    }

    /// Fast-fail check before a call.  `Err(CircuitOpen)` while the breaker
    /// is open; after `open_until` the call is permitted (half-open).
    pub fn check(&self, endpoint: &str) -> Result<(), OutboundError> {
        if let Some(state) = self.states.get(endpoint)
            && let Some(open_until) = state.open_until
        {
            let now = Instant::now();
            if now < open_until {
                return Err(OutboundError::CircuitOpen {
                    retry_after_seconds: (open_until - now).as_secs().max(1),
                });
            }
        }
        Ok(())
    }

    /// Record a successful call: closes the circuit and clears the failure
    /// count.
    pub fn record_success(&self, endpoint: &str) {
        if let Some(mut state) = self.states.get_mut(endpoint) {
            state.consecutive_failures = 0;
            state.open_until = None;
        }
    }

    /// Record a counted failure; trips the breaker at `failure_threshold`.
    pub fn record_failure(&self, endpoint: &str) {
        let mut state = self.states.entry(endpoint.to_string()).or_default();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            state.open_until = Some(Instant::now() + self.open_duration);
            tracing::warn!(
                endpoint = %endpoint,
                failures = state.consecutive_failures,
                "circuit breaker opened"
            );
        }
    }

    /// Current consecutive-failure count for an endpoint.
    pub fn consecutive_failures(&self, endpoint: &str) -> u32 {
        self.states
            .get(endpoint)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
    }

    /// `true` while the endpoint fast-fails.
    pub fn is_open(&self, endpoint: &str) -> bool {
        self.check(endpoint).is_err()
    }
}
