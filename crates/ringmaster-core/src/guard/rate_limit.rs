use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::{GuardCategory, GuardCommand, GuardResult, GuardStage};
use crate::error::RuntimeError;

// ─── SlidingWindow ───────────────────────────────────────────────────────────

/// Timestamp ring for one user and one window length.
struct SlidingWindow {
    window: Duration,
    max_requests: usize,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            window,
            max_requests,
            timestamps: VecDeque::new(),
        }
    }

    /// Record `now` if the window has room.  Returns `false` when the limit
    /// has been exceeded (nothing is recorded in that case).
    fn try_record(&mut self, now: Instant) -> bool {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() >= self.max_requests {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

// ─── RateLimitStage ──────────────────────────────────────────────────────────

/// Per-user sliding-window rate limiting with a per-minute and a per-hour
/// budget.  One request counts against both windows; distinct users have
/// independent counters.
pub struct RateLimitStage {
    requests_per_minute: usize,
    requests_per_hour: usize,
    users: DashMap<String, Mutex<(SlidingWindow, SlidingWindow)>>,
}

impl RateLimitStage {
    pub fn new(requests_per_minute: usize, requests_per_hour: usize) -> Self {
        Self {
            requests_per_minute,
            requests_per_hour,
            users: DashMap::new(),
        }
    }

    fn rejected(&self, reason: String) -> GuardResult {
        GuardResult::Rejected {
            reason,
            category: GuardCategory::RateLimited,
            stage: "rate_limit".to_string(),
        }
    }
}

#[async_trait]
impl GuardStage for RateLimitStage {
    fn name(&self) -> &str {
        "rate_limit"
    }

    fn order(&self) -> i32 {
        10
    }

    async fn check(&self, command: &GuardCommand) -> Result<GuardResult, RuntimeError> {
        let entry = self.users.entry(command.user_id.clone()).or_insert_with(|| {
            Mutex::new((
                SlidingWindow::new(Duration::from_secs(60), self.requests_per_minute),
                SlidingWindow::new(Duration::from_secs(3600), self.requests_per_hour),
            ))
        });

        let now = Instant::now();
        let mut windows = entry.lock();

        // The minute window is checked first; a request blocked by either
        // window is not recorded against the other.
        if !windows.0.try_record(now) {
            return Ok(self.rejected(format!(
                "Rate limit exceeded: more than {} requests per minute",
                self.requests_per_minute
            )));
        }
        if !windows.1.try_record(now) {
            return Ok(self.rejected(format!(
                "Rate limit exceeded: more than {} requests per hour",
                self.requests_per_hour
            )));
        }

        Ok(GuardResult::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(user: &str) -> GuardCommand {
        GuardCommand::new(user, "hello")
    }

    #[tokio::test]
    async fn allows_within_budget() {
        let stage = RateLimitStage::new(3, 100);
        for _ in 0..3 {
            assert!(stage.check(&command("u1")).await.expect("check").is_allowed());
        }
    }

    #[tokio::test]
    async fn rejects_when_minute_budget_spent() {
        let stage = RateLimitStage::new(2, 100);
        stage.check(&command("u1")).await.expect("check");
        stage.check(&command("u1")).await.expect("check");

        match stage.check(&command("u1")).await.expect("check") {
            GuardResult::Rejected {
                reason, category, ..
            } => {
                assert_eq!(category, GuardCategory::RateLimited);
                assert!(reason.contains("per minute"), "reason was: {reason}");
            }
            GuardResult::Allowed => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn hour_budget_names_the_hour_limit() {
        // Minute budget larger than hour budget so the hour window trips.
        let stage = RateLimitStage::new(100, 2);
        stage.check(&command("u1")).await.expect("check");
        stage.check(&command("u1")).await.expect("check");

        match stage.check(&command("u1")).await.expect("check") {
            GuardResult::Rejected { reason, .. } => {
                assert!(reason.contains("per hour"), "reason was: {reason}");
            }
            GuardResult::Allowed => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn users_have_independent_counters() {
        let stage = RateLimitStage::new(1, 100);
        assert!(stage.check(&command("u1")).await.expect("check").is_allowed());
        assert!(
            !stage.check(&command("u1")).await.expect("check").is_allowed(),
            "u1 is out of budget"
        );
        assert!(
            stage.check(&command("u2")).await.expect("check").is_allowed(),
            "u2 has its own counter"
        );
    }
}
