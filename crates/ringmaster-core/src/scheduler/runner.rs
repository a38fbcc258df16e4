//! Tokio-backed trigger source for the scheduler.
//!
//! `SchedulerRunner` drives a background task that wakes every second,
//! computes due jobs from their cron expression and timezone, fires them
//! through [`SchedulerService`], and reschedules.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;

use super::service::SchedulerService;
use super::types::{ScheduledJob, parse_cron, validate_timezone};

/// How often the runner checks for due jobs.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Background tick loop that turns persisted jobs into firings.
pub struct SchedulerRunner {
    service: Arc<SchedulerService>,
    next_runs: DashMap<String, DateTime<Utc>>,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl SchedulerRunner {
    pub fn new(service: Arc<SchedulerService>) -> Arc<Self> {
        let (stop_tx, stop_rx) = watch::channel(false);
        Arc::new(Self {
            service,
            next_runs: DashMap::new(),
            stop_tx,
            stop_rx,
        })
    }

    /// Next fire time of a job in UTC, computed in the job's timezone.
    /// `None` when the expression or timezone does not parse.
    pub fn compute_next_fire(job: &ScheduledJob) -> Option<DateTime<Utc>> {
        let schedule = parse_cron(&job.cron_expression).ok()?;
        let tz = validate_timezone(&job.timezone).ok()?;
        schedule
            .upcoming(tz)
            .next()
            .map(|at| at.with_timezone(&Utc))
    }

    /// Start the background task.  Call once.
    pub fn start(self: &Arc<Self>) {
        let runner = Arc::clone(self);
        let mut stop_rx = self.stop_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => runner.tick().await,
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            tracing::info!("scheduler runner stopped");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Stop the background task.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    async fn tick(&self) {
        let jobs = self.service.list().await;

        // Forget schedules of deleted jobs.
        let live: std::collections::HashSet<String> = jobs.iter().map(|j| j.id.clone()).collect();
        self.next_runs.retain(|id, _| live.contains(id));

        let now = Utc::now();
        for job in jobs.into_iter().filter(|j| j.enabled) {
            let due = match self.next_runs.get(&job.id) {
                Some(at) => *at <= now,
                None => {
                    // First sighting: schedule, don't fire.
                    if let Some(at) = Self::compute_next_fire(&job) {
                        self.next_runs.insert(job.id.clone(), at);
                    }
                    false
                }
            };

            if due {
                match Self::compute_next_fire(&job) {
                    Some(at) => {
                        self.next_runs.insert(job.id.clone(), at);
                    }
                    None => {
                        self.next_runs.remove(&job.id);
                    }
                }

                let service = Arc::clone(&self.service);
                let job_id = job.id.clone();
                tokio::spawn(async move {
                    service.run_scheduled(&job_id).await;
                });
            }
        }
    }
}
