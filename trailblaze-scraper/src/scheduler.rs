use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use trailblaze_core::common::error::{Result, ScraperError};

use crate::observability::MetricsSink;
use crate::pipeline::CancelFlag;

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One named cron job. The mutex enforces at most one concurrent
/// firing; an overlapping trigger is dropped with a warning.
pub struct Job {
    pub name: String,
    schedule: Schedule,
    handler: Arc<dyn Fn(Uuid) -> JobFuture + Send + Sync>,
    running: Mutex<()>,
}

impl Job {
    pub fn new<F>(name: impl Into<String>, cron_spec: &str, handler: F) -> Result<Self>
    where
        F: Fn(Uuid) -> JobFuture + Send + Sync + 'static,
    {
        let name = name.into();
        let schedule = Schedule::from_str(cron_spec).map_err(|e| {
            ScraperError::Config(format!("invalid cron expression for job '{name}': {e}"))
        })?;
        Ok(Self {
            name,
            schedule,
            handler: Arc::new(handler),
            running: Mutex::new(()),
        })
    }

    /// Run the handler now if no instance is in flight. Every firing,
    /// scheduled or ad-hoc, gets a fresh run id.
    pub async fn fire(&self, metrics: &MetricsSink) -> bool {
        match self.running.try_lock() {
            Ok(_guard) => {
                let run_id = Uuid::new_v4();
                info!(job = %self.name, run_id = %run_id, "job firing");
                (self.handler)(run_id).await;
                true
            }
            Err(_) => {
                warn!(job = %self.name, "overlapping firing dropped, previous instance still running");
                metrics.incr("scheduler_overlap_dropped", 1);
                false
            }
        }
    }

    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Firings that would have happened between `last_run` and now.
    /// They are not back-filled, only reported.
    pub fn missed_since(&self, last_run: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        self.schedule
            .after(&last_run)
            .take(1000)
            .take_while(|t| *t < now)
            .count() as u64
    }
}

/// Cron-style trigger for the scrape and enrichment jobs. On startup
/// missed firings are reported via metrics, never replayed.
pub struct ClockScheduler {
    jobs: Vec<Arc<Job>>,
    metrics: Arc<MetricsSink>,
}

impl ClockScheduler {
    pub fn new(metrics: Arc<MetricsSink>) -> Self {
        Self {
            jobs: Vec::new(),
            metrics,
        }
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(Arc::new(job));
    }

    pub fn report_missed(&self, job_name: &str, last_run: Option<DateTime<Utc>>) {
        let Some(last_run) = last_run else { return };
        if let Some(job) = self.jobs.iter().find(|j| j.name == job_name) {
            let missed = job.missed_since(last_run, Utc::now());
            if missed > 0 {
                warn!(job = job_name, missed, "scheduled firings missed while process was down");
                self.metrics.incr("scheduler_missed_firings", missed);
            }
        }
    }

    /// Operator-triggered ad-hoc invocation.
    pub async fn fire_now(&self, job_name: &str) -> Result<bool> {
        let job = self
            .jobs
            .iter()
            .find(|j| j.name == job_name)
            .ok_or_else(|| ScraperError::Config(format!("unknown job '{job_name}'")))?;
        Ok(job.fire(&self.metrics).await)
    }

    /// Drive all jobs until cancelled. Each job runs as its own task;
    /// firings are spawned so a long handler cannot stall the clock.
    pub async fn run(self, cancel: CancelFlag) {
        let mut handles = Vec::new();
        for job in &self.jobs {
            let job = Arc::clone(job);
            let metrics = Arc::clone(&self.metrics);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let Some(next) = job.next_after(Utc::now()) else {
                        warn!(job = %job.name, "schedule yields no future firings, stopping");
                        return;
                    };
                    // sleep in short slices so cancellation is prompt
                    while Utc::now() < next {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let remaining = (next - Utc::now())
                            .to_std()
                            .unwrap_or(Duration::from_millis(0));
                        tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
                    }
                    if cancel.is_cancelled() {
                        return;
                    }
                    let job = Arc::clone(&job);
                    let metrics = Arc::clone(&metrics);
                    tokio::spawn(async move {
                        job.fire(&metrics).await;
                    });
                }
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}
