//! Cron-driven job scheduler with a per-job cap on overlapping runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use querysmith_core::Result;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cron::CronExpr;

/// A unit of background work.
#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

struct ScheduledJob {
    job: Arc<dyn Job>,
    expr: CronExpr,
    /// Permits for concurrently running executions of this job
    permits: Arc<Semaphore>,
    last_fired: Option<DateTime<Utc>>,
}

/// Fires registered jobs when their cron expression matches.
///
/// Cloning is cheap; clones share the job table.
#[derive(Clone, Default)]
pub struct JobScheduler {
    jobs: Arc<RwLock<Vec<ScheduledJob>>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job. At most `max_concurrent` executions run at once
    /// (0 is treated as 1).
    pub async fn add_job(&self, job: Arc<dyn Job>, schedule: &str, max_concurrent: usize) -> std::result::Result<(), String> {
        let expr = CronExpr::parse(schedule).map_err(|e| format!("Job '{}': {e}", job.name()))?;
        let max_concurrent = max_concurrent.max(1);
        info!(job = job.name(), schedule = %expr, max_concurrent, next_run = ?expr.next_after(&Utc::now()), "Scheduling job");
        self.jobs.write().await.push(ScheduledJob {
            job,
            expr,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            last_fired: None,
        });
        Ok(())
    }

    pub async fn job_names(&self) -> Vec<String> {
        self.jobs.read().await.iter().map(|s| s.job.name().to_string()).collect()
    }

    /// Fire every job whose expression matches `now` and that has not
    /// already fired in this minute. Returns the handles of the runs started.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        let mut jobs = self.jobs.write().await;

        for scheduled in jobs.iter_mut() {
            if !scheduled.expr.matches(&now) {
                continue;
            }
            if scheduled.last_fired.is_some_and(|last| same_minute(&last, &now)) {
                continue;
            }
            scheduled.last_fired = Some(now);

            let name = scheduled.job.name().to_string();
            let Ok(permit) = scheduled.permits.clone().try_acquire_owned() else {
                warn!(job = %name, "Previous runs still in progress, skipping this firing");
                continue;
            };

            info!(job = %name, "Job triggered");
            let job = scheduled.job.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                match job.run().await {
                    Ok(()) => debug!(job = %name, "Job finished"),
                    Err(e) => error!(job = %name, error = %e, "Job failed"),
                }
            }));
        }

        handles
    }

    /// Check the schedule once a minute until `cancel` fires.
    pub fn start(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Job scheduler stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        scheduler.tick(Utc::now()).await;
                    }
                }
            }
        })
    }
}

fn same_minute(a: &DateTime<Utc>, b: &DateTime<Utc>) -> bool {
    a.timestamp().div_euclid(60) == b.timestamp().div_euclid(60)
}
