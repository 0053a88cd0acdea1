use std::sync::Arc;
use std::time::Duration;

use crate::{
    EnqueueRequest, Job, JobId, JobStore, LeaseId, Notifier, QueueError, QueueStat, SettleOutcome,
    Settlement,
};

pub const DEFAULT_QUEUE: &str = "default";
pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_MAX_JOBS: i64 = 1;
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Policy layer over the store: applies defaults, validates input, emits
/// lifecycle log events, and fans out best-effort notifications. Stateless;
/// all state lives in the store.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn JobStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn JobStore>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self { store, notifier }
    }

    pub async fn enqueue(&self, mut req: EnqueueRequest) -> Result<Job, QueueError> {
        if req.job_type.trim().is_empty() {
            return Err(QueueError::Invalid("job type must not be empty".into()));
        }
        if req.delay_seconds < 0 {
            return Err(QueueError::Invalid("delay_seconds must not be negative".into()));
        }
        if req.max_retries < 0 {
            return Err(QueueError::Invalid("max_retries must not be negative".into()));
        }

        if req.queue.is_empty() {
            req.queue = DEFAULT_QUEUE.to_string();
        }
        if req.max_retries == 0 {
            req.max_retries = DEFAULT_MAX_RETRIES;
        }
        req.payload.get_or_insert_with(serde_json::Map::new);

        let job = self.store.insert(req).await?;

        tracing::info!(
            job_id = %job.id,
            job_type = %job.job_type,
            queue = %job.queue,
            priority = job.priority,
            run_at = %job.run_at,
            "job enqueued"
        );

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.publish(&job.queue, job.id).await {
                tracing::warn!(error = %e, job_id = %job.id, queue = %job.queue,
                    "enqueue notification failed");
            }
        }

        Ok(job)
    }

    pub async fn get(&self, id: JobId) -> Result<Job, QueueError> {
        self.store.get(id).await
    }

    pub async fn lease(
        &self,
        queue: &str,
        worker_id: &str,
        max_jobs: i64,
        lease_ttl: Duration,
    ) -> Result<Vec<Job>, QueueError> {
        let queue = if queue.is_empty() { DEFAULT_QUEUE } else { queue };
        let max_jobs = if max_jobs <= 0 { DEFAULT_MAX_JOBS } else { max_jobs };
        let lease_ttl = if lease_ttl.is_zero() { DEFAULT_LEASE_TTL } else { lease_ttl };

        let jobs = self.store.lease(queue, worker_id, max_jobs, lease_ttl).await?;

        if !jobs.is_empty() {
            tracing::info!(
                count = jobs.len(),
                worker_id = %worker_id,
                queue = %queue,
                "jobs leased"
            );
        }

        Ok(jobs)
    }

    pub async fn settle(
        &self,
        job_id: JobId,
        lease_id: LeaseId,
        outcome: SettleOutcome,
    ) -> Result<Settlement, QueueError> {
        let settlement = self.store.settle(job_id, lease_id, outcome).await?;

        match &settlement {
            Settlement::Succeeded => {
                tracing::info!(job_id = %job_id, "job succeeded");
            }
            Settlement::RetryScheduled { attempts, run_at } => {
                tracing::warn!(job_id = %job_id, attempts, run_at = %run_at,
                    "job failed; retry scheduled");
            }
            Settlement::DeadLettered { attempts } => {
                tracing::warn!(job_id = %job_id, attempts, "job dead-lettered");
            }
        }

        Ok(settlement)
    }

    pub async fn queue_stats(&self) -> Result<Vec<QueueStat>, QueueError> {
        self.store.queue_stats().await
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<Job>, QueueError> {
        self.store.recent(limit).await
    }
}
