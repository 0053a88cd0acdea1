use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{EnqueueRequest, Job, JobId, LeaseId, QueueError, QueueStat};

/// Worker-reported result of executing a leased job.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    Success,
    Failure { error: String },
}

/// What settlement did to the job, for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Succeeded,
    RetryScheduled { attempts: i32, run_at: DateTime<Utc> },
    DeadLettered { attempts: i32 },
}

/// Durable storage for jobs; the single source of truth and the only
/// component permitted to mutate job rows.
///
/// Every operation is a single transaction: it is either fully committed or
/// has no effect, so callers may retry on `StorageUnavailable`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `pending` state with `run_at = now + delay`.
    /// The caller is expected to have applied defaults already.
    async fn insert(&self, req: EnqueueRequest) -> Result<Job, QueueError>;

    async fn get(&self, id: JobId) -> Result<Job, QueueError>;

    /// Atomically select up to `max_jobs` pending-and-due jobs from `queue`
    /// (priority descending, then `run_at` ascending) and mark them leased.
    ///
    /// Rows locked by a concurrent lease are skipped, never waited on; no
    /// two in-flight calls can return the same job. An empty queue yields
    /// an empty vec, not an error.
    async fn lease(
        &self,
        queue: &str,
        worker_id: &str,
        max_jobs: i64,
        lease_ttl: Duration,
    ) -> Result<Vec<Job>, QueueError>;

    /// Complete a lease. Rejected with `InvalidLease` unless `lease_id`
    /// matches the stored one, leaving the row untouched. On failure the
    /// attempt counter is incremented and the job either retries with
    /// exponential backoff or dead-letters once `attempts >= max_retries`.
    async fn settle(
        &self,
        job_id: JobId,
        lease_id: LeaseId,
        outcome: SettleOutcome,
    ) -> Result<Settlement, QueueError>;

    /// (queue, status, count) aggregates over the whole relation.
    async fn queue_stats(&self) -> Result<Vec<QueueStat>, QueueError>;

    /// Most recently created jobs, newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<Job>, QueueError>;

    /// Pending jobs whose `run_at` has passed, soonest first. Scheduler
    /// bookkeeping; leasing applies the same filter itself.
    async fn due_pending(&self, limit: i64) -> Result<Vec<Job>, QueueError>;

    /// Reset leased rows whose lease deadline has passed back to `pending`,
    /// clearing lease fields without touching `attempts` (the worker never
    /// settled). Returns the number of rows reclaimed.
    async fn reclaim_expired(&self) -> Result<u64, QueueError>;
}
