//! In-memory reference implementations used by unit tests. The real store
//! lives in the server crate; this one mirrors its observable semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    new_job_id, new_lease_id, retry_backoff, Clock, EnqueueRequest, Job, JobId, JobStatus,
    JobStore, LeaseId, Notifier, QueueError, QueueStat, SettleOutcome, Settlement,
};

pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub(crate) struct MemStore {
    clock: Arc<ManualClock>,
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemStore {
    pub(crate) fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl JobStore for MemStore {
    async fn insert(&self, req: EnqueueRequest) -> Result<Job, QueueError> {
        let now = self.clock.now();
        let job = Job {
            id: new_job_id(),
            job_type: req.job_type,
            payload: req.payload.unwrap_or_default(),
            queue: req.queue,
            priority: req.priority,
            status: JobStatus::Pending,
            attempts: 0,
            max_retries: req.max_retries,
            last_error: None,
            lease_id: None,
            leased_at: None,
            leased_by: None,
            lease_expires_at: None,
            run_at: now + chrono::Duration::seconds(req.delay_seconds),
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Job, QueueError> {
        self.jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(QueueError::NotFound)
    }

    async fn lease(
        &self,
        queue: &str,
        worker_id: &str,
        max_jobs: i64,
        lease_ttl: Duration,
    ) -> Result<Vec<Job>, QueueError> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock().unwrap();

        let mut eligible: Vec<JobId> = jobs
            .values()
            .filter(|j| j.queue == queue && j.status == JobStatus::Pending && j.run_at <= now)
            .map(|j| j.id)
            .collect();
        eligible.sort_by(|a, b| {
            let (ja, jb) = (&jobs[a], &jobs[b]);
            jb.priority
                .cmp(&ja.priority)
                .then(ja.run_at.cmp(&jb.run_at))
                .then(ja.id.cmp(&jb.id))
        });
        eligible.truncate(max_jobs.max(0) as usize);

        let lease_id = new_lease_id();
        let mut leased = Vec::with_capacity(eligible.len());
        for id in eligible {
            let job = jobs.get_mut(&id).unwrap();
            job.status = JobStatus::Leased;
            job.lease_id = Some(lease_id);
            job.leased_at = Some(now);
            job.leased_by = Some(worker_id.to_string());
            job.lease_expires_at = Some(now + chrono::Duration::from_std(lease_ttl).unwrap());
            job.updated_at = now;
            leased.push(job.clone());
        }
        Ok(leased)
    }

    async fn settle(
        &self,
        job_id: JobId,
        lease_id: LeaseId,
        outcome: SettleOutcome,
    ) -> Result<Settlement, QueueError> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(QueueError::NotFound)?;

        if job.lease_id != Some(lease_id) {
            return Err(QueueError::InvalidLease);
        }

        job.lease_id = None;
        job.leased_at = None;
        job.leased_by = None;
        job.lease_expires_at = None;
        job.updated_at = now;

        match outcome {
            SettleOutcome::Success => {
                job.status = JobStatus::Succeeded;
                Ok(Settlement::Succeeded)
            }
            SettleOutcome::Failure { error } => {
                job.attempts += 1;
                job.last_error = Some(error);
                if job.attempts >= job.max_retries {
                    job.status = JobStatus::Dead;
                    job.run_at = now;
                    Ok(Settlement::DeadLettered { attempts: job.attempts })
                } else {
                    job.status = JobStatus::Pending;
                    job.run_at = now
                        + chrono::Duration::from_std(retry_backoff(job.attempts as u32)).unwrap();
                    Ok(Settlement::RetryScheduled {
                        attempts: job.attempts,
                        run_at: job.run_at,
                    })
                }
            }
        }
    }

    async fn queue_stats(&self) -> Result<Vec<QueueStat>, QueueError> {
        let jobs = self.jobs.lock().unwrap();
        let mut counts: HashMap<(String, &'static str), i64> = HashMap::new();
        for job in jobs.values() {
            *counts.entry((job.queue.clone(), job.status.as_str())).or_default() += 1;
        }
        let mut stats: Vec<QueueStat> = counts
            .into_iter()
            .map(|((queue, status), count)| QueueStat {
                queue,
                status: status.to_string(),
                count,
            })
            .collect();
        stats.sort_by(|a, b| a.queue.cmp(&b.queue).then(a.status.cmp(&b.status)));
        Ok(stats)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Job>, QueueError> {
        let jobs = self.jobs.lock().unwrap();
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }

    async fn due_pending(&self, limit: i64) -> Result<Vec<Job>, QueueError> {
        let now = self.clock.now();
        let jobs = self.jobs.lock().unwrap();
        let mut due: Vec<Job> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.run_at <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.run_at.cmp(&b.run_at));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn reclaim_expired(&self) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let mut jobs = self.jobs.lock().unwrap();
        let mut reclaimed = 0;
        for job in jobs.values_mut() {
            if job.status == JobStatus::Leased
                && job.lease_expires_at.is_some_and(|at| at <= now)
            {
                job.status = JobStatus::Pending;
                job.lease_id = None;
                job.leased_at = None;
                job.leased_by = None;
                job.lease_expires_at = None;
                job.updated_at = now;
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    fail: bool,
    published: Mutex<Vec<(String, JobId)>>,
}

impl RecordingNotifier {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            published: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn published(&self) -> Vec<(String, JobId)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, queue: &str, job_id: JobId) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("notifier offline");
        }
        self.published.lock().unwrap().push((queue.to_string(), job_id));
        Ok(())
    }
}
