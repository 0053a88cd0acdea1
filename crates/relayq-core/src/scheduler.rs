use std::sync::Arc;
use std::time::Duration;

use crate::JobStore;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cadence of the scan loop.
    pub tick: Duration,
    /// Upper bound on due jobs inspected per tick.
    pub due_batch: i64,
    /// Whether expired leases are reset to pending each tick.
    pub reclaim: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            due_batch: 100,
            reclaim: true,
        }
    }
}

/// Single cooperative task that watches scheduled jobs become due and
/// returns expired leases to the pending pool.
///
/// Leasing already filters on `run_at <= now`, so due jobs need no state
/// change to become visible; the scan exists for observability. Reclaim is
/// the one mutation: a leased row whose deadline passed goes back to
/// `pending` with its lease cleared and `attempts` untouched.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    cfg: SchedulerConfig,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, cfg: SchedulerConfig) -> Self {
        Self { store, cfg }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.cfg.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(tick_secs = self.cfg.tick.as_secs(), reclaim = self.cfg.reclaim,
            "scheduler started");

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One scan pass; `run` calls this on every tick.
    pub async fn tick(&self) {
        if self.cfg.reclaim {
            match self.store.reclaim_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::info!(reclaimed = n, "reset expired leases to pending"),
                Err(e) => tracing::warn!(error = %e, "lease reclaim failed"),
            }
        }

        match self.store.due_pending(self.cfg.due_batch).await {
            Ok(jobs) if !jobs.is_empty() => {
                tracing::debug!(due = jobs.len(), "jobs ready for lease");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "due-job scan failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ManualClock, MemStore};
    use crate::{EnqueueRequest, JobStatus};

    fn request() -> EnqueueRequest {
        EnqueueRequest {
            job_type: "x".to_string(),
            payload: Some(serde_json::Map::new()),
            queue: "default".to_string(),
            priority: 0,
            delay_seconds: 0,
            max_retries: 3,
        }
    }

    #[tokio::test]
    async fn reclaims_expired_leases_without_charging_an_attempt() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemStore::new(clock.clone()));
        let scheduler = Scheduler::new(store.clone(), SchedulerConfig::default());

        let job = store.insert(request()).await.unwrap();
        let leased = store
            .lease("default", "w1", 1, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(leased.len(), 1);

        // Deadline not reached yet: nothing to reclaim.
        scheduler.tick().await;
        assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Leased);

        clock.advance(Duration::from_secs(31));
        scheduler.tick().await;

        let job = store.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.lease_id.is_none());
        assert!(job.leased_at.is_none());
        assert!(job.leased_by.is_none());
        assert!(job.lease_expires_at.is_none());
    }

    #[tokio::test]
    async fn reclaim_can_be_disabled() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemStore::new(clock.clone()));
        let scheduler = Scheduler::new(
            store.clone(),
            SchedulerConfig {
                reclaim: false,
                ..SchedulerConfig::default()
            },
        );

        let job = store.insert(request()).await.unwrap();
        store
            .lease("default", "w1", 1, Duration::from_secs(1))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(60));
        scheduler.tick().await;

        assert_eq!(store.get(job.id).await.unwrap().status, JobStatus::Leased);
    }
}
