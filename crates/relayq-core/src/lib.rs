pub mod backoff;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod job;
pub mod notify;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod testutil;

pub use backoff::{retry_backoff, BACKOFF_CAP_SECS};
pub use clock::{Clock, SystemClock};
pub use coordinator::{
    Coordinator, DEFAULT_LEASE_TTL, DEFAULT_MAX_JOBS, DEFAULT_MAX_RETRIES, DEFAULT_QUEUE,
};
pub use error::QueueError;
pub use ids::{new_job_id, new_lease_id};
pub use job::{EnqueueRequest, Job, JobId, JobStatus, LeaseId, QueueStat};
pub use notify::Notifier;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::{JobStore, SettleOutcome, Settlement};
