use chrono::{DateTime, Utc};

/// Source of the authoritative "now" used for every `run_at`, `leased_at`,
/// and backoff computation. Tests substitute their own implementation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
