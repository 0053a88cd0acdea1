use std::time::Duration;

/// Retry delays are capped at one hour.
pub const BACKOFF_CAP_SECS: u64 = 3600;

/// Delay before a failed job becomes leasable again: `min(2^attempts, 3600)`
/// seconds.
pub fn retry_backoff(attempts: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempts).min(BACKOFF_CAP_SECS);
    Duration::from_secs(secs)
}
