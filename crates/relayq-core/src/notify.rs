use async_trait::async_trait;

use crate::JobId;

/// Best-effort, out-of-band "queue has new work" signal. Delivery and
/// ordering are not guaranteed; failures must never affect job durability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, queue: &str, job_id: JobId) -> anyhow::Result<()>;
}
