use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use relayq_core::{JobId, Notifier};

/// Publishes "queue has new work" signals to `relayq:jobs:<queue>`.
/// Subscribed workers can lease immediately instead of waiting out a poll
/// tick; nothing is lost when the channel drops a message.
pub struct RedisNotifier {
    conn: MultiplexedConnection,
}

impl RedisNotifier {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn publish(&self, queue: &str, job_id: JobId) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let channel = format!("relayq:jobs:{queue}");
        let _: () = conn.publish(channel, job_id.to_string()).await?;
        Ok(())
    }
}
