use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relayq_worker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = relayq_worker::WorkerConfig::from_env();
    relayq_worker::run_worker(cfg).await
}
