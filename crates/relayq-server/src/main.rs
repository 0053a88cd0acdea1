use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relayq_core::{Coordinator, Notifier, Scheduler, SchedulerConfig};
use relayq_server::app::{self, AppState};
use relayq_server::auth::ApiAuth;
use relayq_server::config::Config;
use relayq_server::notifier::RedisNotifier;
use relayq_server::store::postgres::PostgresStore;
use relayq_server::metrics;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[tokio::main]
async fn main() {
    metrics::init_metrics();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relayq_server=info,relayq_core=info,tower_http=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await
        .expect("failed to connect to Postgres");

    MIGRATOR.run(&pool).await.expect("failed to run migrations");

    let store = Arc::new(PostgresStore::new(pool));

    let notifier: Option<Arc<dyn Notifier>> = match &cfg.redis_url {
        Some(url) => match RedisNotifier::connect(url).await {
            Ok(n) => {
                tracing::info!("enqueue notifications enabled");
                Some(Arc::new(n))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable; running without notifications");
                None
            }
        },
        None => None,
    };

    let coordinator = Coordinator::new(store.clone(), notifier);

    let scheduler = Scheduler::new(
        store,
        SchedulerConfig {
            tick: cfg.scheduler_interval,
            reclaim: cfg.reclaim_leases,
            ..SchedulerConfig::default()
        },
    );
    tokio::spawn(scheduler.run());

    let state = AppState { coordinator };
    let api_auth = ApiAuth {
        token: cfg.api_token.clone(),
    };

    let app = app::build_app(state, api_auth).layer(TraceLayer::new_for_http());

    tracing::info!("listening on {}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(cfg.bind)
        .await
        .expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server failed");

    async fn shutdown_signal() {
        // Wait for Ctrl+C
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    }
}
