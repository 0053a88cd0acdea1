use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub database_url: String,
    /// When unset the server runs without out-of-band notifications.
    pub redis_url: Option<String>,
    pub api_token: Option<String>,
    pub scheduler_interval: Duration,
    pub reclaim_leases: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let bind = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind: SocketAddr = bind.parse().expect("BIND_ADDR must be a valid SocketAddr");

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set (postgres://...)");

        let redis_url = std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty());
        let api_token = std::env::var("API_TOKEN").ok().filter(|v| !v.is_empty());

        let scheduler_interval = std::env::var("SCHEDULER_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let reclaim_leases = std::env::var("RECLAIM_LEASES")
            .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Self {
            bind,
            database_url,
            redis_url,
            api_token,
            scheduler_interval,
            reclaim_leases,
        }
    }
}
