use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static JOBS_ENQUEUED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("relayq_jobs_enqueued_total", "Total jobs enqueued").unwrap());

pub static JOBS_LEASED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("relayq_jobs_leased_total", "Total jobs leased to workers").unwrap());

pub static JOBS_SUCCEEDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("relayq_jobs_succeeded_total", "Total jobs settled successfully").unwrap()
});

pub static JOBS_RETRIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("relayq_jobs_retried_total", "Total failed settlements scheduled for retry")
        .unwrap()
});

pub static JOBS_DEAD: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("relayq_jobs_dead_total", "Total jobs moved to the dead-letter state").unwrap()
});

pub static QUEUE_DEPTH: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("relayq_queue_depth", "Job counts by queue and status"),
        &["queue", "status"],
    )
    .unwrap()
});

pub fn init_metrics() {
    // Ignore errors if called multiple times (common in tests)
    let _ = REGISTRY.register(Box::new(JOBS_ENQUEUED.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_LEASED.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_SUCCEEDED.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_RETRIED.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_DEAD.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_DEPTH.clone()));
}

pub fn gather() -> String {
    let metric_families = REGISTRY.gather();
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}
