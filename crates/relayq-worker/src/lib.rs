use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;

use relayq_core::{Job, JobId, LeaseId};
use reqwest::Client;
use tokio::sync::Semaphore;

#[derive(Clone)]
pub struct WorkerConfig {
    pub server_url: String,     // e.g. http://localhost:8080
    pub queue: String,          // e.g. default
    pub worker_id: String,      // advisory; shows up in diagnostics
    pub concurrency: usize,     // e.g. 10
    pub lease_ttl_secs: i64,    // e.g. 30
    pub poll_interval_ms: u64,  // e.g. 500
    /// If set, sent as Authorization: Bearer <token> on all API requests.
    pub api_token: Option<String>,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let server_url =
            std::env::var("RELAYQ_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let queue = std::env::var("QUEUE_NAME").unwrap_or_else(|_| "default".to_string());
        let worker_id = std::env::var("WORKER_ID")
            .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4().simple()));
        let concurrency = std::env::var("CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let lease_ttl_secs = std::env::var("LEASE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let poll_interval_ms = std::env::var("POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        let api_token = std::env::var("API_TOKEN").ok();

        Self {
            server_url,
            queue,
            worker_id,
            concurrency,
            lease_ttl_secs,
            poll_interval_ms,
            api_token,
        }
    }
}

/// Add optional Bearer token to a request builder.
fn auth_header(
    req: reqwest::RequestBuilder,
    api_token: Option<&String>,
) -> reqwest::RequestBuilder {
    match api_token {
        Some(t) => req.header("Authorization", format!("Bearer {}", t)),
        None => req,
    }
}

#[derive(serde::Serialize)]
struct LeaseRequest {
    queue: String,
    worker_id: String,
    max_jobs: i64,
    lease_ttl_seconds: i64,
}

#[derive(serde::Deserialize)]
struct LeaseResponse {
    jobs: Vec<Job>,
}

#[derive(serde::Serialize)]
struct AckRequest<'a> {
    worker_id: &'a str,
    lease_id: LeaseId,
}

#[derive(serde::Serialize)]
struct NackRequest<'a> {
    worker_id: &'a str,
    lease_id: LeaseId,
    error_message: &'a str,
}

pub async fn run_worker(cfg: WorkerConfig) -> anyhow::Result<()> {
    let client = Client::new();
    let sem = Arc::new(Semaphore::new(cfg.concurrency));

    tracing::info!(
        worker_id=%cfg.worker_id,
        queue=%cfg.queue,
        concurrency=cfg.concurrency,
        lease_ttl_secs=cfg.lease_ttl_secs,
        poll_interval_ms=cfg.poll_interval_ms,
        server_url=%cfg.server_url,
        "worker started"
    );

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("worker shutdown signal received, draining tasks...");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(cfg.poll_interval_ms)) => {
                // Tick and attempt a lease below.
            }
        }

        let lease_req = LeaseRequest {
            queue: cfg.queue.clone(),
            worker_id: cfg.worker_id.clone(),
            max_jobs: cfg.concurrency as i64,
            lease_ttl_seconds: cfg.lease_ttl_secs,
        };

        let lease_url = format!("{}/v1/lease", cfg.server_url.trim_end_matches('/'));
        let resp = auth_header(client.post(&lease_url), cfg.api_token.as_ref())
            .json(&lease_req)
            .send()
            .await;

        let jobs = match resp {
            Ok(r) if r.status().is_success() => match r.json::<LeaseResponse>().await {
                Ok(body) => body.jobs,
                Err(e) => {
                    tracing::warn!(error=%e, "failed to parse lease response");
                    continue;
                }
            },
            Ok(r) => {
                let status = r.status();
                let text = r.text().await.unwrap_or_default();
                tracing::warn!(%status, body=%text, "lease request failed");
                continue;
            }
            Err(e) => {
                tracing::warn!(error=%e, "lease request error");
                continue;
            }
        };

        for job in jobs {
            let permit = sem.clone().acquire_owned().await?;
            let client = client.clone();
            let server_url = cfg.server_url.clone();
            let worker_id = cfg.worker_id.clone();
            let api_token = cfg.api_token.clone();

            let h = tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) =
                    process_one(&client, &server_url, &worker_id, api_token.as_ref(), job).await
                {
                    tracing::warn!(error=%e, "job processing task failed");
                }
            });
            handles.push(h);
        }
    }

    // Drain spawned tasks
    join_all(handles).await;
    tracing::info!("worker stopped");
    Ok(())
}

async fn process_one(
    client: &Client,
    server_url: &str,
    worker_id: &str,
    api_token: Option<&String>,
    job: Job,
) -> anyhow::Result<()> {
    let job_id = job.id;
    let Some(lease_id) = job.lease_id else {
        anyhow::bail!("leased job {job_id} arrived without a lease id");
    };

    let span = tracing::info_span!(
        "job",
        job_id = %job_id,
        job_type = %job.job_type,
        queue = %job.queue,
        attempts = job.attempts
    );
    let _enter = span.enter();

    tracing::info!("processing job");

    // ---- example handler: the payload drives the simulated outcome
    if let Some(ms) = job.payload.get("sleep_ms").and_then(|v| v.as_u64()) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    if job.payload.get("fail").and_then(|v| v.as_bool()) == Some(true) {
        tracing::warn!("simulated failure requested by payload");
        nack(
            client,
            server_url,
            worker_id,
            api_token,
            job_id,
            lease_id,
            "simulated failure",
        )
        .await?;
        return Ok(());
    }

    ack(client, server_url, worker_id, api_token, job_id, lease_id).await?;
    Ok(())
}

async fn ack(
    client: &Client,
    server_url: &str,
    worker_id: &str,
    api_token: Option<&String>,
    job_id: JobId,
    lease_id: LeaseId,
) -> anyhow::Result<()> {
    let url = format!("{}/v1/jobs/{}/ack", server_url.trim_end_matches('/'), job_id);
    let body = AckRequest { worker_id, lease_id };
    let r = auth_header(client.post(url), api_token).json(&body).send().await?;

    if r.status() == reqwest::StatusCode::CONFLICT {
        tracing::warn!("lease expired before ack; result discarded");
        return Ok(());
    }
    if !r.status().is_success() {
        let status = r.status();
        let text = r.text().await.unwrap_or_default();
        anyhow::bail!("ack failed: {} {}", status, text);
    }
    Ok(())
}

async fn nack(
    client: &Client,
    server_url: &str,
    worker_id: &str,
    api_token: Option<&String>,
    job_id: JobId,
    lease_id: LeaseId,
    reason: &str,
) -> anyhow::Result<()> {
    let url = format!("{}/v1/jobs/{}/nack", server_url.trim_end_matches('/'), job_id);
    let body = NackRequest {
        worker_id,
        lease_id,
        error_message: reason,
    };
    let r = auth_header(client.post(url), api_token).json(&body).send().await?;

    if r.status() == reqwest::StatusCode::CONFLICT {
        tracing::warn!("lease expired before nack; result discarded");
        return Ok(());
    }
    if !r.status().is_success() {
        let status = r.status();
        let text = r.text().await.unwrap_or_default();
        anyhow::bail!("nack failed: {} {}", status, text);
    }
    Ok(())
}
