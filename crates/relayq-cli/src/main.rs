use anyhow::Context;
use clap::{Parser, Subcommand};
use relayq_core::EnqueueRequest;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "relayq", version, about = "CLI for the relayq job queue")]
struct Cli {
    #[arg(long, default_value = "http://localhost:8080")]
    server_url: String,

    /// API token; sent as Authorization: Bearer <token> when set.
    #[arg(long, env = "API_TOKEN")]
    api_token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job
    Enqueue {
        /// Job type tag, e.g. email.send
        #[arg(long = "type")]
        job_type: String,

        #[arg(long, default_value = "default")]
        queue: String,

        /// JSON object payload, e.g. '{"hello":"world"}'
        #[arg(long, default_value = "{}")]
        json: String,

        /// Priority (higher = leased first; default 0)
        #[arg(long, default_value_t = 0)]
        priority: i32,

        /// Seconds before the job becomes leasable
        #[arg(long, default_value_t = 0)]
        delay_seconds: i64,

        #[arg(long, default_value_t = 3)]
        max_retries: i32,
    },

    /// Fetch a job by id
    Get { id: String },

    /// Show job counts per queue and status
    Stats,

    /// List recently created jobs
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Ping server health endpoint
    Ping,

    /// Run a worker against the server
    Worker {
        #[arg(long, default_value = "default")]
        queue: String,

        #[arg(long, default_value_t = 10)]
        concurrency: usize,

        #[arg(long, default_value_t = 30)]
        lease_ttl_secs: i64,

        #[arg(long, default_value_t = 500)]
        poll_interval_ms: u64,
    },
}

fn auth(req: reqwest::RequestBuilder, token: Option<&String>) -> reqwest::RequestBuilder {
    match token {
        Some(t) => req.header("Authorization", format!("Bearer {}", t)),
        None => req,
    }
}

async fn print_json(r: reqwest::Response) -> anyhow::Result<()> {
    if !r.status().is_success() {
        let status = r.status();
        let body = r.text().await.unwrap_or_default();
        anyhow::bail!("request failed: {} {}", status, body);
    }
    let body: Value = r.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let base = cli.server_url.trim_end_matches('/').to_string();
    let token = cli.api_token.clone();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Ping => {
            let url = format!("{}/healthz", base);
            let r = client.get(url).send().await?;
            let text = r.text().await.unwrap_or_default();
            println!("{}", text);
        }

        Commands::Enqueue {
            job_type,
            queue,
            json,
            priority,
            delay_seconds,
            max_retries,
        } => {
            let payload: Value = serde_json::from_str(&json).context("invalid JSON payload")?;
            let payload = payload
                .as_object()
                .cloned()
                .context("payload must be a JSON object")?;

            let req = EnqueueRequest {
                job_type,
                payload: Some(payload),
                queue,
                priority,
                delay_seconds,
                max_retries,
            };

            let url = format!("{}/v1/jobs", base);
            let r = auth(client.post(url), token.as_ref()).json(&req).send().await?;
            print_json(r).await?;
        }

        Commands::Get { id } => {
            let url = format!("{}/v1/jobs/{}", base, id);
            let r = auth(client.get(url), token.as_ref()).send().await?;
            print_json(r).await?;
        }

        Commands::Stats => {
            let url = format!("{}/v1/queues", base);
            let r = auth(client.get(url), token.as_ref()).send().await?;
            print_json(r).await?;
        }

        Commands::Recent { limit } => {
            let url = format!("{}/v1/recent?limit={}", base, limit);
            let r = auth(client.get(url), token.as_ref()).send().await?;
            print_json(r).await?;
        }

        Commands::Worker {
            queue,
            concurrency,
            lease_ttl_secs,
            poll_interval_ms,
        } => {
            let cfg = relayq_worker::WorkerConfig {
                server_url: base,
                queue,
                worker_id: format!("cli-{}", std::process::id()),
                concurrency,
                lease_ttl_secs,
                poll_interval_ms,
                api_token: token,
            };
            relayq_worker::run_worker(cfg).await?;
        }
    }

    Ok(())
}
