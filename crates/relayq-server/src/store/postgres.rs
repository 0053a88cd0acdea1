use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relayq_core::{
    new_job_id, new_lease_id, retry_backoff, Clock, EnqueueRequest, Job, JobId, JobStatus,
    JobStore, LeaseId, QueueError, QueueStat, SettleOutcome, Settlement, SystemClock,
};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Transient lock conflicts are retried this many times before surfacing.
const TX_RETRIES: u32 = 3;

/// The only component that mutates job rows. Every operation is one
/// transaction against Postgres; multi-worker exclusion comes from
/// `FOR UPDATE SKIP LOCKED` on the lease path and a plain `FOR UPDATE`
/// on settlement.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> QueueError {
    QueueError::StorageUnavailable(e.to_string())
}

fn is_contention(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

fn parse_status(s: &str) -> Result<JobStatus, QueueError> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "leased" => Ok(JobStatus::Leased),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" => Ok(JobStatus::Failed),
        "dead" => Ok(JobStatus::Dead),
        other => Err(QueueError::StorageUnavailable(format!(
            "unknown job status: {other}"
        ))),
    }
}

fn parse_payload(value: Value) -> Result<serde_json::Map<String, Value>, QueueError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(QueueError::StorageUnavailable(format!(
            "job payload is not a JSON object: {other}"
        ))),
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job, QueueError> {
    let status: String = row.try_get("status").map_err(db_err)?;
    let payload: Value = row.try_get("payload").map_err(db_err)?;

    Ok(Job {
        id: row.try_get::<Uuid, _>("id").map_err(db_err)?,
        job_type: row.try_get::<String, _>("job_type").map_err(db_err)?,
        payload: parse_payload(payload)?,
        queue: row.try_get::<String, _>("queue").map_err(db_err)?,
        priority: row.try_get::<i32, _>("priority").map_err(db_err)?,
        status: parse_status(&status)?,
        attempts: row.try_get::<i32, _>("attempts").map_err(db_err)?,
        max_retries: row.try_get::<i32, _>("max_retries").map_err(db_err)?,
        last_error: row.try_get::<Option<String>, _>("last_error").map_err(db_err)?,
        lease_id: row.try_get::<Option<Uuid>, _>("lease_id").map_err(db_err)?,
        leased_at: row
            .try_get::<Option<DateTime<Utc>>, _>("leased_at")
            .map_err(db_err)?,
        leased_by: row.try_get::<Option<String>, _>("leased_by").map_err(db_err)?,
        lease_expires_at: row
            .try_get::<Option<DateTime<Utc>>, _>("lease_expires_at")
            .map_err(db_err)?,
        run_at: row.try_get::<DateTime<Utc>, _>("run_at").map_err(db_err)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(db_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_err)?,
    })
}

const JOB_COLUMNS: &str = "id, job_type, payload, queue, priority, status, attempts, \
     max_retries, last_error, lease_id, leased_at, leased_by, lease_expires_at, \
     run_at, created_at, updated_at";

impl PostgresStore {
    async fn lease_tx(
        &self,
        queue: &str,
        worker_id: &str,
        max_jobs: i64,
        lease_id: LeaseId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<sqlx::postgres::PgRow>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Locked rows belong to another in-flight lease; skip, never wait.
        let rows = sqlx::query(&format!(
            r#"
            WITH due AS (
                SELECT id AS due_id
                FROM jobs
                WHERE queue = $1
                  AND status = 'pending'
                  AND run_at <= $2
                ORDER BY priority DESC, run_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $3
            )
            UPDATE jobs j
            SET status = 'leased',
                lease_id = $4,
                leased_at = $2,
                leased_by = $5,
                lease_expires_at = $6,
                updated_at = $2
            FROM due
            WHERE j.id = due.due_id
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(queue)
        .bind(now)
        .bind(max_jobs)
        .bind(lease_id)
        .bind(worker_id)
        .bind(expires_at)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(rows)
    }

    async fn settle_tx(
        &self,
        job_id: JobId,
        lease_id: LeaseId,
        outcome: &SettleOutcome,
    ) -> Result<Result<Settlement, QueueError>, sqlx::Error> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT lease_id, attempts, max_retries FROM jobs WHERE id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(Err(QueueError::NotFound));
        };

        let current_lease: Option<Uuid> = row.try_get("lease_id")?;
        let attempts: i32 = row.try_get("attempts")?;
        let max_retries: i32 = row.try_get("max_retries")?;

        // Late acks from expired or superseded leases change nothing.
        if current_lease != Some(lease_id) {
            return Ok(Err(QueueError::InvalidLease));
        }

        let settlement = match outcome {
            SettleOutcome::Success => {
                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = 'succeeded',
                        lease_id = NULL, leased_at = NULL, leased_by = NULL,
                        lease_expires_at = NULL,
                        updated_at = $2
                    WHERE id = $1
                    "#,
                )
                .bind(job_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                Settlement::Succeeded
            }
            SettleOutcome::Failure { error } => {
                let attempts = attempts + 1;
                let (status, run_at) = if attempts >= max_retries {
                    ("dead", now)
                } else {
                    let backoff = retry_backoff(attempts as u32);
                    ("pending", now + chrono::Duration::seconds(backoff.as_secs() as i64))
                };

                sqlx::query(
                    r#"
                    UPDATE jobs
                    SET status = $2,
                        attempts = $3,
                        last_error = $4,
                        run_at = $5,
                        lease_id = NULL, leased_at = NULL, leased_by = NULL,
                        lease_expires_at = NULL,
                        updated_at = $6
                    WHERE id = $1
                    "#,
                )
                .bind(job_id)
                .bind(status)
                .bind(attempts)
                .bind(error)
                .bind(run_at)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                if status == "dead" {
                    Settlement::DeadLettered { attempts }
                } else {
                    Settlement::RetryScheduled { attempts, run_at }
                }
            }
        };

        tx.commit().await?;
        Ok(Ok(settlement))
    }
}

#[async_trait]
impl JobStore for PostgresStore {
    async fn insert(&self, req: EnqueueRequest) -> Result<Job, QueueError> {
        let id = new_job_id();
        let now = self.clock.now();
        let run_at = now + chrono::Duration::seconds(req.delay_seconds);
        let payload = Value::Object(req.payload.unwrap_or_default());

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO jobs (id, job_type, payload, queue, priority, status,
                              max_retries, run_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $8)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&req.job_type)
        .bind(&payload)
        .bind(&req.queue)
        .bind(req.priority)
        .bind(req.max_retries)
        .bind(run_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row_to_job(&row)
    }

    async fn get(&self, id: JobId) -> Result<Job, QueueError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => row_to_job(&row),
            None => Err(QueueError::NotFound),
        }
    }

    async fn lease(
        &self,
        queue: &str,
        worker_id: &str,
        max_jobs: i64,
        lease_ttl: Duration,
    ) -> Result<Vec<Job>, QueueError> {
        let lease_id = new_lease_id();
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(lease_ttl)
            .map_err(|e| QueueError::Invalid(format!("lease_ttl out of range: {e}")))?;
        let expires_at = now + ttl;

        let mut last = QueueError::StorageUnavailable("lease contention retries exhausted".into());
        for _ in 0..TX_RETRIES {
            match self
                .lease_tx(queue, worker_id, max_jobs, lease_id, now, expires_at)
                .await
            {
                Ok(rows) => {
                    let mut jobs = rows
                        .iter()
                        .map(row_to_job)
                        .collect::<Result<Vec<_>, _>>()?;
                    // RETURNING order is not defined; re-establish selection order.
                    jobs.sort_by(|a, b| {
                        b.priority
                            .cmp(&a.priority)
                            .then(a.run_at.cmp(&b.run_at))
                            .then(a.id.cmp(&b.id))
                    });
                    return Ok(jobs);
                }
                Err(e) if is_contention(&e) => last = db_err(e),
                Err(e) => return Err(db_err(e)),
            }
        }
        Err(last)
    }

    async fn settle(
        &self,
        job_id: JobId,
        lease_id: LeaseId,
        outcome: SettleOutcome,
    ) -> Result<Settlement, QueueError> {
        let mut last = QueueError::StorageUnavailable("settle contention retries exhausted".into());
        for _ in 0..TX_RETRIES {
            match self.settle_tx(job_id, lease_id, &outcome).await {
                Ok(result) => return result,
                Err(e) if is_contention(&e) => last = db_err(e),
                Err(e) => return Err(db_err(e)),
            }
        }
        Err(last)
    }

    async fn queue_stats(&self) -> Result<Vec<QueueStat>, QueueError> {
        let rows = sqlx::query("SELECT queue, status, count FROM queue_stats ORDER BY queue, status")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut stats = Vec::with_capacity(rows.len());
        for row in rows {
            stats.push(QueueStat {
                queue: row.try_get("queue").map_err(db_err)?,
                status: row.try_get("status").map_err(db_err)?,
                count: row.try_get("count").map_err(db_err)?,
            });
        }
        Ok(stats)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<Job>, QueueError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_job).collect()
    }

    async fn due_pending(&self, limit: i64) -> Result<Vec<Job>, QueueError> {
        let now = self.clock.now();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE status = 'pending' AND run_at <= $1
            ORDER BY run_at ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_job).collect()
    }

    async fn reclaim_expired(&self) -> Result<u64, QueueError> {
        let now = self.clock.now();
        let affected = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                lease_id = NULL, leased_at = NULL, leased_by = NULL,
                lease_expires_at = NULL,
                updated_at = $1
            WHERE status = 'leased' AND lease_expires_at <= $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?
        .rows_affected();

        Ok(affected)
    }
}
