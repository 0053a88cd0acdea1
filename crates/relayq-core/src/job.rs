use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

/// Identifier authorising settlement of a leased job. Never derivable from
/// externally observable state.
pub type LeaseId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Leased,
    Succeeded,
    /// Present in the schema for dashboard compatibility; settlement never
    /// produces it (failures go back to `Pending` or forward to `Dead`).
    Failed,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Leased => "leased",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Dead => "dead",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Job {
    #[schema(value_type = Uuid)]
    pub id: JobId,

    #[serde(rename = "type")]
    pub job_type: String,

    /// Opaque to the queue; preserved losslessly across storage.
    #[schema(value_type = Object)]
    pub payload: serde_json::Map<String, serde_json::Value>,

    pub queue: String,

    /// Higher values are leased earlier; ties break on `run_at` ascending.
    pub priority: i32,

    pub status: JobStatus,

    pub attempts: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,

    #[schema(value_type = Uuid)]
    pub lease_id: Option<LeaseId>,
    pub leased_at: Option<DateTime<Utc>>,
    pub leased_by: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,

    /// Earliest instant at which the job becomes leasable.
    pub run_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub job_type: String,

    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default)]
    pub queue: String,

    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub delay_seconds: i64,

    #[serde(default)]
    pub max_retries: i32,
}

/// Aggregate (queue, status, count) tuple materialised from the job relation.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueStat {
    pub queue: String,
    pub status: String,
    pub count: i64,
}
