//! Job execution and status history domain models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default age after which a job without a terminal status is presumed lost.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 3600;

/// One attempt to run a report definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobExecution {
    pub id: i64,
    /// Back-reference only; the definition may have been deleted since.
    pub report_id: i64,
    pub org_id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<i64>,
    pub storage_key: Option<String>,
    pub storage_version: Option<String>,
    pub deleted: bool,
}

impl JobExecution {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Status codes recorded in a job's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Informational: job row created, rendering about to start.
    Started,
    /// Informational: artifact produced.
    Rendered,
    /// Informational: artifact archived in object storage.
    Archived,
    /// Terminal success.
    Success,
    /// Terminal failure.
    Fail,
}

impl StatusCode {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusCode::Success | StatusCode::Fail)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Started => write!(f, "started"),
            StatusCode::Rendered => write!(f, "rendered"),
            StatusCode::Archived => write!(f, "archived"),
            StatusCode::Success => write!(f, "success"),
            StatusCode::Fail => write!(f, "fail"),
        }
    }
}

impl FromStr for StatusCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "started" => Ok(StatusCode::Started),
            "rendered" => Ok(StatusCode::Rendered),
            "archived" => Ok(StatusCode::Archived),
            "success" => Ok(StatusCode::Success),
            "fail" | "failed" => Ok(StatusCode::Fail),
            _ => Err(format!("Unknown status code: {}", s)),
        }
    }
}

/// Append-only history entry of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusEvent {
    pub id: i64,
    pub job_id: i64,
    pub timestamp: DateTime<Utc>,
    pub status: StatusCode,
    pub description: String,
}

/// Human-facing health of a report, derived at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    None,
    Pending,
    Success,
    Fail,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::None => write!(f, "none"),
            JobState::Pending => write!(f, "pending"),
            JobState::Success => write!(f, "success"),
            JobState::Fail => write!(f, "fail"),
        }
    }
}

/// Derive the display state of a job.
///
/// `latest_status` is the most recent status event of the job and
/// `saw_success` tells whether any success event exists for it. A job with no
/// terminal status that started more than `stale_after` ago is reported as
/// failed: a crash between rendering and the status write leaves no explicit
/// failure event behind.
pub fn derive_job_state(
    started_at: DateTime<Utc>,
    latest_status: Option<StatusCode>,
    saw_success: bool,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> JobState {
    if latest_status == Some(StatusCode::Fail) {
        return JobState::Fail;
    }
    if saw_success || latest_status == Some(StatusCode::Success) {
        return JobState::Success;
    }
    if started_at + stale_after < now {
        JobState::Fail
    } else {
        JobState::Pending
    }
}

/// Derive the state of a job from its full (oldest first) event history.
pub fn derive_from_history(
    job: Option<&JobExecution>,
    events: &[JobStatusEvent],
    now: DateTime<Utc>,
    stale_after: Duration,
) -> JobState {
    let Some(job) = job else {
        return JobState::None;
    };
    let latest = events.iter().max_by_key(|e| (e.timestamp, e.id)).map(|e| e.status);
    let saw_success = events.iter().any(|e| e.status == StatusCode::Success);
    derive_job_state(job.started_at, latest, saw_success, now, stale_after)
}

/// Job row plus its status history and derived state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: JobExecution,
    pub state: JobState,
    pub events: Vec<JobStatusEvent>,
}

/// Presigned download link for an archived artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLink {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
