//! Job execution endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use domain::models::{DownloadLink, JobDetail};
use domain::services::ReportHistory;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Caller;

/// Query parameters for job history paging.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

/// Run a report now as a tracked job.
///
/// POST /api/v1/reports/:id/jobs
pub async fn run_job(
    State(state): State<AppState>,
    caller: Caller,
    Path(report_id): Path<i64>,
) -> Result<(StatusCode, Json<JobDetail>), ApiError> {
    let detail = state.tracker.run_now(caller.org_id, report_id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// Job history of a report, newest first.
///
/// GET /api/v1/reports/:id/jobs?cursor=&limit=
pub async fn list_jobs(
    State(state): State<AppState>,
    caller: Caller,
    Path(report_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ReportHistory>, ApiError> {
    let history = state
        .tracker
        .list_history(
            caller.org_id,
            report_id,
            query.cursor.as_deref(),
            query.limit,
        )
        .await?;
    Ok(Json(history))
}

/// GET /api/v1/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    caller: Caller,
    Path(job_id): Path<i64>,
) -> Result<Json<JobDetail>, ApiError> {
    Ok(Json(state.tracker.job_detail(caller.org_id, job_id).await?))
}

/// Presigned link to the archived artifact of a job.
///
/// GET /api/v1/jobs/:id/download
pub async fn download_job(
    State(state): State<AppState>,
    caller: Caller,
    Path(job_id): Path<i64>,
) -> Result<Json<DownloadLink>, ApiError> {
    Ok(Json(
        state.tracker.download_link(caller.org_id, job_id).await?,
    ))
}

/// DELETE /api/v1/jobs/:id
pub async fn delete_job(
    State(state): State<AppState>,
    caller: Caller,
    Path(job_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tracker.delete_job(caller.org_id, job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
