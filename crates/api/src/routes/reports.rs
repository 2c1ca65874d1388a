//! Report definition endpoint handlers.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use domain::models::{
    CreateReportRequest, ReportDefinition, ReportIdsRequest, ReportQuery, UpdateReportRequest,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::Caller;

/// A definition as returned to callers, without delivery credentials.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ReportResponse(ReportDefinition);

impl From<ReportDefinition> for ReportResponse {
    fn from(report: ReportDefinition) -> Self {
        Self(report.redacted())
    }
}

/// Response for list endpoints.
#[derive(Debug, Serialize)]
pub struct ReportListResponse {
    pub reports: Vec<ReportResponse>,
}

impl From<Vec<ReportDefinition>> for ReportListResponse {
    fn from(reports: Vec<ReportDefinition>) -> Self {
        Self {
            reports: reports.into_iter().map(ReportResponse::from).collect(),
        }
    }
}

/// Affected-row count of a bulk operation.
#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub affected: u64,
}

/// Query parameters for lookups by dashboard.
#[derive(Debug, Deserialize)]
pub struct DashboardIdsQuery {
    /// Comma-separated dashboard ids.
    pub ids: String,
}

fn parse_ids(raw: &str) -> Result<Vec<i64>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ApiError::Validation(format!("Invalid dashboard id: {}", s)))
        })
        .collect()
}

/// Create a report definition.
///
/// POST /api/v1/reports
pub async fn create_report(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<ReportResponse>), ApiError> {
    let report = state
        .reports
        .create(caller.org_id, caller.user_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(report.into())))
}

/// Search the caller's org.
///
/// GET /api/v1/reports?name=&dashboardId=&userId=
pub async fn list_reports(
    State(state): State<AppState>,
    caller: Caller,
    Query(mut query): Query<ReportQuery>,
) -> Result<Json<ReportListResponse>, ApiError> {
    query.org_id = caller.org_id;
    let reports = state.reports.search(&query).await?;
    Ok(Json(reports.into()))
}

/// GET /api/v1/reports/:id
pub async fn get_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Json<ReportResponse>, ApiError> {
    Ok(Json(state.reports.get(caller.org_id, id).await?.into()))
}

/// PUT /api/v1/reports/:id
pub async fn update_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
    Json(request): Json<UpdateReportRequest>,
) -> Result<Json<ReportResponse>, ApiError> {
    Ok(Json(state.reports.update(caller.org_id, id, request).await?.into()))
}

/// DELETE /api/v1/reports
pub async fn delete_reports(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReportIdsRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    request.validate()?;
    let affected = state.reports.delete(caller.org_id, &request.ids).await?;
    Ok(Json(BulkResponse { affected }))
}

/// POST /api/v1/reports/enable
pub async fn enable_reports(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReportIdsRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    request.validate()?;
    let affected = state.reports.enable(caller.org_id, &request.ids).await?;
    Ok(Json(BulkResponse { affected }))
}

/// POST /api/v1/reports/disable
pub async fn disable_reports(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<ReportIdsRequest>,
) -> Result<Json<BulkResponse>, ApiError> {
    request.validate()?;
    let affected = state.reports.disable(caller.org_id, &request.ids).await?;
    Ok(Json(BulkResponse { affected }))
}

/// Definitions attached to any of the given dashboards.
///
/// GET /api/v1/reports/dashboards?ids=1,2
pub async fn reports_by_dashboards(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<DashboardIdsQuery>,
) -> Result<Json<ReportListResponse>, ApiError> {
    let ids = parse_ids(&query.ids)?;
    let reports = state
        .reports
        .get_by_dashboard_ids(caller.org_id, &ids)
        .await?;
    Ok(Json(reports.into()))
}

/// Render a report once and return the file. No job is recorded.
///
/// POST /api/v1/reports/:id/run
pub async fn run_report(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let artifact = state
        .tracker
        .execute_once(caller.org_id, id, caller.render_session)
        .await?;
    let bytes = artifact.read().await;
    artifact.discard().await;
    let bytes = bytes.map_err(|e| ApiError::Internal(format!("Failed to read artifact: {}", e)))?;

    info!(
        org_id = caller.org_id,
        report_id = id,
        bytes = bytes.len(),
        "Report rendered on demand"
    );
    Ok((
        [
            (header::CONTENT_TYPE, artifact.format.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}
