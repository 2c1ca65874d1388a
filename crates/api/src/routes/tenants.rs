//! Tenant administration handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::{TenantQuota, UpdateQuotaRequest};

use crate::app::AppState;
use crate::error::ApiError;

/// Override the report limit of an org.
///
/// PUT /api/v1/admin/tenants/:org_id/quota
pub async fn update_quota(
    State(state): State<AppState>,
    Path(org_id): Path<i64>,
    Json(request): Json<UpdateQuotaRequest>,
) -> Result<Json<TenantQuota>, ApiError> {
    Ok(Json(state.quota.set_limit(org_id, request).await?))
}

/// Drop the cached quota of an offboarded org.
///
/// DELETE /api/v1/admin/tenants/:org_id
pub async fn offboard_tenant(
    State(state): State<AppState>,
    Path(org_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.quota.offboard(org_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
