//! Render key resolution for the rendering backend.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderKeyOwner {
    pub org_id: i64,
    pub user_id: i64,
}

/// Org and user a live render key acts for.
///
/// GET /api/v1/render/keys/:key
pub async fn lookup_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<RenderKeyOwner>, ApiError> {
    let (org_id, user_id) = state
        .dispatcher
        .keys()
        .lookup(&key)
        .ok_or_else(|| ApiError::NotFound("Render key not found or expired".to_string()))?;
    Ok(Json(RenderKeyOwner { org_id, user_id }))
}
