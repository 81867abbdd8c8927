//! Permission grant handlers for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};

use warden_types::permission::PermissionGrant;

use crate::http::error::AppError;
use crate::http::query::KindsBody;
use crate::http::response::ApiResponse;
use crate::state::AppState;

type GrantsResult = Result<Json<ApiResponse<Vec<PermissionGrant>>>, AppError>;

/// GET /api/v1/users/{user}/plugins/{plugin}/permissions
pub async fn list_permissions(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
) -> GrantsResult {
    let start = Instant::now();
    let grants = state.engine.permissions().list(&plugin, &user).await?;
    Ok(ApiResponse::success(grants, start).json())
}

/// POST /api/v1/users/{user}/plugins/{plugin}/permissions/request
pub async fn request_permissions(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
) -> GrantsResult {
    let start = Instant::now();
    let grants = state.engine.permissions().request(&plugin, &user).await?;
    Ok(ApiResponse::success(grants, start).json())
}

/// POST /api/v1/users/{user}/plugins/{plugin}/permissions/grant
pub async fn grant_permissions(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
    Json(body): Json<KindsBody>,
) -> GrantsResult {
    let start = Instant::now();
    let grants = state
        .engine
        .permissions()
        .grant(&plugin, &user, body.kinds.as_deref())
        .await?;
    Ok(ApiResponse::success(grants, start).json())
}

/// POST /api/v1/users/{user}/plugins/{plugin}/permissions/revoke
pub async fn revoke_permissions(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
    Json(body): Json<KindsBody>,
) -> GrantsResult {
    let start = Instant::now();
    let grants = state
        .engine
        .permissions()
        .revoke(&plugin, &user, body.kinds.as_deref())
        .await?;
    Ok(ApiResponse::success(grants, start).json())
}
