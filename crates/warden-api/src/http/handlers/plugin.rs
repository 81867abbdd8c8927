//! Resolution and installation handlers for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use semver::Version;

use warden_types::error::InstallError;
use warden_types::installation::{InstallOptions, InstallationRecord, UninstallOptions};
use warden_types::resolution::Resolution;

use crate::http::error::AppError;
use crate::http::query::{ResolutionQuery, UpgradeBody};
use crate::http::response::ApiResponse;
use crate::state::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

/// GET /api/v1/users/{user}/plugins/{plugin}/resolution
pub async fn get_resolution(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
    Query(query): Query<ResolutionQuery>,
) -> ApiResult<Resolution> {
    let start = Instant::now();

    let version = match &query.version {
        Some(v) => Some(
            Version::parse(v).map_err(|e| AppError::Validation(format!("invalid version '{v}': {e}")))?,
        ),
        None => None,
    };

    let resolution = state
        .engine
        .installer()
        .resolution(&plugin, &user, version.as_ref())
        .await?;

    Ok(ApiResponse::success(resolution, start)
        .with_link("install", &format!("/api/v1/users/{user}/plugins/{plugin}/install"))
        .json())
}

/// POST /api/v1/users/{user}/plugins/{plugin}/install
pub async fn install(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
    Json(options): Json<InstallOptions>,
) -> ApiResult<InstallationRecord> {
    let start = Instant::now();

    let record = state.engine.installer().install(&plugin, &user, &options).await?;

    Ok(ApiResponse::success(record, start)
        .with_link("self", &format!("/api/v1/users/{user}/plugins/{plugin}"))
        .with_link("sandbox", &format!("/api/v1/users/{user}/plugins/{plugin}/sandbox"))
        .json())
}

/// POST /api/v1/users/{user}/plugins/{plugin}/upgrade
pub async fn upgrade(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
    Json(body): Json<UpgradeBody>,
) -> ApiResult<InstallationRecord> {
    let start = Instant::now();

    let record = state
        .engine
        .installer()
        .upgrade(&plugin, &user, &body.version)
        .await?;

    Ok(ApiResponse::success(record, start).json())
}

/// POST /api/v1/users/{user}/plugins/{plugin}/uninstall
pub async fn uninstall(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
    Json(options): Json<UninstallOptions>,
) -> ApiResult<InstallationRecord> {
    let start = Instant::now();

    let installer = state.engine.installer();
    installer.uninstall(&plugin, &user, options).await?;
    let record = installer
        .installation(&plugin, &user)
        .await?
        .ok_or_else(|| InstallError::NotInstalled {
            plugin_id: plugin.clone(),
        })?;

    Ok(ApiResponse::success(record, start).json())
}

/// GET /api/v1/users/{user}/plugins
pub async fn list_installations(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Vec<InstallationRecord>> {
    let start = Instant::now();

    let records = state.engine.installer().installations(&user).await?;

    Ok(ApiResponse::success(records, start)
        .with_link("self", &format!("/api/v1/users/{user}/plugins"))
        .json())
}

/// GET /api/v1/users/{user}/plugins/{plugin}
pub async fn get_installation(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
) -> ApiResult<InstallationRecord> {
    let start = Instant::now();

    let record = state
        .engine
        .installer()
        .installation(&plugin, &user)
        .await?
        .ok_or_else(|| InstallError::NotInstalled {
            plugin_id: plugin.clone(),
        })?;

    Ok(ApiResponse::success(record, start)
        .with_link("permissions", &format!("/api/v1/users/{user}/plugins/{plugin}/permissions"))
        .with_link("sandbox", &format!("/api/v1/users/{user}/plugins/{plugin}/sandbox"))
        .json())
}
