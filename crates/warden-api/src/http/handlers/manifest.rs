//! Manifest registry and catalog handlers for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use serde::Serialize;

use warden_core::permission::catalog::{CATALOG, CatalogEntry};
use warden_core::service::manifest::PublishOutcome;
use warden_types::plugin::PluginManifest;

use crate::http::error::AppError;
use crate::http::query::ManifestQuery;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Published {
    pub outcome: PublishOutcome,
    pub manifest: PluginManifest,
}

/// GET /api/v1/manifests
pub async fn list_manifests(
    State(state): State<AppState>,
    Query(query): Query<ManifestQuery>,
) -> Result<Json<ApiResponse<Vec<PluginManifest>>>, AppError> {
    let start = Instant::now();
    let service = state.engine.manifests();
    let manifests = match &query.id {
        Some(id) => service.versions(id).await?,
        None => service.list().await?,
    };
    Ok(ApiResponse::success(manifests, start)
        .with_link("self", "/api/v1/manifests")
        .json())
}

/// POST /api/v1/manifests
pub async fn publish_manifest(
    State(state): State<AppState>,
    Json(manifest): Json<PluginManifest>,
) -> Result<Json<ApiResponse<Published>>, AppError> {
    let start = Instant::now();
    let outcome = state.engine.manifests().publish(manifest.clone()).await?;
    Ok(ApiResponse::success(Published { outcome, manifest }, start).json())
}

/// GET /api/v1/catalog
pub async fn get_catalog() -> Json<ApiResponse<Vec<CatalogEntry>>> {
    ApiResponse::success(CATALOG.to_vec(), Instant::now()).json()
}
