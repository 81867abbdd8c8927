//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/` except `/health`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Manifest registry
        .route(
            "/manifests",
            get(handlers::manifest::list_manifests).post(handlers::manifest::publish_manifest),
        )
        .route("/catalog", get(handlers::manifest::get_catalog))
        // Installations
        .route(
            "/users/{user}/plugins",
            get(handlers::plugin::list_installations),
        )
        .route(
            "/users/{user}/plugins/{plugin}",
            get(handlers::plugin::get_installation),
        )
        .route(
            "/users/{user}/plugins/{plugin}/resolution",
            get(handlers::plugin::get_resolution),
        )
        .route(
            "/users/{user}/plugins/{plugin}/install",
            post(handlers::plugin::install),
        )
        .route(
            "/users/{user}/plugins/{plugin}/upgrade",
            post(handlers::plugin::upgrade),
        )
        .route(
            "/users/{user}/plugins/{plugin}/uninstall",
            post(handlers::plugin::uninstall),
        )
        // Permissions
        .route(
            "/users/{user}/plugins/{plugin}/permissions",
            get(handlers::permission::list_permissions),
        )
        .route(
            "/users/{user}/plugins/{plugin}/permissions/request",
            post(handlers::permission::request_permissions),
        )
        .route(
            "/users/{user}/plugins/{plugin}/permissions/grant",
            post(handlers::permission::grant_permissions),
        )
        .route(
            "/users/{user}/plugins/{plugin}/permissions/revoke",
            post(handlers::permission::revoke_permissions),
        )
        // Sandbox
        .route(
            "/users/{user}/plugins/{plugin}/sandbox",
            get(handlers::sandbox::get_sandbox).post(handlers::sandbox::update_sandbox),
        )
        .route(
            "/users/{user}/plugins/{plugin}/sandbox/effective",
            get(handlers::sandbox::get_effective_policy),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::state::testing::state;

    #[tokio::test]
    async fn routes_build_without_overlap() {
        // axum panics on conflicting or malformed paths at construction.
        let (state, _dir) = state().await;
        let _router = build_router(state);
    }

    #[tokio::test]
    async fn health_reports_version() {
        let axum::Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
