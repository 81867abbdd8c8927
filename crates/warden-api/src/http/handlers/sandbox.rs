//! Sandbox configuration handlers for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};

use warden_types::sandbox::{EffectivePolicy, SandboxConfig, SandboxUpdate};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/users/{user}/plugins/{plugin}/sandbox
pub async fn get_sandbox(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
) -> Result<Json<ApiResponse<SandboxConfig>>, AppError> {
    let start = Instant::now();
    let config = state.engine.sandbox().get(&plugin, &user).await?;
    Ok(ApiResponse::success(config, start)
        .with_link(
            "effective",
            &format!("/api/v1/users/{user}/plugins/{plugin}/sandbox/effective"),
        )
        .json())
}

/// POST /api/v1/users/{user}/plugins/{plugin}/sandbox
///
/// Disabling requires `"confirm_disable": true` in the body.
pub async fn update_sandbox(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
    Json(update): Json<SandboxUpdate>,
) -> Result<Json<ApiResponse<SandboxConfig>>, AppError> {
    let start = Instant::now();
    let config = state.engine.sandbox().update(&plugin, &user, &update).await?;
    Ok(ApiResponse::success(config, start).json())
}

/// GET /api/v1/users/{user}/plugins/{plugin}/sandbox/effective
pub async fn get_effective_policy(
    State(state): State<AppState>,
    Path((user, plugin)): Path<(String, String)>,
) -> Result<Json<ApiResponse<EffectivePolicy>>, AppError> {
    let start = Instant::now();
    let policy = state.engine.sandbox().effective(&plugin, &user).await?;
    Ok(ApiResponse::success(policy, start).json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use warden_types::sandbox::IsolationLevel;

    use crate::state::testing::{publish_app, state};

    fn pair() -> Path<(String, String)> {
        Path(("u1".to_string(), "app".to_string()))
    }

    #[tokio::test]
    async fn default_then_update_then_effective() {
        let (state, _dir) = state().await;
        publish_app(&state).await;

        let Json(resp) = get_sandbox(State(state.clone()), pair()).await.unwrap();
        let config = resp.data.unwrap();
        assert!(config.enabled);
        assert_eq!(config.isolation_level, IsolationLevel::Moderate);

        let update: SandboxUpdate =
            serde_json::from_value(serde_json::json!({"isolation_level": "strict"})).unwrap();
        let Json(resp) = update_sandbox(State(state.clone()), pair(), Json(update))
            .await
            .unwrap();
        assert_eq!(resp.data.unwrap().isolation_level, IsolationLevel::Strict);

        let Json(resp) = get_effective_policy(State(state.clone()), pair()).await.unwrap();
        let policy = resp.data.unwrap();
        assert!(policy.enforced);
        assert_eq!(
            policy.limits.unwrap(),
            state.engine.config().isolation.strict.defaults
        );
    }

    #[tokio::test]
    async fn disable_without_confirmation_is_rejected() {
        let (state, _dir) = state().await;
        publish_app(&state).await;

        let update: SandboxUpdate =
            serde_json::from_value(serde_json::json!({"enabled": false})).unwrap();
        let err = update_sandbox(State(state), pair(), Json(update))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn huge_time_limit_keeps_pair_usable() {
        let (state, _dir) = state().await;
        publish_app(&state).await;

        let update: SandboxUpdate = serde_json::from_value(serde_json::json!({
            "resource_limits": {"max_execution_time_ms": u64::MAX}
        }))
        .unwrap();
        update_sandbox(State(state.clone()), pair(), Json(update))
            .await
            .unwrap();

        let Json(resp) = get_sandbox(State(state.clone()), pair()).await.unwrap();
        let stored = resp.data.unwrap().resource_limits.max_execution_time_ms.unwrap();
        assert!(stored <= state.engine.config().isolation.permissive.ceiling.max_execution_time_ms);

        let Json(resp) = get_effective_policy(State(state.clone()), pair()).await.unwrap();
        assert_eq!(
            resp.data.unwrap().limits.unwrap().max_execution_time_ms,
            state.engine.config().isolation.moderate.ceiling.max_execution_time_ms
        );
    }
}
