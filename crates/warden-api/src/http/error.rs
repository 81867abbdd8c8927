//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use warden_types::error::{InstallError, ManifestError, PermissionError, SandboxError};

use super::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    Install(InstallError),
    Permission(PermissionError),
    Sandbox(SandboxError),
    Manifest(ManifestError),
    /// Bad request input not covered by a domain error.
    Validation(String),
}

impl From<InstallError> for AppError {
    fn from(e: InstallError) -> Self {
        AppError::Install(e)
    }
}

impl From<PermissionError> for AppError {
    fn from(e: PermissionError) -> Self {
        AppError::Permission(e)
    }
}

impl From<SandboxError> for AppError {
    fn from(e: SandboxError) -> Self {
        AppError::Sandbox(e)
    }
}

impl From<ManifestError> for AppError {
    fn from(e: ManifestError) -> Self {
        AppError::Manifest(e)
    }
}

impl AppError {
    /// Status, machine-readable code, and optional structured details.
    fn classify(&self) -> (StatusCode, &'static str, Option<serde_json::Value>) {
        match self {
            AppError::Install(e) => match e {
                InstallError::PluginNotFound { .. } => (StatusCode::NOT_FOUND, "PLUGIN_NOT_FOUND", None),
                InstallError::NotInstalled { .. } => (StatusCode::NOT_FOUND, "NOT_INSTALLED", None),
                InstallError::UnresolvableConflict { conflicts, .. } => (
                    StatusCode::CONFLICT,
                    "UNRESOLVABLE_CONFLICT",
                    Some(json!({ "conflicts": conflicts })),
                ),
                InstallError::MissingRequiredDependency { missing, .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "MISSING_DEPENDENCY",
                    Some(json!({ "missing": missing })),
                ),
                InstallError::DependencyInstallFailed { dependency, .. } => (
                    StatusCode::FAILED_DEPENDENCY,
                    "DEPENDENCY_INSTALL_FAILED",
                    Some(json!({ "dependency": dependency })),
                ),
                InstallError::DependencyStillRequired { dependents, .. } => (
                    StatusCode::CONFLICT,
                    "DEPENDENCY_STILL_REQUIRED",
                    Some(json!({ "dependents": dependents })),
                ),
                InstallError::PermissionNotGranted { kinds, .. } => (
                    StatusCode::FORBIDDEN,
                    "PERMISSION_NOT_GRANTED",
                    Some(json!({ "kinds": kinds })),
                ),
                InstallError::Contended { .. } => (StatusCode::CONFLICT, "CONTENDED", None),
                InstallError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", None),
            },
            AppError::Permission(e) => match e {
                PermissionError::NotGranted { kind, .. } => (
                    StatusCode::FORBIDDEN,
                    "PERMISSION_NOT_GRANTED",
                    Some(json!({ "kinds": [kind] })),
                ),
                PermissionError::NotDeclared { .. } => (StatusCode::BAD_REQUEST, "PERMISSION_NOT_DECLARED", None),
                PermissionError::UnknownPlugin(_) => (StatusCode::NOT_FOUND, "PLUGIN_NOT_FOUND", None),
                PermissionError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", None),
            },
            AppError::Sandbox(e) => match e {
                SandboxError::DisableNotConfirmed { .. } => {
                    (StatusCode::BAD_REQUEST, "CONFIRMATION_REQUIRED", None)
                }
                SandboxError::InvalidLimit { resource, .. } => (
                    StatusCode::BAD_REQUEST,
                    "INVALID_LIMIT",
                    Some(json!({ "resource": resource })),
                ),
                SandboxError::LimitExceeded {
                    resource,
                    used,
                    limit,
                    ..
                } => (
                    StatusCode::FORBIDDEN,
                    "LIMIT_EXCEEDED",
                    Some(json!({ "resource": resource, "used": used, "limit": limit })),
                ),
                SandboxError::UnknownPlugin(_) => (StatusCode::NOT_FOUND, "PLUGIN_NOT_FOUND", None),
                SandboxError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", None),
            },
            AppError::Manifest(e) => match e {
                ManifestError::ImmutableVersion { .. } => (StatusCode::CONFLICT, "IMMUTABLE_VERSION", None),
                ManifestError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR", None),
                ManifestError::InvalidId(_)
                | ManifestError::SelfDependency(_)
                | ManifestError::DuplicateDependency { .. }
                | ManifestError::DuplicatePermission { .. }
                | ManifestError::InvalidVersion(_) => (StatusCode::BAD_REQUEST, "INVALID_MANIFEST", None),
            },
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Install(e) => e.to_string(),
            AppError::Permission(e) => e.to_string(),
            AppError::Sandbox(e) => e.to_string(),
            AppError::Manifest(e) => e.to_string(),
            AppError::Validation(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.classify();
        let message = self.message();

        if status.is_server_error() {
            tracing::error!(code, error = %message, "request failed");
        } else {
            tracing::debug!(code, error = %message, "request rejected");
        }

        (status, Json(ApiResponse::error(code, message, details))).into_response()
    }
}
