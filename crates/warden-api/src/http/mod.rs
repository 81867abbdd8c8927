//! HTTP/REST API layer for Warden.
//!
//! Axum-based REST API at `/api/v1/` with an envelope response format and
//! CORS support. Users are addressed by path; authentication is left to the
//! host application in front of this API.

pub mod error;
pub mod handlers;
pub mod query;
pub mod response;
pub mod router;
