//! HTTP request handlers for the REST API.

pub mod manifest;
pub mod permission;
pub mod plugin;
pub mod sandbox;
