//! Shared domain types for the Warden plugin engine.
//!
//! Manifests, permission grants, sandbox configs, installation records,
//! resolutions, events, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, semver, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod installation;
pub mod permission;
pub mod plugin;
pub mod resolution;
pub mod sandbox;
