//! Infrastructure layer for Warden.
//!
//! Contains implementations of the repository traits defined in `warden-core`
//! (SQLite manifest registry and engine state), the `config.toml` loader, and
//! data directory / manifest file helpers.

pub mod config;
pub mod filesystem;
pub mod sqlite;
