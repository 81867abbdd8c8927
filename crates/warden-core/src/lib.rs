//! Business logic and repository trait definitions for Warden.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements. It depends only on `warden-types` -- never on
//! `warden-infra` or any database/IO crate.
//!
//! Pure engines (`plugin`, `permission`, `sandbox`) hold the resolution and
//! policy rules; `service` wires them to storage, locking, and events.

pub mod event;
pub mod permission;
pub mod plugin;
pub mod repository;
pub mod sandbox;
pub mod service;

pub use service::Engine;
