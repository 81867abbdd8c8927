//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (warden-infra) implements. The core crate never depends on any specific
//! storage technology; `memory` provides in-process implementations.

pub mod manifest;
pub mod memory;
pub mod state;
