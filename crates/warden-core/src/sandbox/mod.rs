//! Sandbox policy engine.
//!
//! Derives the effective, clamped resource ceilings from an isolation level
//! and explicit limits, and validates sandbox updates. Persistence and
//! locking live in `service::sandbox`.

pub mod policy;

pub use policy::SandboxPolicy;
