//! Permission catalog, grant lifecycle, and runtime enforcement.
//!
//! The async service that persists grant changes lives in
//! `service::permission`; this module is pure policy.

pub mod catalog;
pub mod enforcer;
pub mod manager;

pub use enforcer::CapabilityEnforcer;
pub use manager::GrantSet;
