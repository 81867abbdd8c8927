//! Plugin dependency resolution.
//!
//! Version-range arithmetic, the dependency graph, conflict detection, and
//! the resolver that turns a target manifest into an install plan. The
//! domain types live in `warden-types::plugin` and `warden-types::resolution`.

pub mod conflict;
pub mod graph;
pub mod registry;
pub mod resolver;
pub mod version;

pub use registry::RegistryView;
pub use resolver::resolve;
