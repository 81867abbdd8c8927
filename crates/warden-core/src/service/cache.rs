//! Read-through cache of resolutions, invalidated by generation stamps.
//!
//! Each user has a generation counter that every mutation of that user's
//! state bumps, and the registry has one that every publish bumps. A cached
//! [`Resolution`] is served only while both stamps it was computed under are
//! still current, so a stale entry is never returned even if it was never
//! explicitly evicted.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use warden_types::resolution::Resolution;

/// Generation pair a resolution was computed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    pub registry: u64,
    pub user: u64,
}

#[derive(Debug, Default)]
pub struct ResolutionCache {
    registry: AtomicU64,
    generations: DashMap<String, u64>,
    // (plugin_id, user_id)
    entries: DashMap<(String, String), (Stamp, Resolution)>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation of `user_id`'s state.
    pub fn generation(&self, user_id: &str) -> u64 {
        self.generations.get(user_id).map(|g| *g).unwrap_or(0)
    }

    pub fn stamp(&self, user_id: &str) -> Stamp {
        Stamp {
            registry: self.registry.load(Ordering::Acquire),
            user: self.generation(user_id),
        }
    }

    /// Record a mutation of `user_id`'s state. Returns the new generation.
    pub fn bump(&self, user_id: &str) -> u64 {
        let mut generation = self.generations.entry(user_id.to_string()).or_insert(0);
        *generation += 1;
        let next = *generation;
        drop(generation);

        self.entries.retain(|(_, user), _| user != user_id);
        next
    }

    /// Record a newly published manifest. Invalidates every entry.
    pub fn bump_registry(&self) {
        self.registry.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    pub fn get(&self, plugin_id: &str, user_id: &str) -> Option<Resolution> {
        let current = self.stamp(user_id);
        let key = (plugin_id.to_string(), user_id.to_string());
        self.entries
            .get(&key)
            .filter(|entry| entry.0 == current)
            .map(|entry| entry.1.clone())
    }

    /// Store `resolution` computed from state read under `stamp`. Dropped
    /// when the state has moved on since.
    pub fn put(&self, user_id: &str, stamp: Stamp, resolution: Resolution) {
        if stamp != self.stamp(user_id) {
            return;
        }
        self.entries.insert(
            (resolution.plugin_id.clone(), user_id.to_string()),
            (stamp, resolution),
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn resolution(plugin_id: &str) -> Resolution {
        Resolution {
            plugin_id: plugin_id.to_string(),
            version: Version::new(1, 0, 0),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            missing: Vec::new(),
            warnings: Vec::new(),
            install_order: Vec::new(),
            can_install: true,
        }
    }

    #[test]
    fn serves_entry_while_stamp_is_current() {
        let cache = ResolutionCache::new();
        let stamp = cache.stamp("u1");
        cache.put("u1", stamp, resolution("a"));
        assert_eq!(cache.get("a", "u1"), Some(resolution("a")));
        assert!(cache.get("a", "u2").is_none());
    }

    #[test]
    fn user_bump_invalidates_only_that_user() {
        let cache = ResolutionCache::new();
        cache.put("u1", cache.stamp("u1"), resolution("a"));
        cache.put("u2", cache.stamp("u2"), resolution("a"));

        assert_eq!(cache.bump("u1"), 1);
        assert!(cache.get("a", "u1").is_none());
        assert!(cache.get("a", "u2").is_some());
        assert_eq!(cache.generation("u2"), 0);
    }

    #[test]
    fn registry_bump_invalidates_everything() {
        let cache = ResolutionCache::new();
        cache.put("u1", cache.stamp("u1"), resolution("a"));
        cache.bump_registry();
        assert!(cache.get("a", "u1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn put_with_stale_stamp_is_dropped() {
        let cache = ResolutionCache::new();
        let stamp = cache.stamp("u1");
        cache.bump("u1");
        cache.put("u1", stamp, resolution("a"));
        assert!(cache.get("a", "u1").is_none());
        assert_eq!(cache.len(), 0);
    }
}
