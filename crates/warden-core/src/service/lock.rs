//! Per-(user, plugin) serialization.
//!
//! Mutating operations on one pair hold that pair's mutex for their whole
//! duration, so two requests for the same pair never interleave. Commits
//! that must be validated against the user's installed set additionally
//! hold a short per-user commit lock. Lock order is always pair, then user;
//! the user lock is never held while waiting for a pair lock, and no caller
//! holds two pair locks at once. A released mutex that nobody waits on is
//! removed from the registry by its guard.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap<K> = DashMap<K, Arc<Mutex<()>>>;

#[derive(Debug, Default)]
pub struct LockRegistry {
    pairs: LockMap<(String, String)>,
    users: LockMap<String>,
}

/// Held lock. Dropping it releases the mutex and forgets the entry when no
/// other task holds or waits on it.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, K: Eq + Hash> {
    map: &'a LockMap<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for LockGuard<'_, K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.map.remove_if(&self.key, |_, m| Arc::strong_count(m) == 1);
    }
}

async fn acquire<K: Eq + Hash + Clone>(map: &LockMap<K>, key: K) -> LockGuard<'_, K> {
    // Clone the Arc out so no DashMap shard guard is held across the await.
    let mutex = map.entry(key.clone()).or_default().clone();
    let guard = mutex.lock_owned().await;
    LockGuard {
        map,
        key,
        guard: Some(guard),
    }
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one (user, plugin) pair.
    pub async fn pair(&self, user_id: &str, plugin_id: &str) -> LockGuard<'_, (String, String)> {
        acquire(&self.pairs, (user_id.to_string(), plugin_id.to_string())).await
    }

    /// Wait for the user's commit lock.
    pub async fn user_commit(&self, user_id: &str) -> LockGuard<'_, String> {
        acquire(&self.users, user_id.to_string()).await
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_pair_is_serialized() {
        let locks = Arc::new(LockRegistry::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let (locks, active, max_seen) = (locks.clone(), active.clone(), max_seen.clone());
            handles.push(tokio::spawn(async move {
                let _guard = locks.pair("u1", "p").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_pairs_do_not_block_each_other() {
        let locks = LockRegistry::new();
        let _a = locks.pair("u1", "a").await;
        let acquired = tokio::time::timeout(Duration::from_millis(100), locks.pair("u1", "b")).await;
        assert!(acquired.is_ok());
        let other_user = tokio::time::timeout(Duration::from_millis(100), locks.pair("u2", "a")).await;
        assert!(other_user.is_ok());
    }

    #[tokio::test]
    async fn released_locks_leave_the_registry() {
        let locks = LockRegistry::new();
        let held = locks.pair("u1", "a").await;
        drop(locks.pair("u1", "b").await);
        assert_eq!(locks.pair_count(), 1);
        drop(held);
        assert_eq!(locks.pair_count(), 0);

        drop(locks.user_commit("u1").await);
        assert_eq!(locks.user_count(), 0);
    }

    #[tokio::test]
    async fn waiter_keeps_entry_alive() {
        let locks = Arc::new(LockRegistry::new());
        let held = locks.pair("u1", "a").await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.pair("u1", "a").await;
            })
        };
        // Give the waiter time to clone the mutex out of the map.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(locks.pair_count(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.pair_count(), 0);
    }
}
