//! Per-key async mutex whose entries disappear once nobody holds or awaits them.

use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap<K> = Arc<DashMap<K, Weak<Mutex<()>>>>;

/// Guard returned by [`KeyedAsyncLock::lock`].
///
/// Dropping the last guard for a key removes the key from the lock map.
pub struct KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    guard: Option<OwnedMutexGuard<()>>,
    mutex: Arc<Mutex<()>>,
    key: K,
    locks: LockMap<K>,
}

impl<K> KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    /// Key this guard serializes on.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Drop for KeyedLockGuard<K>
where
    K: Hash + Eq + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());

        // Only `self.mutex` left means no holder and no waiter.
        if Arc::strong_count(&self.mutex) == 1 {
            self.locks
                .remove_if(&self.key, |_, weak| weak.strong_count() <= 1);
        }
    }
}

/// Serializes async work per key while letting different keys proceed in parallel.
///
/// Mutexes are stored as `Weak` references, so the map only holds entries for keys
/// that are currently locked or awaited.
///
/// ```rust,ignore
/// let locks = KeyedAsyncLock::<String>::new();
/// let _guard = locks.lock(&"whiz-operator/aigen".to_string()).await;
/// // exclusive section for this key
/// ```
pub struct KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    locks: LockMap<K>,
}

impl<K> KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Waits until the lock for `key` is free and takes it.
    pub async fn lock(&self, key: &K) -> KeyedLockGuard<K> {
        let mutex = self.mutex_for(key);
        let guard = Arc::clone(&mutex).lock_owned().await;

        KeyedLockGuard {
            guard: Some(guard),
            mutex,
            key: key.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Returns true while some task holds or awaits the lock for `key`.
    pub fn is_contended(&self, key: &K) -> bool {
        self.locks
            .get(key)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    fn mutex_for(&self, key: &K) -> Arc<Mutex<()>> {
        loop {
            match self.locks.entry(key.clone()) {
                Entry::Occupied(occupied) => {
                    if let Some(strong) = occupied.get().upgrade() {
                        return strong;
                    }
                    // stale entry left behind by a racing drop
                    occupied.remove();
                }
                Entry::Vacant(vacant) => {
                    let strong = Arc::new(Mutex::new(()));
                    vacant.insert(Arc::downgrade(&strong));
                    return strong;
                }
            }
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for KeyedAsyncLock<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use similar_asserts::assert_eq;
    use tokio::time::sleep;

    use super::*;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedAsyncLock::<String>::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&"ops/aigen".to_string()).await;
                let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(1)).await;
                in_section.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let locks = Arc::new(KeyedAsyncLock::<String>::new());
        let start = Instant::now();

        let mut handles = vec![];
        for i in 0..5 {
            let locks = Arc::clone(&locks);
            let key = format!("ns-{i}/aigen");
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock(&key).await;
                sleep(Duration::from_millis(50)).await;
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        // ~50ms if concurrent, ~250ms if serialized
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn entries_are_removed_after_last_guard() {
        let locks = KeyedAsyncLock::<u32>::new();

        let first = locks.lock(&1).await;
        let second = locks.lock(&2).await;
        assert_eq!(locks.len(), 2);
        assert!(locks.is_contended(&1));
        assert_eq!(*first.key(), 1);

        drop(first);
        assert_eq!(locks.len(), 1);
        assert!(!locks.is_contended(&1));

        drop(second);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_keeps_entry_alive() {
        let locks = Arc::new(KeyedAsyncLock::<u32>::new());
        let guard = locks.lock(&7).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(&7).await;
            })
        };
        tokio::task::yield_now().await;

        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
