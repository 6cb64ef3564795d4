//! Per-key async locks.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap<K> = DashMap<K, Arc<Mutex<()>>>;

/// One async mutex per key, created on first use and dropped with its last
/// guard.
///
/// Holders of the same key are serialised; different keys never contend.
/// Callers locking several keys must do so in ascending key order. The map
/// only holds keys that are locked or awaited right now.
pub struct KeyedLocks<K: Eq + Hash + Clone> {
    inner: Arc<LockMap<K>>,
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub async fn lock(&self, key: K) -> KeyGuard<K> {
        let mutex = self
            .inner
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            key,
            guard: Some(guard),
            map: self.inner.clone(),
        }
    }

    /// Lock two distinct keys in ascending order.
    pub async fn lock_pair(&self, a: K, b: K) -> [KeyGuard<K>; 2]
    where
        K: Ord,
    {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        [first, second]
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Held lock on one key. Dropping it releases the key and forgets the mutex
/// once nobody else holds or awaits it.
pub struct KeyGuard<K: Eq + Hash + Clone> {
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
    map: Arc<LockMap<K>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are only taken under the shard lock, so a count of one here
        // means no other task can be holding or waiting on this mutex.
        self.map
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyedLocks::new();
        let guard = locks.lock(1u64).await;
        let pending = tokio::time::timeout(Duration::from_millis(50), locks.lock(1u64)).await;
        assert!(pending.is_err());
        drop(guard);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), locks.lock(1u64))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyedLocks::new();
        let _a = locks.lock(1u64).await;
        assert!(
            tokio::time::timeout(Duration::from_millis(50), locks.lock(2u64))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn lock_pair_orders_keys() {
        let locks = KeyedLocks::new();
        let held = locks.lock_pair(9u64, 3u64).await;
        drop(held);
        let _again = locks.lock_pair(3u64, 9u64).await;
    }

    #[tokio::test]
    async fn released_keys_are_forgotten() {
        let locks = KeyedLocks::new();
        for key in 0..100u64 {
            let _guard = locks.lock(key).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());

        let pair = locks.lock_pair(5u64, 6u64).await;
        assert_eq!(locks.len(), 2);
        drop(pair);
        assert!(locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn contended_key_survives_until_last_waiter() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let tasks = (0..32)
            .map(|_| {
                let locks = locks.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    let _guard = locks.lock(7u64).await;
                    let seen = counter.load(std::sync::atomic::Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    counter.store(seen + 1, std::sync::atomic::Ordering::SeqCst);
                })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 32);
        assert!(locks.is_empty());
    }
}
