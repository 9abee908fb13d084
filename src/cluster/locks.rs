//! Advisory per-key locks.
//!
//! Serializes read-modify-write sequences on a single key (index stats
//! counters, per-term posting merges under contention). The locks are
//! advisory: writers that follow the lock protocol are mutually excluded,
//! plain reads are never blocked.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// Acquires the lock for `key`, waiting if another task holds it.
    /// The key stays locked until the returned guard is dropped.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    pub fn clear(&self) {
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn lock_serializes_writers_on_same_key() {
        let locks = Arc::new(KeyLocks::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let _guard = locks.acquire("total_documents").await;
                    // Non-atomic read-modify-write; the lock makes it safe.
                    let current = counter.load(Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    counter.store(current + 1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 400);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_block_each_other() {
        let locks = KeyLocks::new();
        let guard_a = locks.acquire("alpha").await;
        // Must not deadlock while `alpha` is held.
        let _guard_b = locks.acquire("beta").await;
        drop(guard_a);
        let _guard_a2 = locks.acquire("alpha").await;
    }
}
