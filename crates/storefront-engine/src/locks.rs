//! # Keyed Locks
//!
//! One async mutex per key (product id, client id, coupon code), created on
//! first use. Work on different keys never contends.
//!
//! ```text
//! KeyedLocks("product")
//! ┌──────────────────────────────────────────────┐
//! │  "sku-1" ──► Arc<Mutex<()>>   (held by A)    │
//! │  "sku-2" ──► Arc<Mutex<()>>   (B waiting)    │
//! │  "sku-9" ──► Arc<Mutex<()>>   (idle)         │ ◄─ pruned once the map
//! └──────────────────────────────────────────────┘    passes the threshold
//! ```
//!
//! The map itself sits behind a std mutex that is only held to look up or
//! insert a slot, never across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Guard for one key. The key stays locked until this is dropped.
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct KeyedLocks {
    name: &'static str,
    slots: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    prune_threshold: usize,
}

impl KeyedLocks {
    /// `prune_threshold` bounds how many idle slots may pile up before they
    /// are dropped.
    pub fn new(name: &'static str, prune_threshold: usize) -> Self {
        KeyedLocks {
            name,
            slots: Mutex::new(HashMap::new()),
            prune_threshold: prune_threshold.max(1),
        }
    }

    /// Waits for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let slot = self.slot(key);
        trace!(locks = self.name, key, "Acquiring key lock");
        slot.lock_owned().await
    }

    /// Number of slots currently tracked.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        if slots.len() >= self.prune_threshold {
            // A slot nobody holds or waits on has exactly one reference: ours
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        slots.entry(key.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::new("test", 64));
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.lock("shared").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                for _ in 0..10 {
                    tokio::task::yield_now().await;
                }
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks = KeyedLocks::new("test", 64);
        let _a = locks.lock("a").await;
        // Would hang if "b" shared a's mutex
        let _b = locks.lock("b").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let locks = KeyedLocks::new("test", 4);
        for i in 0..4 {
            drop(locks.lock(&format!("k{}", i)).await);
        }
        let held = locks.lock("held").await;
        // Threshold reached: the four idle slots were dropped before inserting
        assert_eq!(locks.len(), 1);

        drop(locks.lock("other").await);
        assert_eq!(locks.len(), 2);
        drop(held);
    }
}
