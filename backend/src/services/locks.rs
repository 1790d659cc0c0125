//! Per-item mutual exclusion for balance-changing operations

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

type LockMap = HashMap<Uuid, Arc<Mutex<()>>>;

/// Exclusive lock held for the read-validate-append-write unit on one item.
/// Released on drop, including when the owning future is cancelled.
pub struct ItemGuard {
    item_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockMap>>,
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        forget_if_unused(&self.locks, self.item_id);
    }
}

/// One async mutex per stock item id; operations on different items never
/// contend. An entry lives only while someone holds or waits for it.
#[derive(Default)]
pub struct ItemLocks {
    locks: Arc<StdMutex<LockMap>>,
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `item_id`, giving up with `Busy` after `timeout`
    pub async fn acquire(&self, item_id: Uuid, timeout: Duration) -> AppResult<ItemGuard> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(item_id).or_default().clone()
        };

        match tokio::time::timeout(timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(ItemGuard {
                item_id,
                guard: Some(guard),
                locks: self.locks.clone(),
            }),
            Err(_) => {
                forget_if_unused(&self.locks, item_id);
                tracing::warn!(item_id = %item_id, ?timeout, "Timed out waiting for stock item lock");
                Err(AppError::Busy(format!(
                    "stock item {} is locked by another operation",
                    item_id
                )))
            }
        }
    }
}

/// Drop the entry for `item_id` once no holder or waiter references it
fn forget_if_unused(locks: &StdMutex<LockMap>, item_id: Uuid) {
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    if locks
        .get(&item_id)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        locks.remove(&item_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(locks: &ItemLocks) -> usize {
        locks.locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_same_item_times_out_while_held() {
        let locks = ItemLocks::new();
        let id = Uuid::new_v4();

        let _held = locks.acquire(id, Duration::from_millis(50)).await.unwrap();
        let second = locks.acquire(id, Duration::from_millis(20)).await;
        assert!(matches!(second, Err(AppError::Busy(_))));
        // The holder keeps its entry after the waiter gives up
        assert_eq!(tracked(&locks), 1);
    }

    #[tokio::test]
    async fn test_different_items_do_not_contend() {
        let locks = ItemLocks::new();

        let _a = locks.acquire(Uuid::new_v4(), Duration::from_millis(50)).await.unwrap();
        let b = locks.acquire(Uuid::new_v4(), Duration::from_millis(50)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let locks = ItemLocks::new();
        let id = Uuid::new_v4();

        drop(locks.acquire(id, Duration::from_millis(50)).await.unwrap());
        assert!(locks.acquire(id, Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_entries_dropped_after_release() {
        let locks = ItemLocks::new();

        for _ in 0..10 {
            let guard = locks.acquire(Uuid::new_v4(), Duration::from_millis(50)).await.unwrap();
            assert_eq!(tracked(&locks), 1);
            drop(guard);
        }

        assert_eq!(tracked(&locks), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_queued() {
        let locks = Arc::new(ItemLocks::new());
        let id = Uuid::new_v4();

        let held = locks.acquire(id, Duration::from_millis(50)).await.unwrap();
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id, Duration::from_secs(1)).await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(tracked(&locks), 0);
    }
}
