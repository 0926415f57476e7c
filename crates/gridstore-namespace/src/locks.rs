//! Per-namespace write serialization

use dashmap::DashMap;
use gridstore_core::{NamespaceId, Result, with_deadline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Table of cooperative locks, one per namespace id with a holder or waiter.
///
/// Entries are dropped once the last guard for an id is released.
#[derive(Clone, Default)]
pub struct NamespaceLocks {
    locks: Arc<DashMap<NamespaceId, Arc<Mutex<()>>>>,
}

impl NamespaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `namespace_id`, up to `timeout`
    pub async fn acquire(&self, namespace_id: &NamespaceId, timeout: Duration) -> Result<NamespaceGuard> {
        let lock = self.locks.entry(namespace_id.clone()).or_default().clone();
        let acquired = with_deadline("namespace.lock", timeout, async {
            Ok(lock.lock_owned().await)
        })
        .await;
        let guard = match acquired {
            Ok(guard) => guard,
            Err(err) => {
                self.locks
                    .remove_if(namespace_id, |_, lock| Arc::strong_count(lock) == 1);
                return Err(err);
            }
        };

        Ok(NamespaceGuard {
            namespace_id: namespace_id.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        })
    }

    /// Number of ids currently tracked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Held for the duration of a mutating operation; released on drop
pub struct NamespaceGuard {
    namespace_id: NamespaceId,
    locks: Arc<DashMap<NamespaceId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NamespaceGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the table's own reference left: nobody holds or waits
        self.locks
            .remove_if(&self.namespace_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_same_id_is_serialized() {
        let locks = NamespaceLocks::new();
        let id = NamespaceId::from("ns");
        let active = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let id = id.clone();
                let active = active.clone();
                tokio::spawn(async move {
                    let _guard = locks.acquire(&id, TIMEOUT).await.unwrap();
                    assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_ids_do_not_block() {
        let locks = NamespaceLocks::new();
        let _a = locks.acquire(&NamespaceId::from("a"), TIMEOUT).await.unwrap();
        let _b = locks.acquire(&NamespaceId::from("b"), TIMEOUT).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_times_out() {
        let locks = NamespaceLocks::new();
        let id = NamespaceId::from("ns");
        let _held = locks.acquire(&id, TIMEOUT).await.unwrap();

        let err = locks
            .acquire(&id, Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, gridstore_core::Error::ProviderTimeout { .. }));
    }
}
