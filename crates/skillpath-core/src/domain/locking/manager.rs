//! Lock manager implementation
//!
//! Serializes mutations per aggregate instance. Each aggregate gets its own
//! async mutex slot, so writers on different repositories, learners or
//! paths never wait for each other.

use super::guard::{LockGuard, MultiLockGuard};
use super::types::{AggregateKind, LockConfig, LockError, LockInfo, LockResult, lock_key};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Manages exclusive per-aggregate locks
pub struct LockManager {
    config: LockConfig,

    /// One mutex slot per aggregate key
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    /// Create a new lock manager
    pub fn new(config: LockConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Create a lock manager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(LockConfig::default())
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire a lock using the default timeout
    pub async fn acquire(
        &self,
        kind: AggregateKind,
        resource_id: impl Into<String>,
        holder: impl Into<String>,
    ) -> LockResult<LockGuard> {
        self.acquire_with_timeout(kind, resource_id, holder, self.config.default_timeout)
            .await
    }

    /// Acquire a lock, failing with [`LockError::Timeout`] if it is not free in time
    pub async fn acquire_with_timeout(
        &self,
        kind: AggregateKind,
        resource_id: impl Into<String>,
        holder: impl Into<String>,
        timeout: Duration,
    ) -> LockResult<LockGuard> {
        let resource_id = resource_id.into();
        let holder = holder.into();
        let key = lock_key(kind, &resource_id);
        let slot = self.slot(&key).await;

        match tokio::time::timeout(timeout, slot.lock_owned()).await {
            Ok(permit) => {
                debug!(lock_key = %key, holder = %holder, "Lock acquired");
                let info = LockInfo::new(kind, resource_id, holder);
                Ok(LockGuard::new(info, permit))
            }
            Err(_) => {
                warn!(lock_key = %key, holder = %holder, timeout_ms = timeout.as_millis() as u64, "Lock acquisition timed out");
                Err(LockError::Timeout {
                    resource: key,
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Acquire several locks at once
    ///
    /// Locks are taken in (priority, id) order so concurrent callers locking
    /// overlapping sets cannot deadlock. Duplicate requests collapse into one.
    pub async fn acquire_multiple(
        &self,
        mut requests: Vec<(AggregateKind, String)>,
        holder: impl Into<String>,
    ) -> LockResult<MultiLockGuard> {
        let holder = holder.into();
        requests.sort_by(|a, b| (a.0.priority(), &a.1).cmp(&(b.0.priority(), &b.1)));
        requests.dedup();

        let mut guards = Vec::with_capacity(requests.len());
        for (kind, resource_id) in requests {
            // Already-acquired guards are dropped on error
            let guard = self.acquire(kind, resource_id, holder.clone()).await?;
            guards.push(guard);
        }

        Ok(MultiLockGuard::new(guards))
    }

    async fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().await;

        if slots.len() >= self.config.prune_threshold {
            // A slot referenced only by the map has no holder and no waiter
            let before = slots.len();
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            debug!(pruned = before - slots.len(), "Pruned idle lock slots");
        }

        slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick_manager() -> LockManager {
        LockManager::new(LockConfig::default().with_timeout(Duration::from_millis(50)))
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let manager = quick_manager();

        let guard = manager
            .acquire(AggregateKind::Repository, "r1", "test")
            .await
            .unwrap();
        assert_eq!(guard.kind(), AggregateKind::Repository);
        assert_eq!(guard.resource_id(), "r1");
        assert!(manager.acquire(AggregateKind::Repository, "r1", "other").await.is_err());

        drop(guard);
        assert!(manager.acquire(AggregateKind::Repository, "r1", "other").await.is_ok());
    }

    #[tokio::test]
    async fn test_second_acquire_times_out_while_held() {
        let manager = quick_manager();
        let _guard = manager
            .acquire(AggregateKind::Path, "p1", "holder")
            .await
            .unwrap();

        let err = manager
            .acquire(AggregateKind::Path, "p1", "waiter")
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Timeout { .. }));
        assert_eq!(err.resource(), "path:p1");
    }

    #[tokio::test]
    async fn test_distinct_aggregates_do_not_block() {
        let manager = quick_manager();
        let _a = manager
            .acquire(AggregateKind::Repository, "r1", "a")
            .await
            .unwrap();
        let _b = manager
            .acquire(AggregateKind::Repository, "r2", "b")
            .await
            .unwrap();
        let c = manager.acquire(AggregateKind::Path, "r1", "c").await;
        assert!(c.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let manager = Arc::new(LockManager::with_defaults());
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = manager
                    .acquire(AggregateKind::Learner, "alice", format!("task-{}", i))
                    .await
                    .unwrap();
                let seen = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(seen + 1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Exclusive access means no increment was lost
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_acquire_multiple_sorted_and_deduplicated() {
        let manager = quick_manager();
        let guard = manager
            .acquire_multiple(
                vec![
                    (AggregateKind::Path, "p1".to_string()),
                    (AggregateKind::Repository, "r2".to_string()),
                    (AggregateKind::Repository, "r1".to_string()),
                    (AggregateKind::Repository, "r2".to_string()),
                ],
                "multi",
            )
            .await
            .unwrap();

        assert_eq!(
            guard.keys(),
            vec!["repository:r1", "repository:r2", "path:p1"]
        );

        drop(guard);
        let again = manager
            .acquire_multiple(
                vec![
                    (AggregateKind::Repository, "r1".to_string()),
                    (AggregateKind::Path, "p1".to_string()),
                ],
                "again",
            )
            .await
            .unwrap();
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_multiple_releases_partial_on_timeout() {
        let manager = quick_manager();
        let _held = manager
            .acquire(AggregateKind::Repository, "r2", "other")
            .await
            .unwrap();

        let result = manager
            .acquire_multiple(
                vec![
                    (AggregateKind::Repository, "r1".to_string()),
                    (AggregateKind::Repository, "r2".to_string()),
                ],
                "multi",
            )
            .await;

        assert!(result.is_err());
        // r1 was released when r2 timed out
        assert!(manager.acquire(AggregateKind::Repository, "r1", "next").await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let manager = LockManager::new(LockConfig {
            default_timeout: Duration::from_millis(50),
            prune_threshold: 4,
        });

        for i in 0..10 {
            let guard = manager
                .acquire(AggregateKind::Path, format!("p{}", i), "test")
                .await
                .unwrap();
            drop(guard);
        }

        assert!(manager.slots.lock().await.len() <= 4);
    }
}
