//! Lock guards for RAII-style lock management
//!
//! Guards automatically release locks when dropped, ensuring proper cleanup
//! even in the presence of panics, early returns or cancelled futures.

use super::types::{AggregateKind, LockInfo};
use std::fmt;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

/// A lock held on one aggregate
///
/// The lock is released when the guard is dropped.
pub struct LockGuard {
    /// Information about the held lock
    info: LockInfo,

    /// Exclusive permit on the aggregate's slot
    _permit: OwnedMutexGuard<()>,
}

impl LockGuard {
    pub(crate) fn new(info: LockInfo, permit: OwnedMutexGuard<()>) -> Self {
        Self { info, _permit: permit }
    }

    /// Get the lock ID
    pub fn id(&self) -> Uuid {
        self.info.id
    }

    /// Get the aggregate kind
    pub fn kind(&self) -> AggregateKind {
        self.info.kind
    }

    /// Get the aggregate ID
    pub fn resource_id(&self) -> &str {
        &self.info.resource_id
    }

    /// Get the lock info
    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Explicitly release the lock (normally done automatically on drop)
    pub fn release(self) {}
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        debug!(lock_key = %self.info.lock_key(), holder = %self.info.holder_description, "Lock released");
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("info", &self.info).finish()
    }
}

impl fmt::Display for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lock[{}:{}]", self.info.kind, self.info.resource_id)
    }
}

/// A guard holding several aggregate locks, acquired in priority order
#[derive(Debug)]
pub struct MultiLockGuard {
    guards: Vec<LockGuard>,
}

impl MultiLockGuard {
    pub(crate) fn new(guards: Vec<LockGuard>) -> Self {
        Self { guards }
    }

    /// Number of locks held
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Keys of the held locks in acquisition order
    pub fn keys(&self) -> Vec<String> {
        self.guards.iter().map(|g| g.info().lock_key()).collect()
    }

    /// Release all locks explicitly
    pub fn release(self) {}
}
