//! Aggregate locking
//!
//! Every mutating operation on a skill repository, a learner's history or a
//! personalized path first takes the exclusive lock of that aggregate. Locks
//! are scoped to one aggregate instance, so unrelated writes run in parallel.
//!
//! # Usage
//!
//! ```ignore
//! let manager = LockManager::with_defaults();
//! let _guard = manager
//!     .acquire(AggregateKind::Repository, repository_id.to_string(), "add-skill")
//!     .await?;
//! // ... mutate the repository; lock released on drop
//! ```

pub mod guard;
pub mod manager;
pub mod types;

pub use guard::{LockGuard, MultiLockGuard};
pub use manager::LockManager;
pub use types::{AggregateKind, LockConfig, LockError, LockInfo, LockResult, lock_key};
