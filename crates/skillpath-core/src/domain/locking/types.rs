//! Lock types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Result type for lock operations
pub type LockResult<T> = std::result::Result<T, LockError>;

/// Lock errors
#[derive(Error, Debug, Clone)]
pub enum LockError {
    /// Lock acquisition timed out
    #[error("Lock timeout: aggregate '{resource}' still held after {waited_ms}ms")]
    Timeout { resource: String, waited_ms: u64 },
}

impl LockError {
    /// Get error code for this lock error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "E500",
        }
    }

    /// Key of the aggregate the error is about
    pub fn resource(&self) -> &str {
        match self {
            Self::Timeout { resource, .. } => resource,
        }
    }
}

impl From<LockError> for crate::error::Error {
    fn from(err: LockError) -> Self {
        Self::LockTimeout(err.resource().to_string())
    }
}

/// Kind of aggregate being locked
///
/// Mutations are serialized per aggregate instance, never globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    /// A skill repository and every skill it owns
    Repository,
    /// A learner's learning history
    Learner,
    /// A personalized learning path and its unit instances
    Path,
}

impl AggregateKind {
    /// Get the lock priority (lower = acquired first)
    pub fn priority(&self) -> u8 {
        match self {
            Self::Repository => 0,
            Self::Learner => 1,
            Self::Path => 2,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repository",
            Self::Learner => "learner",
            Self::Path => "path",
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the key identifying one aggregate instance
pub fn lock_key(kind: AggregateKind, resource_id: &str) -> String {
    format!("{}:{}", kind.as_str(), resource_id)
}

/// Information about a held lock
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Lock ID
    pub id: Uuid,

    /// Kind of aggregate locked
    pub kind: AggregateKind,

    /// Aggregate identifier
    pub resource_id: String,

    /// What holds the lock (e.g. "graph-store:add-skill")
    pub holder_description: String,

    /// When the lock was acquired
    pub acquired_at: DateTime<Utc>,
}

impl LockInfo {
    pub fn new(kind: AggregateKind, resource_id: String, holder_description: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            resource_id,
            holder_description,
            acquired_at: Utc::now(),
        }
    }

    /// Get the lock key
    pub fn lock_key(&self) -> String {
        lock_key(self.kind, &self.resource_id)
    }
}

/// Configuration for the lock manager
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Default timeout for lock acquisition
    pub default_timeout: Duration,

    /// Number of idle lock slots tolerated before pruning
    pub prune_threshold: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            prune_threshold: 1024,
        }
    }
}

impl LockConfig {
    /// Set the default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_priority() {
        assert!(AggregateKind::Repository.priority() < AggregateKind::Learner.priority());
        assert!(AggregateKind::Learner.priority() < AggregateKind::Path.priority());
    }

    #[test]
    fn test_lock_key() {
        let info = LockInfo::new(AggregateKind::Path, "abc123".to_string(), "test".to_string());
        assert_eq!(info.lock_key(), "path:abc123");
        assert_eq!(lock_key(AggregateKind::Repository, "r1"), "repository:r1");
    }

    #[test]
    fn test_timeout_maps_to_core_error() {
        let err = LockError::Timeout {
            resource: "repository:r1".to_string(),
            waited_ms: 10,
        };
        assert_eq!(err.code(), "E500");

        let core: crate::error::Error = err.into();
        assert_eq!(core.code(), "E500");
        assert!(core.to_string().contains("repository:r1"));
    }

    #[test]
    fn test_lock_config_builder() {
        let config = LockConfig::default().with_timeout(Duration::from_millis(250));
        assert_eq!(config.default_timeout, Duration::from_millis(250));
    }
}
