//! Storage layer - SQLite
//!
//! Provides database management and migrations for skillpath.
//!
//! # Architecture
//!
//! - `database`: Connection pool management and initialization
//! - `migrations`: Schema versioning and automatic migration
//!
//! # Usage
//!
//! ```ignore
//! use skillpath_core::storage::Database;
//!
//! // Create an in-memory database for testing
//! let db = Database::in_memory().await?;
//! ```

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, DatabaseLocation, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus, migration_status, run_migrations};

use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Start a transaction that holds the write lock from its first statement
///
/// A deferred transaction that reads before writing cannot be upgraded once
/// another connection has committed; SQLite fails it with `SQLITE_BUSY`
/// instead of waiting out the busy timeout.
pub(crate) async fn begin_write(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Parse a UUID stored as TEXT
pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Other(format!("Invalid id '{}' in database: {}", raw, e)))
}

/// Parse a JSON array of UUIDs stored as TEXT
pub(crate) fn parse_uuid_list(raw: &str) -> Result<Vec<Uuid>> {
    Ok(serde_json::from_str(raw)?)
}
