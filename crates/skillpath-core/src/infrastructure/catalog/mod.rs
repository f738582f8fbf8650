//! Learning unit catalog implementations
//!
//! This module contains the concrete implementation of the unit catalog
//! trait using SQLite.

mod repository;

pub use repository::SqliteUnitCatalog;
