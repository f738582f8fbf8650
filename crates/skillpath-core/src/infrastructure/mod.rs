//! Infrastructure layer
//!
//! Contains implementations of the traits the domain consumes: the SQLite
//! unit catalog and the HTTP goal resolver.

pub mod catalog;
pub mod resolver;

pub use catalog::SqliteUnitCatalog;
pub use resolver::{HttpGoalResolver, UnconfiguredResolver};
