//! Domain layer
//!
//! Contains the core business logic and domain models.

pub mod enrollment;
pub mod graph;
pub mod history;
pub mod locking;
pub mod patch;
pub mod repositories;
pub mod resolver;
pub mod units;
