//! Skill graph
//!
//! Skills live in repositories and nest each other in a directed acyclic
//! graph restricted to one repository.
//!
//! - `arena`: in-memory adjacency snapshot used for validation
//! - `entity`: skills, requests and validation outcomes
//! - `repository`: SQL access to skills and nesting edges
//! - `store`: locked, transactional mutations

pub mod arena;
pub mod entity;
pub(crate) mod repository;
pub mod store;

pub use arena::{GraphError, SkillGraph};
pub use entity::{DeletionBlocker, NestingUpdate, NewSkill, ReferenceProblem, Skill, SkillUpdate};
pub use store::SkillGraphStore;
