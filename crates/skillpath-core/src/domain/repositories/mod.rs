//! Skill repositories
//!
//! Owned, versioned containers of skills.

pub mod entity;
pub mod manager;
pub(crate) mod repository;

pub use entity::{
    NewRepository, Pagination, RepositoryDetail, RepositoryFilter, RepositoryUpdate,
    SkillRepository,
};
pub use manager::RepositoryManager;
