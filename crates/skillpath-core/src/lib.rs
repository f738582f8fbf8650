//! Skillpath Core Library
//!
//! This crate provides the core functionality for skillpath, including:
//! - Skill repositories and the nested skill graph (acyclic, repository-local)
//! - Learning unit catalog and template paths
//! - Personalized path enrollment through an external goal resolver
//! - Learning histories and unit consumption tracking
//! - Per-aggregate locking
//! - Storage (SQLite)

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

pub use context::CoreContext;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::CoreContext;
    pub use crate::domain::enrollment::{
        ConsumptionUpdate, EnrollmentRequest, PathOrigin, PathStatus, PersonalizedPath, UnitStatus,
    };
    pub use crate::domain::graph::{NestingUpdate, NewSkill, Skill, SkillUpdate};
    pub use crate::domain::history::{LearningHistory, PathSummary};
    pub use crate::domain::patch::Patch;
    pub use crate::domain::repositories::{
        NewRepository, Pagination, RepositoryFilter, RepositoryUpdate, SkillRepository,
    };
    pub use crate::domain::resolver::{GoalResolver, ResolveMode, ResolveOutcome, ResolveRequest};
    pub use crate::domain::units::{TemplatePath, UnitSpec};
    pub use crate::error::{Error, Result};
}
