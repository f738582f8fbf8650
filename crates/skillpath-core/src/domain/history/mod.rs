//! Learning histories and progress tracking

pub mod entity;
pub(crate) mod repository;
pub mod tracker;

pub use entity::{LearnedSkill, LearningHistory, PathSummary};
pub use tracker::ProgressTracker;
