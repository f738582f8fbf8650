//! Learning history entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::enrollment::{PathOrigin, PathStatus};
use crate::domain::resolver::ResolveMode;

/// A skill a learner has acquired
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedSkill {
    pub skill_id: Uuid,
    pub learned_at: DateTime<Utc>,
}

/// Lightweight view of a personalized path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSummary {
    pub id: Uuid,
    pub origin: PathOrigin,
    pub mode: ResolveMode,
    pub status: PathStatus,
    pub unit_count: usize,
    pub finished_units: usize,
    pub updated_at: DateTime<Utc>,
}

/// Everything recorded about one learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningHistory {
    pub learner_id: String,
    pub created_at: DateTime<Utc>,
    pub learned_skills: Vec<LearnedSkill>,
    /// Most recently updated first
    pub paths: Vec<PathSummary>,
}
