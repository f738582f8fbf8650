//! Skill entities and mutation requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::patch::Patch;

/// A skill inside a repository
///
/// `parent_skill_ids` is derived from the nesting edges on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: Uuid,
    pub repository_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub level: i32,
    pub nested_skill_ids: Vec<Uuid>,
    pub parent_skill_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a skill
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSkill {
    pub repository_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub level: i32,
    /// Existing skills to nest under the new one
    pub nested_skill_ids: Vec<Uuid>,
    /// Existing skills the new one is nested under
    pub parent_skill_ids: Vec<Uuid>,
}

impl NewSkill {
    pub fn new(repository_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            repository_id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn nesting(mut self, child_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.nested_skill_ids.extend(child_ids);
        self
    }

    pub fn nested_under(mut self, parent_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.parent_skill_ids.extend(parent_ids);
        self
    }
}

/// Replacement of a skill's nesting relations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingUpdate {
    pub nested: Patch<Vec<Uuid>>,
    pub parents: Patch<Vec<Uuid>>,
}

impl NestingUpdate {
    pub fn set_nested(child_ids: Vec<Uuid>) -> Self {
        Self {
            nested: Patch::Set(child_ids),
            parents: Patch::Keep,
        }
    }

    pub fn set_parents(parent_ids: Vec<Uuid>) -> Self {
        Self {
            nested: Patch::Keep,
            parents: Patch::Set(parent_ids),
        }
    }
}

/// Attribute changes for a skill
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillUpdate {
    pub name: Option<String>,
    pub description: Patch<String>,
    pub level: Option<i32>,
}

/// What is wrong with a referenced skill id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceProblem {
    /// No skill with this id exists
    Missing,
    /// The skill lives in a different repository
    ForeignRepository,
}

impl fmt::Display for ReferenceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing skill"),
            Self::ForeignRepository => f.write_str("skill of another repository"),
        }
    }
}

/// Why one skill cannot be deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionBlocker {
    pub skill_id: Uuid,
    /// Units listing the skill as prerequisite or teaching goal
    pub unit_ids: Vec<Uuid>,
    /// Skills outside the deletion set that nest this one
    pub foreign_parent_ids: Vec<Uuid>,
}

impl DeletionBlocker {
    pub fn is_blocking(&self) -> bool {
        !self.unit_ids.is_empty() || !self.foreign_parent_ids.is_empty()
    }
}
