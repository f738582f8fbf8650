//! Learning unit catalog
//!
//! Units and template paths are authored outside this system. The core only
//! reads them through the [`UnitCatalog`] trait: to build resolver inputs,
//! to copy template sequences, and to guard skill deletion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// An immutable learning unit as seen by the resolver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub id: Uuid,
    pub title: String,
    /// Skills a learner needs before taking the unit
    pub required_skill_ids: Vec<Uuid>,
    /// Skills the unit teaches
    pub teaching_goal_ids: Vec<Uuid>,
}

impl UnitSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            required_skill_ids: Vec::new(),
            teaching_goal_ids: Vec::new(),
        }
    }

    pub fn requires(mut self, skill_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.required_skill_ids.extend(skill_ids);
        self
    }

    pub fn teaches(mut self, skill_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.teaching_goal_ids.extend(skill_ids);
        self
    }

    /// Every skill the unit references, prerequisites first
    pub fn referenced_skill_ids(&self) -> impl Iterator<Item = &Uuid> {
        self.required_skill_ids
            .iter()
            .chain(self.teaching_goal_ids.iter())
    }
}

/// A pre-authored, ordered sequence of units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePath {
    pub id: Uuid,
    pub title: String,
    pub unit_ids: Vec<Uuid>,
}

/// Which units to offer the resolver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    /// Restrict to these units; `None` offers the whole catalog
    pub unit_ids: Option<Vec<Uuid>>,
}

impl UnitFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(unit_ids: Vec<Uuid>) -> Self {
        Self {
            unit_ids: Some(unit_ids),
        }
    }
}

/// Read access to the learning unit catalog
#[async_trait]
pub trait UnitCatalog: Send + Sync {
    /// Units eligible as resolver candidates
    async fn list_candidate_units(&self, filter: &UnitFilter) -> Result<Vec<UnitSpec>>;

    /// Ids of units listing any of the skills as prerequisite or teaching goal
    async fn units_referencing(&self, skill_ids: &[Uuid]) -> Result<Vec<UnitReference>>;

    /// Look up one unit
    async fn unit(&self, unit_id: Uuid) -> Result<Option<UnitSpec>>;

    /// Look up a template path
    async fn template_path(&self, path_id: Uuid) -> Result<Option<TemplatePath>>;
}

/// A unit that references a skill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitReference {
    pub unit_id: Uuid,
    pub skill_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referenced_skill_ids() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let unit = UnitSpec::new("Ownership").requires([a]).teaches([b]);

        let referenced: Vec<_> = unit.referenced_skill_ids().copied().collect();
        assert_eq!(referenced, vec![a, b]);
    }

    #[test]
    fn test_filter_constructors() {
        assert!(UnitFilter::all().unit_ids.is_none());
        let id = Uuid::new_v4();
        assert_eq!(UnitFilter::only(vec![id]).unit_ids, Some(vec![id]));
    }
}
