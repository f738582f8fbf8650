//! Consistent resolver input captured before a resolution

use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{ResolveMode, ResolveRequest};
use crate::domain::graph::repository as skill_rows;
use crate::domain::units::{UnitCatalog, UnitFilter, UnitSpec};
use crate::error::{Error, Result};

/// Known skills, validated goals and candidate units at one moment
///
/// Owned by value so the resolver can run without any lock or transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSnapshot {
    pub known_skill_ids: BTreeSet<Uuid>,
    pub goal_skill_ids: BTreeSet<Uuid>,
    pub candidate_units: Vec<UnitSpec>,
    /// Units left out because they reference skills that no longer exist
    pub dropped_unit_ids: Vec<Uuid>,
}

impl ResolutionSnapshot {
    /// Capture a snapshot
    ///
    /// Every goal must be an existing skill. Candidate units referencing a
    /// missing skill are dropped.
    pub async fn capture(
        pool: &SqlitePool,
        catalog: &dyn UnitCatalog,
        known_skill_ids: BTreeSet<Uuid>,
        goal_skill_ids: BTreeSet<Uuid>,
        filter: &UnitFilter,
    ) -> Result<Self> {
        let units = catalog.list_candidate_units(filter).await?;

        let mut referenced: BTreeSet<Uuid> = goal_skill_ids.clone();
        for unit in &units {
            referenced.extend(unit.referenced_skill_ids().copied());
        }
        let referenced: Vec<Uuid> = referenced.into_iter().collect();

        let existing = {
            let mut conn = pool.acquire().await?;
            skill_rows::existing_skills(&mut conn, &referenced).await?
        };

        if let Some(missing) = goal_skill_ids.iter().find(|id| !existing.contains_key(*id)) {
            return Err(Error::SkillNotFound(*missing));
        }

        let mut candidate_units = Vec::with_capacity(units.len());
        let mut dropped_unit_ids = Vec::new();
        for unit in units {
            if unit.referenced_skill_ids().all(|id| existing.contains_key(id)) {
                candidate_units.push(unit);
            } else {
                warn!(unit_id = %unit.id, "Dropping unit referencing missing skills");
                dropped_unit_ids.push(unit.id);
            }
        }

        debug!(
            known = known_skill_ids.len(),
            goals = goal_skill_ids.len(),
            candidates = candidate_units.len(),
            dropped = dropped_unit_ids.len(),
            "Captured resolution snapshot"
        );

        Ok(Self {
            known_skill_ids,
            goal_skill_ids,
            candidate_units,
            dropped_unit_ids,
        })
    }

    pub fn into_request(self, mode: ResolveMode) -> ResolveRequest {
        ResolveRequest {
            known_skill_ids: self.known_skill_ids,
            goal_skill_ids: self.goal_skill_ids,
            candidate_units: self.candidate_units,
            mode,
        }
    }
}
