//! Skill graph store
//!
//! Every mutation runs as: lock the owning repository, open a transaction,
//! load the repository's nesting snapshot through that transaction, validate
//! against the snapshot, write, commit. A failed validation drops the
//! transaction so nothing is persisted.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::entity::{DeletionBlocker, NestingUpdate, NewSkill, ReferenceProblem, Skill, SkillUpdate};
use super::repository as rows;
use crate::domain::locking::{AggregateKind, LockGuard, LockManager, MultiLockGuard, lock_key};
use crate::domain::patch::Patch;
use crate::domain::units::UnitCatalog;
use crate::error::{Error, Result};
use crate::storage::begin_write;

/// How often to re-lock when a skill moves between read and lock
const MAX_RELOCK_ATTEMPTS: usize = 3;

/// Mutations and queries on skills and their nesting
#[derive(Clone)]
pub struct SkillGraphStore {
    pool: SqlitePool,
    locks: Arc<LockManager>,
    catalog: Arc<dyn UnitCatalog>,
}

impl SkillGraphStore {
    pub fn new(pool: SqlitePool, locks: Arc<LockManager>, catalog: Arc<dyn UnitCatalog>) -> Self {
        Self {
            pool,
            locks,
            catalog,
        }
    }

    /// Create a skill, optionally nesting existing skills under it and
    /// nesting it under existing parents
    pub async fn add_skill(&self, new: NewSkill) -> Result<Skill> {
        if new.name.trim().is_empty() {
            return Err(Error::InvalidRequest("skill name must not be empty".to_string()));
        }

        let repository_id = new.repository_id;
        let _guard = self
            .locks
            .acquire(
                AggregateKind::Repository,
                repository_id.to_string(),
                "graph-store:add-skill",
            )
            .await?;

        let mut tx = begin_write(&self.pool).await?;

        if !rows::repository_exists(&mut *tx, repository_id).await? {
            return Err(Error::RepositoryNotFound(repository_id));
        }

        let nested = dedup(&new.nested_skill_ids);
        let parents = dedup(&new.parent_skill_ids);
        let referenced: Vec<Uuid> = nested.iter().chain(parents.iter()).copied().collect();
        rows::ensure_in_repository(&mut *tx, repository_id, &referenced).await?;

        let mut graph = rows::load_graph(&mut *tx, repository_id).await?;

        let now = Utc::now();
        let mut skill = Skill {
            id: Uuid::new_v4(),
            repository_id,
            name: new.name.trim().to_string(),
            description: new.description,
            level: new.level,
            nested_skill_ids: Vec::new(),
            parent_skill_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        graph.insert_skill(skill.id, repository_id);
        for child in &nested {
            graph.add_edge(skill.id, *child)?;
        }
        for parent in &parents {
            graph.add_edge(*parent, skill.id)?;
        }

        rows::insert_skill(&mut *tx, &skill).await?;
        for child in &nested {
            rows::insert_edge(&mut *tx, skill.id, *child).await?;
        }
        for parent in &parents {
            rows::insert_edge(&mut *tx, *parent, skill.id).await?;
        }
        rows::touch_skills(&mut *tx, &parents, now).await?;

        tx.commit().await?;

        skill.nested_skill_ids = graph.children(&skill.id).to_vec();
        skill.parent_skill_ids = graph.parents(&skill.id);

        info!(
            skill_id = %skill.id,
            repository_id = %repository_id,
            nested = skill.nested_skill_ids.len(),
            parents = skill.parent_skill_ids.len(),
            "Skill created"
        );
        Ok(skill)
    }

    /// Replace a skill's nested skills and/or parents
    ///
    /// A `Set` replaces the relation entirely; the old edges are removed
    /// before the new ones are validated.
    pub async fn update_nesting(&self, skill_id: Uuid, update: NestingUpdate) -> Result<Skill> {
        let (repository_id, _guard) = self
            .lock_skill_repository(skill_id, "graph-store:update-nesting")
            .await?;

        let mut tx = begin_write(&self.pool).await?;

        let nested = patch_ids(&update.nested);
        let parents = patch_ids(&update.parents);
        let referenced: Vec<Uuid> = nested.iter().chain(parents.iter()).copied().collect();
        rows::ensure_in_repository(&mut *tx, repository_id, &referenced).await?;

        let mut graph = rows::load_graph(&mut *tx, repository_id).await?;

        let old_parents = if update.parents.is_keep() {
            Vec::new()
        } else {
            graph.clear_parents(&skill_id)
        };
        if !update.nested.is_keep() {
            graph.clear_children(&skill_id);
        }
        for child in &nested {
            graph.add_edge(skill_id, *child)?;
        }
        for parent in &parents {
            graph.add_edge(*parent, skill_id)?;
        }

        if !update.nested.is_keep() {
            rows::delete_child_edges(&mut *tx, skill_id).await?;
            for child in &nested {
                rows::insert_edge(&mut *tx, skill_id, *child).await?;
            }
        }
        if !update.parents.is_keep() {
            rows::delete_parent_edges(&mut *tx, skill_id).await?;
            for parent in &parents {
                rows::insert_edge(&mut *tx, *parent, skill_id).await?;
            }
        }

        let now = Utc::now();
        let mut touched = vec![skill_id];
        touched.extend(old_parents.iter().chain(parents.iter()).copied());
        rows::touch_skills(&mut *tx, &dedup(&touched), now).await?;

        let skill = rows::fetch_skill(&mut *tx, skill_id)
            .await?
            .ok_or(Error::SkillNotFound(skill_id))?;
        tx.commit().await?;

        info!(
            skill_id = %skill_id,
            repository_id = %repository_id,
            nested = skill.nested_skill_ids.len(),
            parents = skill.parent_skill_ids.len(),
            "Skill nesting updated"
        );
        Ok(skill)
    }

    /// Change a skill's name, description or level
    pub async fn update_skill(&self, skill_id: Uuid, update: SkillUpdate) -> Result<Skill> {
        if let Some(name) = &update.name {
            if name.trim().is_empty() {
                return Err(Error::InvalidRequest("skill name must not be empty".to_string()));
            }
        }

        let (repository_id, _guard) = self
            .lock_skill_repository(skill_id, "graph-store:update-skill")
            .await?;

        let mut tx = begin_write(&self.pool).await?;
        let mut skill = rows::fetch_skill(&mut *tx, skill_id)
            .await?
            .ok_or(Error::SkillNotFound(skill_id))?;

        if let Some(name) = update.name {
            skill.name = name.trim().to_string();
        }
        skill.description = update.description.apply(skill.description);
        if let Some(level) = update.level {
            skill.level = level;
        }
        skill.updated_at = Utc::now();

        rows::update_skill_row(&mut *tx, &skill).await?;
        tx.commit().await?;

        info!(skill_id = %skill_id, repository_id = %repository_id, "Skill updated");
        Ok(skill)
    }

    pub async fn get_skill(&self, skill_id: Uuid) -> Result<Skill> {
        let mut conn = self.pool.acquire().await?;
        rows::fetch_skill(&mut conn, skill_id)
            .await?
            .ok_or(Error::SkillNotFound(skill_id))
    }

    /// All skills of a repository, ordered by name
    pub async fn list_skills(&self, repository_id: Uuid) -> Result<Vec<Skill>> {
        let mut conn = self.pool.acquire().await?;
        if !rows::repository_exists(&mut conn, repository_id).await? {
            return Err(Error::RepositoryNotFound(repository_id));
        }
        rows::fetch_skills(&mut conn, repository_id).await
    }

    /// Move a skill and all its descendants to another repository
    ///
    /// Refused when the skill itself still has parents, or when a descendant
    /// is also nested under a skill that would stay behind: either would
    /// leave a nesting edge across repositories.
    pub async fn move_to_repository(&self, skill_id: Uuid, target_repository_id: Uuid) -> Result<Skill> {
        let (source_repository_id, _guards) = self
            .lock_move(skill_id, target_repository_id)
            .await?;

        if source_repository_id == target_repository_id {
            return self.get_skill(skill_id).await;
        }

        let mut tx = begin_write(&self.pool).await?;

        if !rows::repository_exists(&mut *tx, target_repository_id).await? {
            return Err(Error::RepositoryNotFound(target_repository_id));
        }

        let graph = rows::load_graph(&mut *tx, source_repository_id).await?;
        let mut moved = vec![skill_id];
        moved.extend(graph.descendants(&skill_id));
        let moved_set: HashSet<Uuid> = moved.iter().copied().collect();

        let mut blocked: Vec<Uuid> = moved
            .iter()
            .filter(|id| {
                let parents = graph.parents(id);
                if **id == skill_id {
                    !parents.is_empty()
                } else {
                    parents.iter().any(|p| !moved_set.contains(p))
                }
            })
            .copied()
            .collect();

        if !blocked.is_empty() {
            blocked.sort();
            warn!(
                skill_id = %skill_id,
                blocked = blocked.len(),
                "Skill move refused: nesting would cross repositories"
            );
            return Err(Error::InvalidReference {
                skill_ids: blocked,
                problem: ReferenceProblem::ForeignRepository,
            });
        }

        rows::set_repository(&mut *tx, &moved, target_repository_id, Utc::now()).await?;
        let skill = rows::fetch_skill(&mut *tx, skill_id)
            .await?
            .ok_or(Error::SkillNotFound(skill_id))?;
        tx.commit().await?;

        info!(
            skill_id = %skill_id,
            from = %source_repository_id,
            to = %target_repository_id,
            moved = moved.len(),
            "Skill subtree moved"
        );
        Ok(skill)
    }

    /// Delete a single skill
    ///
    /// Refused while a unit references the skill or another skill nests it.
    /// Skills nested under it survive as roots.
    pub async fn delete_skill(&self, skill_id: Uuid) -> Result<()> {
        let (repository_id, _guard) = self
            .lock_skill_repository(skill_id, "graph-store:delete-skill")
            .await?;

        // Catalog lookups happen before the transaction opens
        let references = self.catalog.units_referencing(&[skill_id]).await?;

        let mut tx = begin_write(&self.pool).await?;
        let graph = rows::load_graph(&mut *tx, repository_id).await?;

        let mut unit_ids: Vec<Uuid> = references.iter().map(|r| r.unit_id).collect();
        unit_ids.sort();
        unit_ids.dedup();
        let blocker = DeletionBlocker {
            skill_id,
            unit_ids,
            foreign_parent_ids: graph.parents(&skill_id),
        };
        if blocker.is_blocking() {
            warn!(skill_id = %skill_id, "Skill deletion refused: still referenced");
            return Err(Error::ReferencedEntity(vec![blocker]));
        }

        rows::delete_child_edges(&mut *tx, skill_id).await?;
        rows::delete_skill_row(&mut *tx, skill_id).await?;
        tx.commit().await?;

        info!(skill_id = %skill_id, repository_id = %repository_id, "Skill deleted");
        Ok(())
    }

    /// Lock the repository currently owning a skill
    ///
    /// The owner is re-read under the lock, since a concurrent move may
    /// have changed it between the read and the acquisition.
    async fn lock_skill_repository(&self, skill_id: Uuid, holder: &str) -> Result<(Uuid, LockGuard)> {
        for _ in 0..MAX_RELOCK_ATTEMPTS {
            let repository_id = self.owner_of(skill_id).await?;
            let guard = self
                .locks
                .acquire(AggregateKind::Repository, repository_id.to_string(), holder)
                .await?;

            if self.owner_of(skill_id).await? == repository_id {
                return Ok((repository_id, guard));
            }
        }

        Err(Error::LockTimeout(lock_key(
            AggregateKind::Repository,
            &skill_id.to_string(),
        )))
    }

    async fn lock_move(&self, skill_id: Uuid, target_repository_id: Uuid) -> Result<(Uuid, MultiLockGuard)> {
        for _ in 0..MAX_RELOCK_ATTEMPTS {
            let source = self.owner_of(skill_id).await?;
            let guards = self
                .locks
                .acquire_multiple(
                    vec![
                        (AggregateKind::Repository, source.to_string()),
                        (AggregateKind::Repository, target_repository_id.to_string()),
                    ],
                    "graph-store:move-skill",
                )
                .await?;

            if self.owner_of(skill_id).await? == source {
                return Ok((source, guards));
            }
        }

        Err(Error::LockTimeout(lock_key(
            AggregateKind::Repository,
            &skill_id.to_string(),
        )))
    }

    async fn owner_of(&self, skill_id: Uuid) -> Result<Uuid> {
        let mut conn = self.pool.acquire().await?;
        rows::skill_repository(&mut conn, skill_id)
            .await?
            .ok_or(Error::SkillNotFound(skill_id))
    }
}

fn patch_ids(patch: &Patch<Vec<Uuid>>) -> Vec<Uuid> {
    match patch {
        Patch::Set(ids) => dedup(ids),
        Patch::Keep | Patch::Clear => Vec::new(),
    }
}

/// Remove duplicates, keeping first occurrence order
fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(**id)).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_keeps_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup(&[b, a, b, a]), vec![b, a]);
    }

    #[test]
    fn test_patch_ids() {
        let a = Uuid::new_v4();
        assert!(patch_ids(&Patch::Keep).is_empty());
        assert!(patch_ids(&Patch::Clear).is_empty());
        assert_eq!(patch_ids(&Patch::Set(vec![a, a])), vec![a]);
    }
}
