//! Skill repository manager
//!
//! Repository CRUD plus the deletion rule: a repository is only removed when
//! none of its skills is referenced by a learning unit or nested under a
//! skill that would survive the deletion.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entity::{
    NewRepository, Pagination, RepositoryDetail, RepositoryFilter, RepositoryUpdate,
    SkillRepository,
};
use super::repository as rows;
use crate::domain::graph::DeletionBlocker;
use crate::domain::graph::repository as skill_rows;
use crate::domain::locking::{AggregateKind, LockManager};
use crate::domain::units::UnitCatalog;
use crate::error::{Error, Result};
use crate::storage::begin_write;

#[derive(Clone)]
pub struct RepositoryManager {
    pool: SqlitePool,
    locks: Arc<LockManager>,
    catalog: Arc<dyn UnitCatalog>,
    default_page_size: u32,
}

impl RepositoryManager {
    pub fn new(
        pool: SqlitePool,
        locks: Arc<LockManager>,
        catalog: Arc<dyn UnitCatalog>,
        default_page_size: u32,
    ) -> Self {
        Self {
            pool,
            locks,
            catalog,
            default_page_size,
        }
    }

    pub async fn create_repository(&self, new: NewRepository) -> Result<SkillRepository> {
        let owner_id = non_empty("owner id", &new.owner_id)?;
        let name = non_empty("repository name", &new.name)?;
        let version = normalize(new.version);

        let mut tx = begin_write(&self.pool).await?;

        if rows::find_identity(&mut *tx, &owner_id, &name, version.as_deref(), None)
            .await?
            .is_some()
        {
            return Err(conflict(owner_id, name, version));
        }

        let now = Utc::now();
        let repository = SkillRepository {
            id: Uuid::new_v4(),
            owner_id,
            name,
            version,
            description: new.description,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = rows::insert(&mut *tx, &repository).await {
            // A concurrent create won the unique index
            return Err(map_unique_violation(err, &repository));
        }
        tx.commit().await?;

        info!(
            repository_id = %repository.id,
            owner_id = %repository.owner_id,
            name = %repository.name,
            "Skill repository created"
        );
        Ok(repository)
    }

    pub async fn update_repository(&self, id: Uuid, update: RepositoryUpdate) -> Result<SkillRepository> {
        let _guard = self
            .locks
            .acquire(AggregateKind::Repository, id.to_string(), "repository-manager:update")
            .await?;

        let mut tx = begin_write(&self.pool).await?;
        let mut repository = rows::fetch(&mut *tx, id)
            .await?
            .ok_or(Error::RepositoryNotFound(id))?;

        if let Some(name) = update.name {
            repository.name = non_empty("repository name", &name)?;
        }
        repository.version = normalize(update.version.apply(repository.version));
        repository.description = update.description.apply(repository.description);

        if rows::find_identity(
            &mut *tx,
            &repository.owner_id,
            &repository.name,
            repository.version.as_deref(),
            Some(id),
        )
        .await?
        .is_some()
        {
            return Err(conflict(
                repository.owner_id,
                repository.name,
                repository.version,
            ));
        }

        repository.updated_at = Utc::now();
        if let Err(err) = rows::update(&mut *tx, &repository).await {
            return Err(map_unique_violation(err, &repository));
        }
        tx.commit().await?;

        info!(repository_id = %id, "Skill repository updated");
        Ok(repository)
    }

    /// A repository with all of its skills
    pub async fn get_repository(&self, id: Uuid) -> Result<RepositoryDetail> {
        let mut conn = self.pool.acquire().await?;
        let repository = rows::fetch(&mut conn, id)
            .await?
            .ok_or(Error::RepositoryNotFound(id))?;
        let skills = skill_rows::fetch_skills(&mut conn, id).await?;

        Ok(RepositoryDetail { repository, skills })
    }

    /// Delete a repository and all its skills, or nothing at all
    pub async fn delete_repository(&self, id: Uuid) -> Result<()> {
        let _guard = self
            .locks
            .acquire(AggregateKind::Repository, id.to_string(), "repository-manager:delete")
            .await?;

        let skill_ids = {
            let mut conn = self.pool.acquire().await?;
            if rows::fetch(&mut conn, id).await?.is_none() {
                return Err(Error::RepositoryNotFound(id));
            }
            rows::skill_ids(&mut conn, id).await?
        };

        // Catalog lookups happen before the transaction opens
        let references = self.catalog.units_referencing(&skill_ids).await?;

        let mut tx = begin_write(&self.pool).await?;
        let mut outside = skill_rows::outside_parents(&mut *tx, &skill_ids).await?;

        let mut units_by_skill: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        for reference in references {
            units_by_skill
                .entry(reference.skill_id)
                .or_default()
                .insert(reference.unit_id);
        }

        let blockers: Vec<DeletionBlocker> = skill_ids
            .iter()
            .map(|skill_id| DeletionBlocker {
                skill_id: *skill_id,
                unit_ids: units_by_skill
                    .remove(skill_id)
                    .map(|units| units.into_iter().collect())
                    .unwrap_or_default(),
                foreign_parent_ids: outside.remove(skill_id).unwrap_or_default(),
            })
            .filter(DeletionBlocker::is_blocking)
            .collect();

        if !blockers.is_empty() {
            warn!(
                repository_id = %id,
                blocked_skills = blockers.len(),
                "Repository deletion refused: skills still referenced"
            );
            return Err(Error::ReferencedEntity(blockers));
        }

        let removed = skill_rows::delete_repository_skills(&mut *tx, id).await?;
        rows::delete(&mut *tx, id).await?;
        tx.commit().await?;

        info!(repository_id = %id, skills_removed = removed, "Skill repository deleted");
        Ok(())
    }

    /// List repositories
    ///
    /// Without a filter the listing is always paginated (page 0 and the
    /// configured default size unless given). With a filter, pagination
    /// applies only when a page or page size is supplied.
    pub async fn list_repositories(
        &self,
        filter: &RepositoryFilter,
        pagination: Pagination,
    ) -> Result<Vec<SkillRepository>> {
        let bounds = pagination.bounds(!filter.is_empty(), self.default_page_size);
        debug!(?filter, ?bounds, "Listing skill repositories");

        let mut conn = self.pool.acquire().await?;
        rows::list(&mut conn, filter, bounds).await
    }
}

fn non_empty(what: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest(format!("{} must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

/// Blank versions are stored as absent
fn normalize(version: Option<String>) -> Option<String> {
    version
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn conflict(owner_id: String, name: String, version: Option<String>) -> Error {
    warn!(owner_id = %owner_id, name = %name, "Skill repository identity already taken");
    Error::RepositoryConflict {
        owner_id,
        name,
        version,
    }
}

fn map_unique_violation(err: Error, repository: &SkillRepository) -> Error {
    match &err {
        Error::DatabaseError(sqlx::Error::Database(db)) if db.is_unique_violation() => conflict(
            repository.owner_id.clone(),
            repository.name.clone(),
            repository.version.clone(),
        ),
        _ => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_version() {
        assert_eq!(normalize(Some("  ".into())), None);
        assert_eq!(normalize(Some(" 1.0 ".into())), Some("1.0".into()));
        assert_eq!(normalize(None), None);
    }

    #[test]
    fn test_non_empty() {
        assert!(non_empty("name", "   ").is_err());
        assert_eq!(non_empty("name", " Rust ").unwrap(), "Rust");
    }
}
