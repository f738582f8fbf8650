//! Progress tracker
//!
//! Owns each learner's learning history: the learned skills and the paths
//! the learner is enrolled in. Histories are created implicitly.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entity::{LearningHistory, PathSummary};
use super::repository as rows;
use crate::domain::graph::ReferenceProblem;
use crate::domain::graph::repository as skill_rows;
use crate::domain::locking::{AggregateKind, LockManager};
use crate::error::{Error, Result};
use crate::storage::begin_write;

#[derive(Clone)]
pub struct ProgressTracker {
    pool: SqlitePool,
    locks: Arc<LockManager>,
}

impl ProgressTracker {
    pub fn new(pool: SqlitePool, locks: Arc<LockManager>) -> Self {
        Self { pool, locks }
    }

    /// Return the learner's history, creating an empty one if needed
    pub async fn get_or_create(&self, learner_id: &str) -> Result<LearningHistory> {
        let learner_id = validate_learner_id(learner_id)?;

        let mut conn = self.pool.acquire().await?;
        if rows::ensure_history(&mut conn, learner_id, Utc::now()).await? {
            info!(learner_id = %learner_id, "Learning history created");
        }
        drop(conn);

        self.history(learner_id).await
    }

    /// The learner's history
    pub async fn history(&self, learner_id: &str) -> Result<LearningHistory> {
        let learner_id = validate_learner_id(learner_id)?;
        let mut conn = self.pool.acquire().await?;
        let created_at = rows::history_created_at(&mut conn, learner_id)
            .await?
            .ok_or_else(|| Error::LearnerNotFound(learner_id.to_string()))?;

        Ok(LearningHistory {
            learner_id: learner_id.to_string(),
            created_at,
            learned_skills: rows::learned_skills(&mut conn, learner_id).await?,
            paths: rows::path_summaries(&mut conn, learner_id).await?,
        })
    }

    /// Skills the learner has learned; empty for unknown learners
    pub async fn known_skills(&self, learner_id: &str) -> Result<BTreeSet<Uuid>> {
        let learner_id = validate_learner_id(learner_id)?;
        let mut conn = self.pool.acquire().await?;
        let learned = rows::learned_skills(&mut conn, learner_id).await?;
        debug!(learner_id = %learner_id, known = learned.len(), "Loaded known skills");
        Ok(learned.into_iter().map(|s| s.skill_id).collect())
    }

    /// The learner's paths, most recently updated first; empty for unknown learners
    pub async fn list_paths(&self, learner_id: &str) -> Result<Vec<PathSummary>> {
        let learner_id = validate_learner_id(learner_id)?;
        let mut conn = self.pool.acquire().await?;
        rows::path_summaries(&mut conn, learner_id).await
    }

    /// Grant skills to a learner directly
    ///
    /// Every skill must exist. Returns the skills that were not yet learned.
    pub async fn add_learning_progress(&self, learner_id: &str, skill_ids: &[Uuid]) -> Result<Vec<Uuid>> {
        let learner_id = validate_learner_id(learner_id)?;
        if skill_ids.is_empty() {
            return Err(Error::InvalidRequest("no skills given".to_string()));
        }

        let _guard = self
            .locks
            .acquire(AggregateKind::Learner, learner_id, "progress-tracker:add")
            .await?;

        let mut tx = begin_write(&self.pool).await?;

        let existing = skill_rows::existing_skills(&mut *tx, skill_ids).await?;
        let mut missing: Vec<Uuid> = skill_ids
            .iter()
            .filter(|id| !existing.contains_key(*id))
            .copied()
            .collect();
        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(Error::InvalidReference {
                skill_ids: missing,
                problem: ReferenceProblem::Missing,
            });
        }

        let now = Utc::now();
        rows::ensure_history(&mut *tx, learner_id, now).await?;
        let added = rows::insert_learned_skills(&mut *tx, learner_id, skill_ids, now).await?;
        tx.commit().await?;

        info!(learner_id = %learner_id, added = added.len(), "Learning progress recorded");
        Ok(added)
    }

    /// Remove one learned skill
    ///
    /// Paths already enrolled in are left untouched.
    pub async fn delete_learning_progress(&self, learner_id: &str, skill_id: Uuid) -> Result<()> {
        let learner_id = validate_learner_id(learner_id)?;
        let _guard = self
            .locks
            .acquire(AggregateKind::Learner, learner_id, "progress-tracker:delete")
            .await?;

        let mut tx = begin_write(&self.pool).await?;
        if rows::history_created_at(&mut *tx, learner_id).await?.is_none() {
            return Err(Error::LearnerNotFound(learner_id.to_string()));
        }
        if !rows::delete_learned_skill(&mut *tx, learner_id, skill_id).await? {
            warn!(learner_id = %learner_id, skill_id = %skill_id, "Learned skill not found");
            return Err(Error::LearnedSkillNotFound {
                learner_id: learner_id.to_string(),
                skill_id,
            });
        }
        tx.commit().await?;

        info!(learner_id = %learner_id, skill_id = %skill_id, "Learned skill removed");
        Ok(())
    }
}

pub(crate) fn validate_learner_id(learner_id: &str) -> Result<&str> {
    let trimmed = learner_id.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest("learner id must not be empty".to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn tracker() -> (Database, ProgressTracker) {
        let db = Database::in_memory().await.unwrap();
        let tracker = ProgressTracker::new(db.pool().clone(), Arc::new(LockManager::with_defaults()));
        (db, tracker)
    }

    async fn seed_skill(db: &Database) -> Uuid {
        let repo = Uuid::new_v4();
        let skill = Uuid::new_v4();
        sqlx::query("INSERT INTO skill_repositories (id, owner_id, name) VALUES (?, 'owner', ?)")
            .bind(repo.to_string())
            .bind(repo.to_string())
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO skills (id, repository_id, name) VALUES (?, ?, 'skill')")
            .bind(skill.to_string())
            .bind(repo.to_string())
            .execute(db.pool())
            .await
            .unwrap();
        skill
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (_db, tracker) = tracker().await;

        let first = tracker.get_or_create("alice").await.unwrap();
        let second = tracker.get_or_create("alice").await.unwrap();

        assert_eq!(first.learner_id, "alice");
        assert_eq!(first.created_at, second.created_at);
        assert!(first.learned_skills.is_empty());
        assert!(first.paths.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_learner() {
        let (_db, tracker) = tracker().await;

        assert!(tracker.known_skills("nobody").await.unwrap().is_empty());
        assert!(tracker.list_paths("nobody").await.unwrap().is_empty());
        assert!(matches!(
            tracker.history("nobody").await,
            Err(Error::LearnerNotFound(_))
        ));
        assert!(matches!(
            tracker.delete_learning_progress("nobody", Uuid::new_v4()).await,
            Err(Error::LearnerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_add_and_delete_learning_progress() {
        let (db, tracker) = tracker().await;
        let skill = seed_skill(&db).await;

        let added = tracker.add_learning_progress("bob", &[skill]).await.unwrap();
        assert_eq!(added, vec![skill]);

        // Granting again is a no-op
        let added = tracker.add_learning_progress("bob", &[skill]).await.unwrap();
        assert!(added.is_empty());
        assert_eq!(tracker.known_skills("bob").await.unwrap(), BTreeSet::from([skill]));

        tracker.delete_learning_progress("bob", skill).await.unwrap();
        assert!(tracker.known_skills("bob").await.unwrap().is_empty());

        let err = tracker.delete_learning_progress("bob", skill).await.unwrap_err();
        assert!(matches!(err, Error::LearnedSkillNotFound { .. }));
    }

    #[tokio::test]
    async fn test_add_unknown_skill_rejected() {
        let (_db, tracker) = tracker().await;
        let err = tracker
            .add_learning_progress("carol", &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidReference {
                problem: ReferenceProblem::Missing,
                ..
            }
        ));
        // Nothing was created for the learner
        assert!(matches!(
            tracker.history("carol").await,
            Err(Error::LearnerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_learner_id_is_trimmed_everywhere() {
        let (db, tracker) = tracker().await;
        let skill = seed_skill(&db).await;

        tracker.add_learning_progress(" bob ", &[skill]).await.unwrap();
        assert_eq!(tracker.history(" bob").await.unwrap().learner_id, "bob");
        assert_eq!(tracker.known_skills("bob ").await.unwrap(), BTreeSet::from([skill]));
        assert!(tracker.list_paths(" bob ").await.unwrap().is_empty());

        tracker.delete_learning_progress(" bob ", skill).await.unwrap();
        assert!(tracker.known_skills("bob").await.unwrap().is_empty());

        assert!(matches!(
            tracker.list_paths("   ").await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_validate_learner_id() {
        assert!(validate_learner_id("  ").is_err());
        assert_eq!(validate_learner_id(" dave ").unwrap(), "dave");
    }
}
