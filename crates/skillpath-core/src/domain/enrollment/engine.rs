//! Path enrollment engine
//!
//! Enrollment resolves a unit sequence without holding any lock or
//! transaction, then writes the path and all of its unit instances in a
//! single transaction. Dropping the future before the commit rolls the
//! transaction back, so a cancelled enrollment leaves nothing behind.

use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::entity::{
    ConsumptionUpdate, EnrollmentRequest, PathOrigin, PathPreview, PersonalizedPath,
    UnitInstance, UnitStatus,
};
use super::repository as rows;
use crate::domain::history::ProgressTracker;
use crate::domain::history::repository as history_rows;
use crate::domain::history::tracker::validate_learner_id;
use crate::domain::locking::{AggregateKind, LockManager};
use crate::domain::resolver::{ResolutionSnapshot, ResolverGateway};
use crate::domain::units::{UnitCatalog, UnitFilter};
use crate::error::{Error, Result};
use crate::storage::begin_write;

#[derive(Clone)]
pub struct EnrollmentEngine {
    pool: SqlitePool,
    locks: Arc<LockManager>,
    catalog: Arc<dyn UnitCatalog>,
    gateway: ResolverGateway,
    tracker: ProgressTracker,
}

impl EnrollmentEngine {
    pub fn new(
        pool: SqlitePool,
        locks: Arc<LockManager>,
        catalog: Arc<dyn UnitCatalog>,
        gateway: ResolverGateway,
        tracker: ProgressTracker,
    ) -> Self {
        Self {
            pool,
            locks,
            catalog,
            gateway,
            tracker,
        }
    }

    /// Enroll a learner into a new personalized path
    ///
    /// The learner's history is created on first enrollment. Every unit
    /// instance starts OPEN. A sequence with no units is refused.
    pub async fn enroll(&self, request: EnrollmentRequest) -> Result<PersonalizedPath> {
        let learner_id = validate_learner_id(&request.learner_id)?.to_string();
        let unit_ids = self.resolve_sequence(&learner_id, &request).await?;

        let now = Utc::now();
        let path_id = Uuid::new_v4();
        let units: Vec<UnitInstance> = unit_ids
            .iter()
            .enumerate()
            .map(|(position, unit_id)| UnitInstance {
                id: Uuid::new_v4(),
                path_id,
                position: position as u32,
                unit_id: *unit_id,
                status: UnitStatus::Open,
                actual_processing_time_minutes: None,
                test_performance: None,
                consumed_at: None,
                updated_at: now,
            })
            .collect();

        let path = PersonalizedPath {
            id: path_id,
            learner_id,
            origin: request.origin,
            mode: request.mode,
            units,
            created_at: now,
            updated_at: now,
        };

        let mut tx = begin_write(&self.pool).await?;
        if history_rows::ensure_history(&mut *tx, &path.learner_id, now).await? {
            info!(learner_id = %path.learner_id, "Learning history created");
        }
        rows::insert_path(&mut *tx, &path).await?;
        tx.commit().await?;

        info!(
            path_id = %path.id,
            learner_id = %path.learner_id,
            origin = %path.origin,
            mode = %path.mode,
            units = path.units.len(),
            "Learner enrolled"
        );
        Ok(path)
    }

    /// Resolve the sequence an enrollment would produce, without writing
    pub async fn preview(&self, request: EnrollmentRequest) -> Result<PathPreview> {
        let learner_id = validate_learner_id(&request.learner_id)?.to_string();
        let unit_ids = self.resolve_sequence(&learner_id, &request).await?;

        Ok(PathPreview {
            origin: request.origin,
            mode: request.mode,
            unit_ids,
        })
    }

    /// Record consumption of a unit on a path
    ///
    /// Targets the first instance of the unit that is not finished yet, or
    /// the last one when all are. A partial record moves an OPEN instance to
    /// IN_PROGRESS; `finished` moves it to FINISHED, which never regresses.
    /// Finishing adds the unit's teaching goals to the learner's learned
    /// skills.
    pub async fn record_consumption(
        &self,
        path_id: Uuid,
        unit_id: Uuid,
        update: ConsumptionUpdate,
    ) -> Result<PersonalizedPath> {
        update.validate()?;

        let _guard = self
            .locks
            .acquire(AggregateKind::Path, path_id.to_string(), "enrollment:record-consumption")
            .await?;

        let path = self.get_path(path_id).await?;
        let mut instance = path
            .units
            .iter()
            .find(|u| u.unit_id == unit_id && u.status != UnitStatus::Finished)
            .or_else(|| path.units.iter().rev().find(|u| u.unit_id == unit_id))
            .cloned()
            .ok_or(Error::UnitNotFound(unit_id))?;

        let previous = instance.status;
        instance.status = match (previous, update.finished) {
            (UnitStatus::Finished, _) | (_, true) => UnitStatus::Finished,
            _ => UnitStatus::InProgress,
        };
        if let Some(minutes) = update.actual_processing_time_minutes {
            instance.actual_processing_time_minutes = Some(minutes);
        }
        if let Some(score) = update.test_performance {
            instance.test_performance = Some(score);
        }
        let now = Utc::now();
        instance.consumed_at = Some(now);
        instance.updated_at = now;

        // Teaching goals come from the catalog before the transaction opens
        let teaching_goals = if instance.status == UnitStatus::Finished {
            match self.catalog.unit(unit_id).await? {
                Some(unit) => unit.teaching_goal_ids,
                None => {
                    warn!(unit_id = %unit_id, "Finished unit is no longer in the catalog");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut tx = begin_write(&self.pool).await?;
        rows::update_instance(&mut *tx, &instance).await?;
        rows::touch_path(&mut *tx, path_id, now).await?;
        let learned = if teaching_goals.is_empty() {
            Vec::new()
        } else {
            history_rows::ensure_history(&mut *tx, &path.learner_id, now).await?;
            history_rows::insert_learned_skills(&mut *tx, &path.learner_id, &teaching_goals, now).await?
        };
        tx.commit().await?;

        info!(
            path_id = %path_id,
            unit_id = %unit_id,
            position = instance.position,
            from = %previous,
            to = %instance.status,
            learned = learned.len(),
            "Unit consumption recorded"
        );

        self.get_path(path_id).await
    }

    pub async fn get_path(&self, path_id: Uuid) -> Result<PersonalizedPath> {
        let mut conn = self.pool.acquire().await?;
        rows::fetch_path(&mut conn, path_id)
            .await?
            .ok_or(Error::PathNotFound(path_id))
    }

    /// Unit sequence for a request: copied from the template or resolved
    async fn resolve_sequence(&self, learner_id: &str, request: &EnrollmentRequest) -> Result<Vec<Uuid>> {
        let unit_ids = match &request.origin {
            PathOrigin::Template(template_id) => {
                self.catalog
                    .template_path(*template_id)
                    .await?
                    .ok_or(Error::TemplatePathNotFound(*template_id))?
                    .unit_ids
            }
            PathOrigin::Goals(goals) => {
                let known = self.tracker.known_skills(learner_id).await?;
                let snapshot = ResolutionSnapshot::capture(
                    &self.pool,
                    self.catalog.as_ref(),
                    known,
                    goals.clone(),
                    &UnitFilter::all(),
                )
                .await?;
                self.gateway
                    .resolve(snapshot.into_request(request.mode), request.timeout)
                    .await?
            }
        };

        if unit_ids.is_empty() {
            return Err(Error::InvalidRequest(
                "the resulting path has no units; the goals may already be learned".to_string(),
            ));
        }
        Ok(unit_ids)
    }
}
