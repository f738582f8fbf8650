//! Personalized path persistence

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::entity::{PathOrigin, PersonalizedPath, UnitInstance, UnitStatus};
use crate::domain::resolver::ResolveMode;
use crate::error::{Error, Result};
use crate::storage::{parse_uuid, parse_uuid_list};

/// Database row for a personalized path
#[derive(sqlx::FromRow)]
struct PathRow {
    id: String,
    learner_id: String,
    origin_path_id: Option<String>,
    goal_skill_ids: Option<String>,
    mode: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Decode the two origin columns; exactly one is set
pub(crate) fn decode_origin(origin_path_id: Option<&str>, goal_skill_ids: Option<&str>) -> Result<PathOrigin> {
    match (origin_path_id, goal_skill_ids) {
        (Some(path_id), None) => Ok(PathOrigin::Template(parse_uuid(path_id)?)),
        (None, Some(goals)) => Ok(PathOrigin::Goals(
            parse_uuid_list(goals)?.into_iter().collect(),
        )),
        _ => Err(Error::Other(
            "Stored path has an invalid origin".to_string(),
        )),
    }
}

pub(crate) fn decode_mode(mode: &str) -> Result<ResolveMode> {
    ResolveMode::parse(mode).ok_or_else(|| Error::Other(format!("Invalid stored resolve mode: {}", mode)))
}

fn encode_origin(origin: &PathOrigin) -> Result<(Option<String>, Option<String>)> {
    Ok(match origin {
        PathOrigin::Template(id) => (Some(id.to_string()), None),
        PathOrigin::Goals(goals) => (None, Some(serde_json::to_string(goals)?)),
    })
}

/// Database row for a unit instance
#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: String,
    path_id: String,
    position: i64,
    unit_id: String,
    status: String,
    actual_processing_time: Option<i64>,
    test_performance: Option<f64>,
    consumed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl InstanceRow {
    fn into_instance(self) -> Result<UnitInstance> {
        let status = UnitStatus::parse(&self.status)
            .ok_or_else(|| Error::Other(format!("Invalid unit status: {}", self.status)))?;

        Ok(UnitInstance {
            id: parse_uuid(&self.id)?,
            path_id: parse_uuid(&self.path_id)?,
            position: u32::try_from(self.position)
                .map_err(|_| Error::Other(format!("Invalid unit position: {}", self.position)))?,
            unit_id: parse_uuid(&self.unit_id)?,
            status,
            actual_processing_time_minutes: self
                .actual_processing_time
                .and_then(|minutes| u32::try_from(minutes).ok()),
            test_performance: self.test_performance,
            consumed_at: self.consumed_at,
            updated_at: self.updated_at,
        })
    }
}

/// Insert a path and all its unit instances
pub(crate) async fn insert_path(conn: &mut SqliteConnection, path: &PersonalizedPath) -> Result<()> {
    let (origin_path_id, goal_skill_ids) = encode_origin(&path.origin)?;

    sqlx::query(
        r#"
        INSERT INTO personalized_paths (id, learner_id, origin_path_id, goal_skill_ids, mode, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(path.id.to_string())
    .bind(&path.learner_id)
    .bind(&origin_path_id)
    .bind(&goal_skill_ids)
    .bind(path.mode.as_str())
    .bind(path.created_at)
    .bind(path.updated_at)
    .execute(&mut *conn)
    .await?;

    for instance in &path.units {
        sqlx::query(
            r#"
            INSERT INTO unit_instances (id, path_id, position, unit_id, status, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(instance.id.to_string())
        .bind(instance.path_id.to_string())
        .bind(instance.position as i64)
        .bind(instance.unit_id.to_string())
        .bind(instance.status.as_str())
        .bind(instance.updated_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

pub(crate) async fn fetch_path(conn: &mut SqliteConnection, path_id: Uuid) -> Result<Option<PersonalizedPath>> {
    let id = path_id.to_string();

    let row: Option<PathRow> = sqlx::query_as(
        r#"
        SELECT id, learner_id, origin_path_id, goal_skill_ids, mode, created_at, updated_at
        FROM personalized_paths
        WHERE id = ?
        "#,
    )
    .bind(&id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let instances: Vec<InstanceRow> = sqlx::query_as(
        r#"
        SELECT id, path_id, position, unit_id, status, actual_processing_time,
               test_performance, consumed_at, updated_at
        FROM unit_instances
        WHERE path_id = ?
        ORDER BY position
        "#,
    )
    .bind(&id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(PersonalizedPath {
        id: parse_uuid(&row.id)?,
        learner_id: row.learner_id,
        origin: decode_origin(row.origin_path_id.as_deref(), row.goal_skill_ids.as_deref())?,
        mode: decode_mode(&row.mode)?,
        units: instances
            .into_iter()
            .map(InstanceRow::into_instance)
            .collect::<Result<Vec<_>>>()?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

/// Persist the mutable fields of a unit instance
pub(crate) async fn update_instance(conn: &mut SqliteConnection, instance: &UnitInstance) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE unit_instances
        SET status = ?, actual_processing_time = ?, test_performance = ?, consumed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(instance.status.as_str())
    .bind(instance.actual_processing_time_minutes.map(i64::from))
    .bind(instance.test_performance)
    .bind(instance.consumed_at)
    .bind(instance.updated_at)
    .bind(instance.id.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn touch_path(conn: &mut SqliteConnection, path_id: Uuid, now: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE personalized_paths SET updated_at = ? WHERE id = ?")
        .bind(now)
        .bind(path_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}
