//! Learning history persistence

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::entity::{LearnedSkill, PathSummary};
use crate::domain::enrollment::PathStatus;
use crate::domain::enrollment::repository::{decode_mode, decode_origin};
use crate::error::Result;
use crate::storage::parse_uuid;

/// Create the learner's history if missing; returns whether it was created
pub(crate) async fn ensure_history(conn: &mut SqliteConnection, learner_id: &str, now: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query("INSERT OR IGNORE INTO learning_histories (learner_id, created_at) VALUES (?, ?)")
        .bind(learner_id)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn history_created_at(conn: &mut SqliteConnection, learner_id: &str) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> =
        sqlx::query_as("SELECT created_at FROM learning_histories WHERE learner_id = ?")
            .bind(learner_id)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(created_at,)| created_at))
}

pub(crate) async fn learned_skills(conn: &mut SqliteConnection, learner_id: &str) -> Result<Vec<LearnedSkill>> {
    let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(
        "SELECT skill_id, learned_at FROM learned_skills WHERE learner_id = ? ORDER BY learned_at, skill_id",
    )
    .bind(learner_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|(skill_id, learned_at)| {
            Ok(LearnedSkill {
                skill_id: parse_uuid(&skill_id)?,
                learned_at,
            })
        })
        .collect()
}

/// Record learned skills, ignoring ones already present
///
/// Returns the skills that were newly recorded.
pub(crate) async fn insert_learned_skills(
    conn: &mut SqliteConnection,
    learner_id: &str,
    skill_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>> {
    let mut added = Vec::new();
    for skill_id in skill_ids {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO learned_skills (learner_id, skill_id, learned_at) VALUES (?, ?, ?)",
        )
        .bind(learner_id)
        .bind(skill_id.to_string())
        .bind(now)
        .execute(&mut *conn)
        .await?;
        if result.rows_affected() == 1 {
            added.push(*skill_id);
        }
    }
    Ok(added)
}

pub(crate) async fn delete_learned_skill(conn: &mut SqliteConnection, learner_id: &str, skill_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM learned_skills WHERE learner_id = ? AND skill_id = ?")
        .bind(learner_id)
        .bind(skill_id.to_string())
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Database row for a path summary with aggregated instance counts
#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    origin_path_id: Option<String>,
    goal_skill_ids: Option<String>,
    mode: String,
    updated_at: DateTime<Utc>,
    unit_count: i64,
    open_units: i64,
    finished_units: i64,
}

/// Path summaries of a learner, most recently updated first
pub(crate) async fn path_summaries(conn: &mut SqliteConnection, learner_id: &str) -> Result<Vec<PathSummary>> {
    let rows: Vec<SummaryRow> = sqlx::query_as(
        r#"
        SELECT p.id, p.origin_path_id, p.goal_skill_ids, p.mode, p.updated_at,
               COUNT(u.id) AS unit_count,
               COALESCE(SUM(CASE WHEN u.status = 'open' THEN 1 ELSE 0 END), 0) AS open_units,
               COALESCE(SUM(CASE WHEN u.status = 'finished' THEN 1 ELSE 0 END), 0) AS finished_units
        FROM personalized_paths p
        LEFT JOIN unit_instances u ON u.path_id = p.id
        WHERE p.learner_id = ?
        GROUP BY p.id
        ORDER BY p.updated_at DESC, p.created_at DESC, p.id
        "#,
    )
    .bind(learner_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let total = row.unit_count.max(0) as usize;
            let open = row.open_units.max(0) as usize;
            let finished = row.finished_units.max(0) as usize;
            Ok(PathSummary {
                id: parse_uuid(&row.id)?,
                origin: decode_origin(row.origin_path_id.as_deref(), row.goal_skill_ids.as_deref())?,
                mode: decode_mode(&row.mode)?,
                status: PathStatus::from_counts(total, open, finished),
                unit_count: total,
                finished_units: finished,
                updated_at: row.updated_at,
            })
        })
        .collect()
}
