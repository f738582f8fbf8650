//! Skill repository persistence

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::entity::{RepositoryFilter, SkillRepository};
use crate::error::{Error, Result};
use crate::storage::parse_uuid;

/// Database row for a skill repository
#[derive(sqlx::FromRow)]
struct RepositoryRow {
    id: String,
    owner_id: String,
    name: String,
    version: Option<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RepositoryRow {
    fn into_repository(self) -> Result<SkillRepository> {
        Ok(SkillRepository {
            id: parse_uuid(&self.id)?,
            owner_id: self.owner_id,
            name: self.name,
            version: self.version,
            description: self.description,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_REPOSITORY: &str =
    "SELECT id, owner_id, name, version, description, created_at, updated_at FROM skill_repositories";

pub(crate) async fn fetch(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<SkillRepository>> {
    let row: Option<RepositoryRow> = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_REPOSITORY))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;
    row.map(RepositoryRow::into_repository).transpose()
}

/// Id of the repository with this identity, other than `except`
pub(crate) async fn find_identity(
    conn: &mut SqliteConnection,
    owner_id: &str,
    name: &str,
    version: Option<&str>,
    except: Option<Uuid>,
) -> Result<Option<Uuid>> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT id FROM skill_repositories
        WHERE owner_id = ? AND name = ? AND COALESCE(version, '') = COALESCE(?, '')
          AND id <> COALESCE(?, '')
        "#,
    )
    .bind(owner_id)
    .bind(name)
    .bind(version)
    .bind(except.map(|id| id.to_string()))
    .fetch_optional(conn)
    .await?;
    row.map(|(id,)| parse_uuid(&id)).transpose()
}

pub(crate) async fn insert(conn: &mut SqliteConnection, repository: &SkillRepository) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO skill_repositories (id, owner_id, name, version, description, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(repository.id.to_string())
    .bind(&repository.owner_id)
    .bind(&repository.name)
    .bind(&repository.version)
    .bind(&repository.description)
    .bind(repository.created_at)
    .bind(repository.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn update(conn: &mut SqliteConnection, repository: &SkillRepository) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE skill_repositories SET name = ?, version = ?, description = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&repository.name)
    .bind(&repository.version)
    .bind(&repository.description)
    .bind(repository.updated_at)
    .bind(repository.id.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn delete(conn: &mut SqliteConnection, id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM skill_repositories WHERE id = ?")
        .bind(id.to_string())
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::RepositoryNotFound(id));
    }
    Ok(())
}

/// Skill ids owned by a repository
pub(crate) async fn skill_ids(conn: &mut SqliteConnection, id: Uuid) -> Result<Vec<Uuid>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM skills WHERE repository_id = ? ORDER BY id")
        .bind(id.to_string())
        .fetch_all(conn)
        .await?;
    rows.iter().map(|(id,)| parse_uuid(id)).collect()
}

/// List repositories matching a filter, ordered by name then version
pub(crate) async fn list(
    conn: &mut SqliteConnection,
    filter: &RepositoryFilter,
    bounds: Option<(u32, u32)>,
) -> Result<Vec<SkillRepository>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(SELECT_REPOSITORY);
    query.push(" WHERE 1 = 1");

    if let Some(owner_id) = &filter.owner_id {
        query.push(" AND owner_id = ").push_bind(owner_id.clone());
    }
    if let Some(name) = &filter.name {
        query.push(" AND name = ").push_bind(name.clone());
    }
    if let Some(version) = &filter.version {
        query.push(" AND version = ").push_bind(version.clone());
    }

    query.push(" ORDER BY name, COALESCE(version, ''), id");

    if let Some((limit, offset)) = bounds {
        query
            .push(" LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);
    }

    let rows: Vec<RepositoryRow> = query.build_query_as().fetch_all(conn).await?;
    rows.into_iter().map(RepositoryRow::into_repository).collect()
}
