//! Skill and nesting persistence
//!
//! Functions take a plain connection so they can run inside the caller's
//! transaction (`&mut *tx`) as well as on a pooled connection.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use super::arena::SkillGraph;
use super::entity::{ReferenceProblem, Skill};
use crate::error::{Error, Result};
use crate::storage::parse_uuid;

/// Database row for a skill
#[derive(sqlx::FromRow)]
struct SkillRow {
    id: String,
    repository_id: String,
    name: String,
    description: Option<String>,
    level: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SkillRow {
    fn into_skill(self, nested: Vec<Uuid>, parents: Vec<Uuid>) -> Result<Skill> {
        Ok(Skill {
            id: parse_uuid(&self.id)?,
            repository_id: parse_uuid(&self.repository_id)?,
            name: self.name,
            description: self.description,
            level: self.level,
            nested_skill_ids: nested,
            parent_skill_ids: parents,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) async fn repository_exists(conn: &mut SqliteConnection, repository_id: Uuid) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM skill_repositories WHERE id = ?")
        .bind(repository_id.to_string())
        .fetch_optional(conn)
        .await?;
    Ok(row.is_some())
}

/// Repository owning a skill, if the skill exists
pub(crate) async fn skill_repository(conn: &mut SqliteConnection, skill_id: Uuid) -> Result<Option<Uuid>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT repository_id FROM skills WHERE id = ?")
        .bind(skill_id.to_string())
        .fetch_optional(conn)
        .await?;
    row.map(|(id,)| parse_uuid(&id)).transpose()
}

/// Subset of `ids` that exist as skills, with their repositories
pub(crate) async fn existing_skills(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Uuid>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, repository_id FROM skills WHERE id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    let rows: Vec<(String, String)> = query.build_query_as().fetch_all(conn).await?;
    rows.into_iter()
        .map(|(id, repo)| Ok((parse_uuid(&id)?, parse_uuid(&repo)?)))
        .collect()
}

/// Check that every id is a skill of `repository_id`
///
/// Missing ids are reported before ids of other repositories.
pub(crate) async fn ensure_in_repository(
    conn: &mut SqliteConnection,
    repository_id: Uuid,
    ids: &[Uuid],
) -> Result<()> {
    let found = existing_skills(conn, ids).await?;

    let mut missing: Vec<Uuid> = ids.iter().filter(|id| !found.contains_key(*id)).copied().collect();
    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(Error::InvalidReference {
            skill_ids: missing,
            problem: ReferenceProblem::Missing,
        });
    }

    let mut foreign: Vec<Uuid> = ids
        .iter()
        .filter(|id| found.get(*id) != Some(&repository_id))
        .copied()
        .collect();
    if !foreign.is_empty() {
        foreign.sort();
        foreign.dedup();
        return Err(Error::InvalidReference {
            skill_ids: foreign,
            problem: ReferenceProblem::ForeignRepository,
        });
    }

    Ok(())
}

/// Load the nesting graph of one repository
pub(crate) async fn load_graph(conn: &mut SqliteConnection, repository_id: Uuid) -> Result<SkillGraph> {
    let repo = repository_id.to_string();

    let ids: Vec<(String,)> = sqlx::query_as("SELECT id FROM skills WHERE repository_id = ?")
        .bind(&repo)
        .fetch_all(&mut *conn)
        .await?;

    let mut graph = SkillGraph::new();
    for (id,) in ids {
        graph.insert_skill(parse_uuid(&id)?, repository_id);
    }

    for (parent, child) in repository_edges(conn, repository_id).await? {
        graph.insert_edge_unchecked(parent, child);
    }

    if let Some(cycle) = graph.find_cycle() {
        warn!(
            repository_id = %repository_id,
            cycle = ?cycle,
            "Stored nesting graph contains a cycle"
        );
    }

    Ok(graph)
}

async fn repository_edges(conn: &mut SqliteConnection, repository_id: Uuid) -> Result<Vec<(Uuid, Uuid)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT n.parent_id, n.child_id
        FROM skill_nesting n
        JOIN skills p ON p.id = n.parent_id
        JOIN skills c ON c.id = n.child_id
        WHERE p.repository_id = ? AND c.repository_id = p.repository_id
        ORDER BY n.created_at, n.child_id
        "#,
    )
    .bind(repository_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|(p, c)| Ok((parse_uuid(&p)?, parse_uuid(&c)?)))
        .collect()
}

/// Get one skill with its nesting relations
pub(crate) async fn fetch_skill(conn: &mut SqliteConnection, skill_id: Uuid) -> Result<Option<Skill>> {
    let id = skill_id.to_string();

    let row: Option<SkillRow> = sqlx::query_as(
        r#"
        SELECT id, repository_id, name, description, level, created_at, updated_at
        FROM skills
        WHERE id = ?
        "#,
    )
    .bind(&id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let children: Vec<(String,)> =
        sqlx::query_as("SELECT child_id FROM skill_nesting WHERE parent_id = ? ORDER BY created_at, child_id")
            .bind(&id)
            .fetch_all(&mut *conn)
            .await?;
    let parents: Vec<(String,)> =
        sqlx::query_as("SELECT parent_id FROM skill_nesting WHERE child_id = ? ORDER BY parent_id")
            .bind(&id)
            .fetch_all(&mut *conn)
            .await?;

    let nested = children
        .iter()
        .map(|(c,)| parse_uuid(c))
        .collect::<Result<Vec<_>>>()?;
    let parents = parents
        .iter()
        .map(|(p,)| parse_uuid(p))
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(row.into_skill(nested, parents)?))
}

/// List all skills of a repository, ordered by name
pub(crate) async fn fetch_skills(conn: &mut SqliteConnection, repository_id: Uuid) -> Result<Vec<Skill>> {
    let rows: Vec<SkillRow> = sqlx::query_as(
        r#"
        SELECT id, repository_id, name, description, level, created_at, updated_at
        FROM skills
        WHERE repository_id = ?
        ORDER BY name, id
        "#,
    )
    .bind(repository_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut parents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (parent, child) in repository_edges(conn, repository_id).await? {
        children.entry(parent).or_default().push(child);
        parents.entry(child).or_default().push(parent);
    }

    rows.into_iter()
        .map(|row| {
            let id = parse_uuid(&row.id)?;
            let nested = children.remove(&id).unwrap_or_default();
            let mut up = parents.remove(&id).unwrap_or_default();
            up.sort();
            row.into_skill(nested, up)
        })
        .collect()
}

pub(crate) async fn insert_skill(conn: &mut SqliteConnection, skill: &Skill) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO skills (id, repository_id, name, description, level, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(skill.id.to_string())
    .bind(skill.repository_id.to_string())
    .bind(&skill.name)
    .bind(&skill.description)
    .bind(skill.level)
    .bind(skill.created_at)
    .bind(skill.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_skill_row(conn: &mut SqliteConnection, skill: &Skill) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE skills SET name = ?, description = ?, level = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&skill.name)
    .bind(&skill.description)
    .bind(skill.level)
    .bind(skill.updated_at)
    .bind(skill.id.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn touch_skills(conn: &mut SqliteConnection, ids: &[Uuid], now: DateTime<Utc>) -> Result<()> {
    for id in ids {
        sqlx::query("UPDATE skills SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub(crate) async fn insert_edge(conn: &mut SqliteConnection, parent_id: Uuid, child_id: Uuid) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO skill_nesting (parent_id, child_id, created_at) VALUES (?, ?, ?)")
        .bind(parent_id.to_string())
        .bind(child_id.to_string())
        .bind(Utc::now())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn delete_child_edges(conn: &mut SqliteConnection, parent_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM skill_nesting WHERE parent_id = ?")
        .bind(parent_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

pub(crate) async fn delete_parent_edges(conn: &mut SqliteConnection, child_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM skill_nesting WHERE child_id = ?")
        .bind(child_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

/// Reassign skills to another repository
pub(crate) async fn set_repository(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
    repository_id: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    for id in ids {
        sqlx::query("UPDATE skills SET repository_id = ?, updated_at = ? WHERE id = ?")
            .bind(repository_id.to_string())
            .bind(now)
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Delete a skill row; nesting edges go with it
pub(crate) async fn delete_skill_row(conn: &mut SqliteConnection, skill_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM skills WHERE id = ?")
        .bind(skill_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

/// Delete every skill of a repository together with their edges
pub(crate) async fn delete_repository_skills(conn: &mut SqliteConnection, repository_id: Uuid) -> Result<u64> {
    let repo = repository_id.to_string();

    sqlx::query(
        r#"
        DELETE FROM skill_nesting
        WHERE parent_id IN (SELECT id FROM skills WHERE repository_id = ?)
           OR child_id IN (SELECT id FROM skills WHERE repository_id = ?)
        "#,
    )
    .bind(&repo)
    .bind(&repo)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query("DELETE FROM skills WHERE repository_id = ?")
        .bind(&repo)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

/// Parents of the given skills that are not themselves in the set
pub(crate) async fn outside_parents(
    conn: &mut SqliteConnection,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Uuid>>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT parent_id, child_id FROM skill_nesting WHERE child_id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(") ORDER BY child_id, parent_id");

    let rows: Vec<(String, String)> = query.build_query_as().fetch_all(conn).await?;
    let members: HashSet<&Uuid> = ids.iter().collect();

    let mut result: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (parent, child) in rows {
        let parent = parse_uuid(&parent)?;
        if !members.contains(&parent) {
            result.entry(parse_uuid(&child)?).or_default().push(parent);
        }
    }
    Ok(result)
}
