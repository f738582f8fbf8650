//! SQLite implementation of the UnitCatalog
//!
//! Unit references to skills are foreign keys with `ON DELETE RESTRICT`, so
//! a unit registered after a deletion check still blocks that deletion.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::graph::ReferenceProblem;
use crate::domain::graph::repository as skill_rows;
use crate::domain::units::{TemplatePath, UnitCatalog, UnitFilter, UnitReference, UnitSpec};
use crate::error::{Error, Result};
use crate::storage::{begin_write, parse_uuid};

/// SQLite-backed learning unit catalog
#[derive(Clone)]
pub struct SqliteUnitCatalog {
    pool: SqlitePool,
}

impl SqliteUnitCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register an immutable unit; every referenced skill must exist
    pub async fn register_unit(&self, unit: &UnitSpec) -> Result<()> {
        if unit.title.trim().is_empty() {
            return Err(Error::InvalidRequest("unit title must not be empty".to_string()));
        }

        let mut tx = begin_write(&self.pool).await?;

        let referenced: Vec<Uuid> = unit.referenced_skill_ids().copied().collect();
        let existing = skill_rows::existing_skills(&mut *tx, &referenced).await?;
        let mut missing: Vec<Uuid> = referenced
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

        sqlx::query("INSERT INTO learning_units (id, title) VALUES (?, ?)")
            .bind(unit.id.to_string())
            .bind(unit.title.trim())
            .execute(&mut *tx)
            .await?;

        for skill_id in &unit.required_skill_ids {
            sqlx::query("INSERT OR IGNORE INTO unit_required_skills (unit_id, skill_id) VALUES (?, ?)")
                .bind(unit.id.to_string())
                .bind(skill_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        for skill_id in &unit.teaching_goal_ids {
            sqlx::query("INSERT OR IGNORE INTO unit_teaching_goals (unit_id, skill_id) VALUES (?, ?)")
                .bind(unit.id.to_string())
                .bind(skill_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(
            unit_id = %unit.id,
            required = unit.required_skill_ids.len(),
            teaches = unit.teaching_goal_ids.len(),
            "Learning unit registered"
        );
        Ok(())
    }

    /// Register a pre-authored path; every unit must exist
    pub async fn register_template_path(&self, path: &TemplatePath) -> Result<()> {
        if path.title.trim().is_empty() {
            return Err(Error::InvalidRequest("template title must not be empty".to_string()));
        }

        let mut tx = begin_write(&self.pool).await?;

        let known = existing_unit_ids(&mut *tx, &path.unit_ids).await?;
        if let Some(missing) = path.unit_ids.iter().find(|id| !known.contains(*id)) {
            return Err(Error::UnitNotFound(*missing));
        }

        sqlx::query("INSERT INTO template_paths (id, title) VALUES (?, ?)")
            .bind(path.id.to_string())
            .bind(path.title.trim())
            .execute(&mut *tx)
            .await?;

        for (position, unit_id) in path.unit_ids.iter().enumerate() {
            sqlx::query("INSERT INTO template_path_units (path_id, position, unit_id) VALUES (?, ?, ?)")
                .bind(path.id.to_string())
                .bind(position as i64)
                .bind(unit_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(template_id = %path.id, units = path.unit_ids.len(), "Template path registered");
        Ok(())
    }

    /// All template paths, ordered by title
    pub async fn list_template_paths(&self) -> Result<Vec<TemplatePath>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM template_paths ORDER BY title, id")
            .fetch_all(&mut *conn)
            .await?;

        let mut paths = Vec::with_capacity(rows.len());
        for (id,) in rows {
            if let Some(path) = fetch_template(&mut conn, parse_uuid(&id)?).await? {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

#[async_trait]
impl UnitCatalog for SqliteUnitCatalog {
    async fn list_candidate_units(&self, filter: &UnitFilter) -> Result<Vec<UnitSpec>> {
        let mut conn = self.pool.acquire().await?;

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id, title FROM learning_units");
        if let Some(ids) = &filter.unit_ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            query.push(" WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in ids {
                separated.push_bind(id.to_string());
            }
            separated.push_unseparated(")");
        }
        query.push(" ORDER BY title, id");

        let rows: Vec<(String, String)> = query.build_query_as().fetch_all(&mut *conn).await?;
        let units = assemble_units(&mut conn, rows).await?;

        debug!(units = units.len(), "Listed candidate units");
        Ok(units)
    }

    async fn units_referencing(&self, skill_ids: &[Uuid]) -> Result<Vec<UnitReference>> {
        if skill_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT unit_id, skill_id FROM unit_required_skills WHERE skill_id IN (",
        );
        push_id_list(&mut query, skill_ids);
        query.push(" UNION SELECT unit_id, skill_id FROM unit_teaching_goals WHERE skill_id IN (");
        push_id_list(&mut query, skill_ids);

        let rows: Vec<(String, String)> = query.build_query_as().fetch_all(&self.pool).await?;
        let mut references = rows
            .into_iter()
            .map(|(unit_id, skill_id)| {
                Ok(UnitReference {
                    unit_id: parse_uuid(&unit_id)?,
                    skill_id: parse_uuid(&skill_id)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        references.sort();
        references.dedup();
        Ok(references)
    }

    async fn unit(&self, unit_id: Uuid) -> Result<Option<UnitSpec>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT id, title FROM learning_units WHERE id = ?")
            .bind(unit_id.to_string())
            .fetch_all(&mut *conn)
            .await?;
        Ok(assemble_units(&mut conn, rows).await?.into_iter().next())
    }

    async fn template_path(&self, path_id: Uuid) -> Result<Option<TemplatePath>> {
        let mut conn = self.pool.acquire().await?;
        fetch_template(&mut conn, path_id).await
    }
}

fn push_id_list(query: &mut QueryBuilder<'_, Sqlite>, ids: &[Uuid]) {
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");
}

async fn existing_unit_ids(conn: &mut SqliteConnection, ids: &[Uuid]) -> Result<HashSet<Uuid>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id FROM learning_units WHERE id IN (");
    push_id_list(&mut query, ids);

    let rows: Vec<(String,)> = query.build_query_as().fetch_all(conn).await?;
    rows.iter().map(|(id,)| parse_uuid(id)).collect()
}

/// Attach prerequisites and teaching goals to unit rows, keeping row order
async fn assemble_units(conn: &mut SqliteConnection, rows: Vec<(String, String)>) -> Result<Vec<UnitSpec>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = rows
        .iter()
        .map(|(id, _)| parse_uuid(id))
        .collect::<Result<Vec<_>>>()?;
    let required = skill_links(conn, "unit_required_skills", &ids).await?;
    let goals = skill_links(conn, "unit_teaching_goals", &ids).await?;

    Ok(ids
        .into_iter()
        .zip(rows)
        .map(|(id, (_, title))| UnitSpec {
            id,
            title,
            required_skill_ids: required.get(&id).cloned().unwrap_or_default(),
            teaching_goal_ids: goals.get(&id).cloned().unwrap_or_default(),
        })
        .collect())
}

async fn skill_links(
    conn: &mut SqliteConnection,
    table: &'static str,
    unit_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<Uuid>>> {
    let mut query: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT unit_id, skill_id FROM {} WHERE unit_id IN (", table));
    push_id_list(&mut query, unit_ids);
    query.push(" ORDER BY unit_id, skill_id");

    let rows: Vec<(String, String)> = query.build_query_as().fetch_all(conn).await?;
    let mut links: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (unit_id, skill_id) in rows {
        links
            .entry(parse_uuid(&unit_id)?)
            .or_default()
            .push(parse_uuid(&skill_id)?);
    }
    Ok(links)
}

async fn fetch_template(conn: &mut SqliteConnection, path_id: Uuid) -> Result<Option<TemplatePath>> {
    let id = path_id.to_string();

    let row: Option<(String,)> = sqlx::query_as("SELECT title FROM template_paths WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some((title,)) = row else {
        return Ok(None);
    };

    let units: Vec<(String,)> =
        sqlx::query_as("SELECT unit_id FROM template_path_units WHERE path_id = ? ORDER BY position")
            .bind(&id)
            .fetch_all(&mut *conn)
            .await?;

    Ok(Some(TemplatePath {
        id: path_id,
        title,
        unit_ids: units
            .iter()
            .map(|(unit_id,)| parse_uuid(unit_id))
            .collect::<Result<Vec<_>>>()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;

    async fn seed_skills(db: &Database, n: usize) -> Vec<Uuid> {
        let repo = Uuid::new_v4();
        sqlx::query("INSERT INTO skill_repositories (id, owner_id, name) VALUES (?, 'owner', 'repo')")
            .bind(repo.to_string())
            .execute(db.pool())
            .await
            .unwrap();

        let mut ids = Vec::new();
        for i in 0..n {
            let id = Uuid::new_v4();
            sqlx::query("INSERT INTO skills (id, repository_id, name) VALUES (?, ?, ?)")
                .bind(id.to_string())
                .bind(repo.to_string())
                .bind(format!("skill-{}", i))
                .execute(db.pool())
                .await
                .unwrap();
            ids.push(id);
        }
        ids
    }

    #[tokio::test]
    async fn test_register_and_list_units() {
        let db = Database::in_memory().await.unwrap();
        let skills = seed_skills(&db, 2).await;
        let catalog = SqliteUnitCatalog::new(db.pool().clone());

        let unit = UnitSpec::new("Borrowing basics")
            .requires([skills[0]])
            .teaches([skills[1]]);
        catalog.register_unit(&unit).await.unwrap();

        let listed = catalog.list_candidate_units(&UnitFilter::all()).await.unwrap();
        assert_eq!(listed, vec![unit.clone()]);

        let filtered = catalog
            .list_candidate_units(&UnitFilter::only(vec![Uuid::new_v4()]))
            .await
            .unwrap();
        assert!(filtered.is_empty());

        assert_eq!(catalog.unit(unit.id).await.unwrap(), Some(unit.clone()));

        let refs = catalog.units_referencing(&[skills[1]]).await.unwrap();
        assert_eq!(
            refs,
            vec![UnitReference {
                unit_id: unit.id,
                skill_id: skills[1]
            }]
        );
    }

    #[tokio::test]
    async fn test_register_unit_with_missing_skill() {
        let db = Database::in_memory().await.unwrap();
        let catalog = SqliteUnitCatalog::new(db.pool().clone());

        let unit = UnitSpec::new("Ghost").teaches([Uuid::new_v4()]);
        let err = catalog.register_unit(&unit).await.unwrap_err();
        assert!(matches!(err, Error::InvalidReference { .. }));
        assert!(catalog.unit(unit.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_template_paths_keep_order() {
        let db = Database::in_memory().await.unwrap();
        let skills = seed_skills(&db, 1).await;
        let catalog = SqliteUnitCatalog::new(db.pool().clone());

        let first = UnitSpec::new("B second title").teaches([skills[0]]);
        let second = UnitSpec::new("A first title").requires([skills[0]]);
        catalog.register_unit(&first).await.unwrap();
        catalog.register_unit(&second).await.unwrap();

        let template = TemplatePath {
            id: Uuid::new_v4(),
            title: "Intro track".to_string(),
            unit_ids: vec![first.id, second.id],
        };
        catalog.register_template_path(&template).await.unwrap();

        assert_eq!(catalog.template_path(template.id).await.unwrap(), Some(template.clone()));
        assert_eq!(catalog.list_template_paths().await.unwrap(), vec![template]);

        let bogus = TemplatePath {
            id: Uuid::new_v4(),
            title: "Broken".to_string(),
            unit_ids: vec![Uuid::new_v4()],
        };
        assert!(matches!(
            catalog.register_template_path(&bogus).await,
            Err(Error::UnitNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_referenced_skill_cannot_be_deleted_directly() {
        let db = Database::in_memory().await.unwrap();
        let skills = seed_skills(&db, 1).await;
        let catalog = SqliteUnitCatalog::new(db.pool().clone());
        catalog
            .register_unit(&UnitSpec::new("Uses skill").teaches([skills[0]]))
            .await
            .unwrap();

        let result = sqlx::query("DELETE FROM skills WHERE id = ?")
            .bind(skills[0].to_string())
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }
}
