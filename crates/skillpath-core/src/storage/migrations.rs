//! Schema migrations
//!
//! Applied versions are recorded in `_migrations`; every pending step runs
//! in a transaction together with its record.

use anyhow::Context;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::begin_write;

pub const CURRENT_VERSION: i32 = 2;

const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Skill graph and unit catalog
const MIGRATION_V1: &str = r#"
    -- Skill repositories (owned, versioned collections of skills)
    CREATE TABLE IF NOT EXISTS skill_repositories (
        id TEXT PRIMARY KEY NOT NULL,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        version TEXT,
        description TEXT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- A missing version is its own value for the identity constraint
    CREATE UNIQUE INDEX IF NOT EXISTS idx_skill_repositories_identity
        ON skill_repositories(owner_id, name, COALESCE(version, ''));
    CREATE INDEX IF NOT EXISTS idx_skill_repositories_owner ON skill_repositories(owner_id);

    -- Skills
    CREATE TABLE IF NOT EXISTS skills (
        id TEXT PRIMARY KEY NOT NULL,
        repository_id TEXT NOT NULL REFERENCES skill_repositories(id) ON DELETE RESTRICT,
        name TEXT NOT NULL,
        description TEXT,
        level INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_skills_repository_id ON skills(repository_id);

    -- Forward nesting edges (parent nests child); parents are derived on read
    CREATE TABLE IF NOT EXISTS skill_nesting (
        parent_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
        child_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (parent_id, child_id),
        CHECK (parent_id <> child_id)
    );

    CREATE INDEX IF NOT EXISTS idx_skill_nesting_child_id ON skill_nesting(child_id);

    -- Learning units (catalog entries, immutable once registered)
    CREATE TABLE IF NOT EXISTS learning_units (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS unit_required_skills (
        unit_id TEXT NOT NULL REFERENCES learning_units(id) ON DELETE CASCADE,
        skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE RESTRICT,
        PRIMARY KEY (unit_id, skill_id)
    );

    CREATE INDEX IF NOT EXISTS idx_unit_required_skills_skill_id ON unit_required_skills(skill_id);

    CREATE TABLE IF NOT EXISTS unit_teaching_goals (
        unit_id TEXT NOT NULL REFERENCES learning_units(id) ON DELETE CASCADE,
        skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE RESTRICT,
        PRIMARY KEY (unit_id, skill_id)
    );

    CREATE INDEX IF NOT EXISTS idx_unit_teaching_goals_skill_id ON unit_teaching_goals(skill_id);

    -- Pre-authored learning paths
    CREATE TABLE IF NOT EXISTS template_paths (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS template_path_units (
        path_id TEXT NOT NULL REFERENCES template_paths(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        unit_id TEXT NOT NULL REFERENCES learning_units(id) ON DELETE RESTRICT,
        PRIMARY KEY (path_id, position)
    );
"#;

/// Migration 2: Learning histories and personalized paths
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS learning_histories (
        learner_id TEXT PRIMARY KEY NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- No foreign key to skills: a learned skill is a historical fact
    CREATE TABLE IF NOT EXISTS learned_skills (
        learner_id TEXT NOT NULL REFERENCES learning_histories(learner_id) ON DELETE CASCADE,
        skill_id TEXT NOT NULL,
        learned_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (learner_id, skill_id)
    );

    CREATE TABLE IF NOT EXISTS personalized_paths (
        id TEXT PRIMARY KEY NOT NULL,
        learner_id TEXT NOT NULL REFERENCES learning_histories(learner_id) ON DELETE CASCADE,
        origin_path_id TEXT,
        goal_skill_ids TEXT,
        mode TEXT NOT NULL DEFAULT 'greedy' CHECK (mode IN ('greedy', 'optimal')),
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        CHECK ((origin_path_id IS NULL) <> (goal_skill_ids IS NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_personalized_paths_learner ON personalized_paths(learner_id, updated_at);

    -- Frozen unit sequence; unit ids are not foreign keys so history survives catalog changes
    CREATE TABLE IF NOT EXISTS unit_instances (
        id TEXT PRIMARY KEY NOT NULL,
        path_id TEXT NOT NULL REFERENCES personalized_paths(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        unit_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'in_progress', 'finished')),
        actual_processing_time INTEGER,
        test_performance REAL,
        consumed_at TIMESTAMP,
        updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (path_id, position)
    );

    CREATE INDEX IF NOT EXISTS idx_unit_instances_path_unit ON unit_instances(path_id, unit_id);
"#;

/// One schema step
struct Migration {
    version: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "skill graph and unit catalog",
        sql: MIGRATION_V1,
    },
    Migration {
        version: 2,
        description: "learning histories and personalized paths",
        sql: MIGRATION_V2,
    },
];

async fn applied_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;
    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Apply every pending migration, each in its own transaction
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let applied = applied_version(pool).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();

    if pending.is_empty() {
        debug!(version = applied, "Database schema is up to date");
        return Ok(());
    }

    for migration in pending {
        info!(
            version = migration.version,
            "Applying migration: {}", migration.description
        );
        let mut tx = begin_write(pool).await?;
        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration v{} failed", migration.version))?;
        sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    info!(version = CURRENT_VERSION, "Database migrations completed");
    Ok(())
}

pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = applied_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationStatus {
    pub current_version: i32,
    pub target_version: i32,
    pub needs_migration: bool,
}
