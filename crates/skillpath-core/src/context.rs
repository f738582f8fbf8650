//! Service wiring
//!
//! [`CoreContext`] owns the database, the lock manager, the unit catalog and
//! the goal resolver, and hands out the domain services built on top of them.
//! Every service created from one context shares the same lock manager, so
//! per-aggregate serialization holds across services.

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::domain::enrollment::EnrollmentEngine;
use crate::domain::graph::SkillGraphStore;
use crate::domain::history::ProgressTracker;
use crate::domain::locking::{LockConfig, LockManager};
use crate::domain::repositories::RepositoryManager;
use crate::domain::resolver::{GoalResolver, ResolverGateway};
use crate::domain::units::UnitCatalog;
use crate::error::Result;
use crate::infrastructure::{HttpGoalResolver, SqliteUnitCatalog, UnconfiguredResolver};
use crate::storage::{Database, DatabaseConfig};

#[derive(Clone)]
pub struct CoreContext {
    config: Config,
    database: Database,
    locks: Arc<LockManager>,
    catalog: Arc<SqliteUnitCatalog>,
    resolver: Arc<dyn GoalResolver>,
}

impl CoreContext {
    /// Open the configured database and build the configured resolver client
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let db_config =
            DatabaseConfig::with_path(config.database_path()).max_connections(config.database.max_connections);
        let database = Database::new(db_config).await?;

        let resolver: Arc<dyn GoalResolver> = match config.resolver.endpoint.as_deref() {
            Some(endpoint) => Arc::new(HttpGoalResolver::new(endpoint)?),
            None => Arc::new(UnconfiguredResolver),
        };

        info!(path = %database.path().display(), "Opened skillpath database");
        Ok(Self::assemble(config, database, resolver))
    }

    /// In-memory context with the given resolver, for tests and dry runs
    pub async fn in_memory(resolver: Arc<dyn GoalResolver>) -> Result<Self> {
        let database = Database::in_memory().await?;
        Ok(Self::assemble(Config::default(), database, resolver))
    }

    fn assemble(config: Config, database: Database, resolver: Arc<dyn GoalResolver>) -> Self {
        let locks = Arc::new(LockManager::new(
            LockConfig::default().with_timeout(config.locking.timeout()),
        ));
        let catalog = Arc::new(SqliteUnitCatalog::new(database.pool().clone()));

        Self {
            config,
            database,
            locks,
            catalog,
            resolver,
        }
    }

    /// Replace the goal resolver; services created afterwards use it
    pub fn with_resolver(mut self, resolver: Arc<dyn GoalResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn locks(&self) -> &Arc<LockManager> {
        &self.locks
    }

    /// Unit catalog with its registration operations
    pub fn catalog(&self) -> &SqliteUnitCatalog {
        &self.catalog
    }

    fn unit_catalog(&self) -> Arc<dyn UnitCatalog> {
        self.catalog.clone()
    }

    pub fn graph_store(&self) -> SkillGraphStore {
        SkillGraphStore::new(self.database.pool().clone(), self.locks.clone(), self.unit_catalog())
    }

    pub fn repository_manager(&self) -> RepositoryManager {
        RepositoryManager::new(
            self.database.pool().clone(),
            self.locks.clone(),
            self.unit_catalog(),
            self.config.listing.default_page_size,
        )
    }

    pub fn tracker(&self) -> ProgressTracker {
        ProgressTracker::new(self.database.pool().clone(), self.locks.clone())
    }

    pub fn enrollment_engine(&self) -> EnrollmentEngine {
        EnrollmentEngine::new(
            self.database.pool().clone(),
            self.locks.clone(),
            self.unit_catalog(),
            ResolverGateway::new(self.resolver.clone(), self.config.resolver.timeout()),
            self.tracker(),
        )
    }
}
