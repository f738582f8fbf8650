//! Skill repository entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::graph::Skill;
use crate::domain::patch::Patch;

/// An owned, optionally versioned collection of skills
///
/// `(owner_id, name, version)` is unique; an absent version counts as one
/// distinct value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRepository {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A repository together with its skills
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryDetail {
    #[serde(flatten)]
    pub repository: SkillRepository,
    pub skills: Vec<Skill>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRepository {
    pub owner_id: String,
    pub name: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

impl NewRepository {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryUpdate {
    pub name: Option<String>,
    pub version: Patch<String>,
    pub description: Patch<String>,
}

/// Exact-match filter for repository listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFilter {
    pub owner_id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl RepositoryFilter {
    pub fn is_empty(&self) -> bool {
        self.owner_id.is_none() && self.name.is_none() && self.version.is_none()
    }

    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Default::default()
        }
    }
}

/// Zero-based page request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: Some(page),
            page_size: Some(page_size),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page.is_none() && self.page_size.is_none()
    }

    /// Resolve to `(limit, offset)`
    ///
    /// Unfiltered listings are always bounded; filtered ones only when the
    /// caller asked for a page.
    pub fn bounds(&self, filtered: bool, default_page_size: u32) -> Option<(u32, u32)> {
        if filtered && self.is_empty() {
            return None;
        }
        let size = self.page_size.unwrap_or(default_page_size).max(1);
        let page = self.page.unwrap_or(0);
        Some((size, page.saturating_mul(size)))
    }
}
