//! Personalized path entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::resolver::ResolveMode;
use crate::error::{Error, Result};

/// Where a path's unit sequence came from
///
/// Exactly one origin exists per path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathOrigin {
    /// Copied from a pre-authored template path
    Template(Uuid),
    /// Resolved towards a set of goal skills
    Goals(BTreeSet<Uuid>),
}

impl PathOrigin {
    /// Build an origin from two optional inputs, exactly one of which must be given
    pub fn from_parts(origin_path_id: Option<Uuid>, goal_skill_ids: Option<Vec<Uuid>>) -> Result<Self> {
        match (origin_path_id, goal_skill_ids) {
            (Some(_), Some(_)) => Err(Error::InvalidRequest(
                "specify either a template path or goal skills, not both".to_string(),
            )),
            (None, None) => Err(Error::InvalidRequest(
                "specify a template path or at least one goal skill".to_string(),
            )),
            (Some(path_id), None) => Ok(Self::Template(path_id)),
            (None, Some(goals)) => Self::goals(goals),
        }
    }

    /// Goal-based origin; the goal set must not be empty
    pub fn goals(goal_skill_ids: impl IntoIterator<Item = Uuid>) -> Result<Self> {
        let goals: BTreeSet<Uuid> = goal_skill_ids.into_iter().collect();
        if goals.is_empty() {
            return Err(Error::InvalidRequest(
                "goal skill list must not be empty".to_string(),
            ));
        }
        Ok(Self::Goals(goals))
    }

    pub fn template_id(&self) -> Option<Uuid> {
        match self {
            Self::Template(id) => Some(*id),
            Self::Goals(_) => None,
        }
    }

    pub fn goal_skill_ids(&self) -> Option<&BTreeSet<Uuid>> {
        match self {
            Self::Template(_) => None,
            Self::Goals(goals) => Some(goals),
        }
    }
}

impl fmt::Display for PathOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(id) => write!(f, "template {}", id),
            Self::Goals(goals) => write!(f, "{} goal skill(s)", goals.len()),
        }
    }
}

/// Progress of one unit instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Open,
    InProgress,
    Finished,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a path, always derived from its unit instances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathStatus {
    Open,
    InProgress,
    Finished,
}

impl PathStatus {
    /// OPEN iff every unit is open, FINISHED iff every unit is finished,
    /// IN_PROGRESS otherwise
    pub fn derive<'a>(statuses: impl IntoIterator<Item = &'a UnitStatus>) -> Self {
        let mut total = 0usize;
        let mut open = 0usize;
        let mut finished = 0usize;
        for status in statuses {
            total += 1;
            match status {
                UnitStatus::Open => open += 1,
                UnitStatus::Finished => finished += 1,
                UnitStatus::InProgress => {}
            }
        }
        Self::from_counts(total, open, finished)
    }

    /// Derive from aggregated instance counts
    pub fn from_counts(total: usize, open: usize, finished: usize) -> Self {
        if open == total {
            Self::Open
        } else if finished == total {
            Self::Finished
        } else {
            Self::InProgress
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One position in a frozen unit sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitInstance {
    pub id: Uuid,
    pub path_id: Uuid,
    pub position: u32,
    pub unit_id: Uuid,
    pub status: UnitStatus,
    pub actual_processing_time_minutes: Option<u32>,
    pub test_performance: Option<f64>,
    /// When consumption was last recorded
    pub consumed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// A learner's frozen, ordered sequence of units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalizedPath {
    pub id: Uuid,
    pub learner_id: String,
    pub origin: PathOrigin,
    pub mode: ResolveMode,
    pub units: Vec<UnitInstance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersonalizedPath {
    pub fn status(&self) -> PathStatus {
        PathStatus::derive(self.units.iter().map(|u| &u.status))
    }

    /// Unit ids in sequence order
    pub fn unit_ids(&self) -> Vec<Uuid> {
        self.units.iter().map(|u| u.unit_id).collect()
    }
}

/// Consumption measurements for one unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionUpdate {
    pub actual_processing_time_minutes: Option<u32>,
    pub test_performance: Option<f64>,
    /// Mark the unit as finished
    pub finished: bool,
}

impl ConsumptionUpdate {
    pub fn finished() -> Self {
        Self {
            finished: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(score) = self.test_performance {
            if !score.is_finite() || score < 0.0 {
                return Err(Error::InvalidRequest(format!(
                    "test performance must be a non-negative number, got {}",
                    score
                )));
            }
        }
        Ok(())
    }
}

/// Request to enroll a learner into a new path
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentRequest {
    pub learner_id: String,
    pub origin: PathOrigin,
    pub mode: ResolveMode,
    /// Resolver time bound; the configured default when absent
    pub timeout: Option<Duration>,
}

impl EnrollmentRequest {
    pub fn new(learner_id: impl Into<String>, origin: PathOrigin) -> Self {
        Self {
            learner_id: learner_id.into(),
            origin,
            mode: ResolveMode::default(),
            timeout: None,
        }
    }

    pub fn with_mode(mut self, mode: ResolveMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a dry-run enrollment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathPreview {
    pub origin: PathOrigin,
    pub mode: ResolveMode,
    pub unit_ids: Vec<Uuid>,
}
