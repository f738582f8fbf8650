//! Goal resolver request and outcome types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::domain::units::UnitSpec;

/// Search strategy requested from the resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveMode {
    /// Fast, possibly suboptimal ordering
    #[default]
    Greedy,
    /// Minimal ordering, potentially slow
    Optimal,
}

impl ResolveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greedy => "greedy",
            Self::Optimal => "optimal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "greedy" => Some(Self::Greedy),
            "optimal" => Some(Self::Optimal),
            _ => None,
        }
    }
}

impl fmt::Display for ResolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the resolver needs, passed by value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub known_skill_ids: BTreeSet<Uuid>,
    pub goal_skill_ids: BTreeSet<Uuid>,
    pub candidate_units: Vec<UnitSpec>,
    pub mode: ResolveMode,
}

/// Why a resolution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionErrorKind {
    /// The prerequisite structure among candidates is cyclic
    CycleDetected,
    /// No sequence of candidates reaches the goals
    PathNotFound,
}

impl ResolutionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::PathNotFound => "PATH_NOT_FOUND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CYCLE_DETECTED" => Some(Self::CycleDetected),
            "PATH_NOT_FOUND" => Some(Self::PathNotFound),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who decided the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// Reported by the resolver itself
    Solver,
    /// The resolver did not answer within the time bound
    Timeout,
}

/// A failed resolution with the entities involved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub kind: ResolutionErrorKind,
    pub reason: FailureReason,
    pub affected_skill_ids: Vec<Uuid>,
    pub affected_unit_ids: Vec<Uuid>,
}

impl ResolutionFailure {
    /// Failure reported by the resolver
    pub fn solver(
        kind: ResolutionErrorKind,
        affected_skill_ids: Vec<Uuid>,
        affected_unit_ids: Vec<Uuid>,
    ) -> Self {
        Self {
            kind,
            reason: FailureReason::Solver,
            affected_skill_ids,
            affected_unit_ids,
        }
    }

    /// Timeout failure blaming the requested goals
    pub fn timeout(goal_skill_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            kind: ResolutionErrorKind::PathNotFound,
            reason: FailureReason::Timeout,
            affected_skill_ids: goal_skill_ids.into_iter().collect(),
            affected_unit_ids: Vec::new(),
        }
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.reason == FailureReason::Timeout {
            write!(f, " (resolver timed out)")?;
        }
        if !self.affected_skill_ids.is_empty() {
            write!(f, "; skills [{}]", join_ids(&self.affected_skill_ids))?;
        }
        if !self.affected_unit_ids.is_empty() {
            write!(f, "; units [{}]", join_ids(&self.affected_unit_ids))?;
        }
        Ok(())
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

/// What the resolver answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Ordered unit ids leading to the goals
    Path(Vec<Uuid>),
    Failure(ResolutionFailure),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse_and_serde() {
        assert_eq!(ResolveMode::parse("Optimal"), Some(ResolveMode::Optimal));
        assert_eq!(ResolveMode::parse("greedy"), Some(ResolveMode::Greedy));
        assert_eq!(ResolveMode::parse("fast"), None);
        assert_eq!(
            serde_json::to_string(&ResolveMode::Optimal).unwrap(),
            "\"optimal\""
        );
    }

    #[test]
    fn test_error_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&ResolutionErrorKind::CycleDetected).unwrap(),
            "\"CYCLE_DETECTED\""
        );
        assert_eq!(
            ResolutionErrorKind::parse("PATH_NOT_FOUND"),
            Some(ResolutionErrorKind::PathNotFound)
        );
    }

    #[test]
    fn test_timeout_failure_blames_goals() {
        let goal = Uuid::new_v4();
        let failure = ResolutionFailure::timeout([goal]);

        assert_eq!(failure.kind, ResolutionErrorKind::PathNotFound);
        assert_eq!(failure.reason, FailureReason::Timeout);
        assert_eq!(failure.affected_skill_ids, vec![goal]);

        let message = failure.to_string();
        assert!(message.starts_with("PATH_NOT_FOUND"));
        assert!(message.contains("timed out"));
        assert!(message.contains(&goal.to_string()));
    }
}
