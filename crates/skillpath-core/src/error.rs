//! Error types for skillpath

use thiserror::Error;
use uuid::Uuid;

use crate::domain::graph::{DeletionBlocker, ReferenceProblem};
use crate::domain::resolver::ResolutionFailure;

/// Result type alias using skillpath's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Skillpath error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Not-found errors (E001-E099)
    #[error("Skill repository '{0}' not found. Run `skillpath repo list` to see all repositories.")]
    RepositoryNotFound(Uuid),

    #[error("Skill '{0}' not found.")]
    SkillNotFound(Uuid),

    #[error("Learning unit '{0}' not found in the unit catalog.")]
    UnitNotFound(Uuid),

    #[error("Learning path template '{0}' not found.")]
    TemplatePathNotFound(Uuid),

    #[error("Personalized learning path '{0}' not found.")]
    PathNotFound(Uuid),

    #[error("Learner '{0}' has no learning history.")]
    LearnerNotFound(String),

    #[error("Learner '{learner_id}' has not learned skill '{skill_id}'.")]
    LearnedSkillNotFound { learner_id: String, skill_id: Uuid },

    // Conflict errors (E100-E199)
    #[error("Repository '{name}' (version {}) already exists for owner '{owner_id}'.", .version.as_deref().unwrap_or("none"))]
    RepositoryConflict {
        owner_id: String,
        name: String,
        version: Option<String>,
    },

    // Graph errors (E200-E299)
    #[error("Invalid skill reference ({problem}): {}", format_ids(.skill_ids))]
    InvalidReference {
        skill_ids: Vec<Uuid>,
        problem: ReferenceProblem,
    },

    #[error("Nesting '{child_id}' under '{parent_id}' would create a cycle.")]
    NestingCycle { parent_id: Uuid, child_id: Uuid },

    #[error("Deletion refused: {}", describe_blockers(.0))]
    ReferencedEntity(Vec<DeletionBlocker>),

    // Resolution errors (E300-E399)
    #[error("Path resolution failed: {0}")]
    Resolution(ResolutionFailure),

    #[error("Goal resolver returned an invalid response: {0}")]
    InvalidResolverResponse(String),

    #[error("Goal resolver unavailable: {0}. Check `resolver.endpoint` with `skillpath config get resolver.endpoint`.")]
    ResolverUnavailable(String),

    // Request errors (E400-E499)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Lock errors (E500-E599)
    #[error("Lock timeout: aggregate '{0}' is busy. Try again later.")]
    LockTimeout(String),

    // Infrastructure errors (E600-E699)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::RepositoryNotFound(_) => "E001",
            Self::SkillNotFound(_) => "E002",
            Self::UnitNotFound(_) => "E003",
            Self::TemplatePathNotFound(_) => "E004",
            Self::PathNotFound(_) => "E005",
            Self::LearnerNotFound(_) => "E006",
            Self::LearnedSkillNotFound { .. } => "E007",
            Self::RepositoryConflict { .. } => "E100",
            Self::InvalidReference { .. } => "E200",
            Self::NestingCycle { .. } => "E201",
            Self::ReferencedEntity(_) => "E202",
            Self::Resolution(_) => "E300",
            Self::InvalidResolverResponse(_) => "E301",
            Self::ResolverUnavailable(_) => "E302",
            Self::InvalidRequest(_) => "E400",
            Self::LockTimeout(_) => "E500",
            Self::DatabaseError(_) => "E600",
            Self::NetworkError(_) => "E601",
            Self::ConfigError(_) => "E602",
            Self::Serialization(_) => "E603",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::RepositoryNotFound(_) => Some("skillpath repo list".to_string()),
            Self::SkillNotFound(_) => Some("skillpath skill list <repository-id>".to_string()),
            Self::LearnerNotFound(learner) => Some(format!("skillpath learner skills {}", learner)),
            Self::NestingCycle { child_id, .. } => {
                Some(format!("skillpath skill show {}", child_id))
            }
            Self::ReferencedEntity(blockers) => blockers
                .first()
                .map(|b| format!("skillpath skill show {}", b.skill_id)),
            Self::ResolverUnavailable(_) => {
                Some("skillpath config set resolver.endpoint <url>".to_string())
            }
            _ => None,
        }
    }

    /// Whether this error reports a missing entity
    pub fn is_not_found(&self) -> bool {
        self.code().starts_with("E0")
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{:#}", err))
    }
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_blockers(blockers: &[DeletionBlocker]) -> String {
    blockers
        .iter()
        .map(|b| {
            let mut parts = Vec::new();
            if !b.unit_ids.is_empty() {
                parts.push(format!("referenced by units [{}]", format_ids(&b.unit_ids)));
            }
            if !b.foreign_parent_ids.is_empty() {
                parts.push(format!(
                    "nested under [{}]",
                    format_ids(&b.foreign_parent_ids)
                ));
            }
            format!("skill {} {}", b.skill_id, parts.join(" and "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resolver::{FailureReason, ResolutionErrorKind};

    #[test]
    fn test_error_codes_are_grouped() {
        assert_eq!(Error::RepositoryNotFound(Uuid::nil()).code(), "E001");
        assert_eq!(Error::InvalidRequest("x".into()).code(), "E400");
        assert_eq!(Error::LockTimeout("repository:1".into()).code(), "E500");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(Error::PathNotFound(Uuid::nil()).is_not_found());
        assert!(Error::LearnerNotFound("l-1".into()).is_not_found());
        assert!(!Error::InvalidRequest("x".into()).is_not_found());
        assert!(
            !Error::NestingCycle {
                parent_id: Uuid::nil(),
                child_id: Uuid::nil()
            }
            .is_not_found()
        );
    }

    #[test]
    fn test_referenced_entity_message_names_units() {
        let skill_id = Uuid::new_v4();
        let unit_id = Uuid::new_v4();
        let err = Error::ReferencedEntity(vec![DeletionBlocker {
            skill_id,
            unit_ids: vec![unit_id],
            foreign_parent_ids: vec![],
        }]);

        let message = err.to_string();
        assert!(message.contains(&skill_id.to_string()));
        assert!(message.contains(&unit_id.to_string()));
        assert!(err.suggestion().unwrap().contains(&skill_id.to_string()));
    }

    #[test]
    fn test_conflict_message_without_version() {
        let err = Error::RepositoryConflict {
            owner_id: "owner-1".into(),
            name: "Rust".into(),
            version: None,
        };
        assert!(err.to_string().contains("version none"));
    }

    #[test]
    fn test_resolution_error_display() {
        let err = Error::Resolution(ResolutionFailure {
            kind: ResolutionErrorKind::PathNotFound,
            reason: FailureReason::Timeout,
            affected_skill_ids: vec![],
            affected_unit_ids: vec![],
        });
        assert!(err.to_string().contains("PATH_NOT_FOUND"));
        assert_eq!(err.code(), "E300");
    }
}
