//! Bounded, contract-checked access to a goal resolver

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{ResolutionFailure, ResolveOutcome, ResolveRequest};
use crate::error::{Error, Result};

/// An external shortest-path / ordering solver
///
/// Implementations are pure functions of the request. Transport problems
/// are reported as `Err`; a resolver that answered but found no path
/// returns [`ResolveOutcome::Failure`].
#[async_trait]
pub trait GoalResolver: Send + Sync {
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveOutcome>;
}

/// Wraps a [`GoalResolver`] with a time bound and response validation
///
/// The gateway never retries and never alters the requested mode.
#[derive(Clone)]
pub struct ResolverGateway {
    resolver: Arc<dyn GoalResolver>,
    default_timeout: Duration,
}

impl ResolverGateway {
    pub fn new(resolver: Arc<dyn GoalResolver>, default_timeout: Duration) -> Self {
        Self {
            resolver,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Resolve a request into an ordered unit sequence
    ///
    /// Timeout expiry becomes `PATH_NOT_FOUND` with reason `Timeout` and the
    /// goals as affected skills.
    pub async fn resolve(
        &self,
        request: ResolveRequest,
        timeout: Option<Duration>,
    ) -> Result<Vec<Uuid>> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let goals: Vec<Uuid> = request.goal_skill_ids.iter().copied().collect();
        let candidates: Vec<Uuid> = request.candidate_units.iter().map(|u| u.id).collect();

        debug!(
            mode = %request.mode,
            goals = goals.len(),
            known = request.known_skill_ids.len(),
            candidates = candidates.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Calling goal resolver"
        );

        let outcome = match tokio::time::timeout(timeout, self.resolver.resolve(request)).await {
            Ok(outcome) => outcome?,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Goal resolver timed out");
                return Err(Error::Resolution(ResolutionFailure::timeout(goals)));
            }
        };

        match outcome {
            ResolveOutcome::Path(sequence) => {
                let unknown: Vec<String> = sequence
                    .iter()
                    .filter(|id| !candidates.contains(id))
                    .map(Uuid::to_string)
                    .collect();
                if !unknown.is_empty() {
                    warn!(unknown = ?unknown, "Goal resolver returned units outside the candidate set");
                    return Err(Error::InvalidResolverResponse(format!(
                        "units not offered as candidates: {}",
                        unknown.join(", ")
                    )));
                }

                info!(units = sequence.len(), "Goal resolver produced a path");
                Ok(sequence)
            }
            ResolveOutcome::Failure(failure) => {
                info!(kind = %failure.kind, "Goal resolver reported failure");
                Err(Error::Resolution(failure))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resolver::{FailureReason, ResolutionErrorKind, ResolveMode};
    use crate::domain::units::UnitSpec;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Resolver replaying a fixed outcome and recording requests
    struct FixedResolver {
        outcome: ResolveOutcome,
        delay: Duration,
        seen: Mutex<Vec<ResolveRequest>>,
    }

    impl FixedResolver {
        fn new(outcome: ResolveOutcome) -> Self {
            Self {
                outcome,
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GoalResolver for FixedResolver {
        async fn resolve(&self, request: ResolveRequest) -> Result<ResolveOutcome> {
            self.seen.lock().unwrap().push(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.outcome.clone())
        }
    }

    fn request(units: &[UnitSpec], mode: ResolveMode) -> ResolveRequest {
        ResolveRequest {
            known_skill_ids: BTreeSet::new(),
            goal_skill_ids: BTreeSet::from([Uuid::new_v4()]),
            candidate_units: units.to_vec(),
            mode,
        }
    }

    #[tokio::test]
    async fn test_path_is_returned_and_mode_passed_through() {
        let unit = UnitSpec::new("Intro");
        let resolver = Arc::new(FixedResolver::new(ResolveOutcome::Path(vec![unit.id])));
        let gateway = ResolverGateway::new(resolver.clone(), Duration::from_secs(1));

        let sequence = gateway
            .resolve(request(&[unit.clone()], ResolveMode::Optimal), None)
            .await
            .unwrap();

        assert_eq!(sequence, vec![unit.id]);
        let seen = resolver.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].mode, ResolveMode::Optimal);
    }

    #[tokio::test]
    async fn test_unknown_unit_rejected() {
        let unit = UnitSpec::new("Intro");
        let resolver = Arc::new(FixedResolver::new(ResolveOutcome::Path(vec![
            unit.id,
            Uuid::new_v4(),
        ])));
        let gateway = ResolverGateway::new(resolver, Duration::from_secs(1));

        let err = gateway
            .resolve(request(&[unit], ResolveMode::Greedy), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResolverResponse(_)));
    }

    #[tokio::test]
    async fn test_failure_is_surfaced_without_retry() {
        let failure = ResolutionFailure::solver(ResolutionErrorKind::CycleDetected, vec![], vec![]);
        let resolver = Arc::new(FixedResolver::new(ResolveOutcome::Failure(failure.clone())));
        let gateway = ResolverGateway::new(resolver.clone(), Duration::from_secs(1));

        let err = gateway
            .resolve(request(&[], ResolveMode::Greedy), None)
            .await
            .unwrap_err();

        match err {
            Error::Resolution(f) => assert_eq!(f, failure),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(resolver.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_path_not_found() {
        let mut slow = FixedResolver::new(ResolveOutcome::Path(vec![]));
        slow.delay = Duration::from_secs(60);
        let gateway = ResolverGateway::new(Arc::new(slow), Duration::from_secs(30));

        let req = request(&[], ResolveMode::Optimal);
        let goals: Vec<Uuid> = req.goal_skill_ids.iter().copied().collect();
        let err = gateway
            .resolve(req, Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        match err {
            Error::Resolution(f) => {
                assert_eq!(f.kind, ResolutionErrorKind::PathNotFound);
                assert_eq!(f.reason, FailureReason::Timeout);
                assert_eq!(f.affected_skill_ids, goals);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
