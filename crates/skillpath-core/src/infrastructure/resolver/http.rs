//! HTTP goal resolver client
//!
//! Posts the resolution request as JSON to `<endpoint>/resolve` and decodes
//! the resolver's answer:
//!
//! ```json
//! { "ok": true, "unitSequence": ["..."] }
//! { "ok": false, "errorType": "PATH_NOT_FOUND", "affectedSkillIds": [], "affectedUnitIds": [] }
//! ```

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::domain::resolver::{
    GoalResolver, ResolutionErrorKind, ResolutionFailure, ResolveMode, ResolveOutcome,
    ResolveRequest,
};
use crate::domain::units::UnitSpec;
use crate::error::{Error, Result};

/// Connection establishment bound; the overall call is bounded by the gateway
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    known_skill_ids: Vec<Uuid>,
    goal_skill_ids: Vec<Uuid>,
    candidate_units: Vec<WireUnit<'a>>,
    mode: ResolveMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireUnit<'a> {
    id: Uuid,
    required_skill_ids: &'a [Uuid],
    teaching_goal_ids: &'a [Uuid],
}

impl<'a> WireUnit<'a> {
    fn from_unit(unit: &'a UnitSpec) -> Self {
        Self {
            id: unit.id,
            required_skill_ids: &unit.required_skill_ids,
            teaching_goal_ids: &unit.teaching_goal_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    ok: bool,
    #[serde(default)]
    unit_sequence: Option<Vec<Uuid>>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    affected_skill_ids: Vec<Uuid>,
    #[serde(default)]
    affected_unit_ids: Vec<Uuid>,
}

impl WireResponse {
    fn into_outcome(self) -> Result<ResolveOutcome> {
        if self.ok {
            let sequence = self.unit_sequence.ok_or_else(|| {
                Error::InvalidResolverResponse("ok response without unitSequence".to_string())
            })?;
            return Ok(ResolveOutcome::Path(sequence));
        }

        let error_type = self.error_type.unwrap_or_default();
        let kind = ResolutionErrorKind::parse(&error_type).ok_or_else(|| {
            Error::InvalidResolverResponse(format!("unknown errorType '{}'", error_type))
        })?;

        Ok(ResolveOutcome::Failure(ResolutionFailure::solver(
            kind,
            self.affected_skill_ids,
            self.affected_unit_ids,
        )))
    }
}

/// Goal resolver reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpGoalResolver {
    http_client: HttpClient,
    endpoint: String,
}

impl HttpGoalResolver {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let http_client = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(Error::NetworkError)?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GoalResolver for HttpGoalResolver {
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveOutcome> {
        let url = format!("{}/resolve", self.endpoint);
        let body = WireRequest {
            known_skill_ids: request.known_skill_ids.iter().copied().collect(),
            goal_skill_ids: request.goal_skill_ids.iter().copied().collect(),
            candidate_units: request.candidate_units.iter().map(WireUnit::from_unit).collect(),
            mode: request.mode,
        };

        debug!(url = %url, candidates = body.candidate_units.len(), "Sending resolve request");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ResolverUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::ResolverUnavailable(format!(
                "resolver returned HTTP {}: {}",
                status.as_u16(),
                text.trim()
            )));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResolverResponse(format!("failed to parse response: {}", e)))?;

        wire.into_outcome()
    }
}

/// Stand-in used when no resolver endpoint is configured
#[derive(Debug, Clone, Default)]
pub struct UnconfiguredResolver;

#[async_trait]
impl GoalResolver for UnconfiguredResolver {
    async fn resolve(&self, _request: ResolveRequest) -> Result<ResolveOutcome> {
        Err(Error::ResolverUnavailable(
            "no resolver endpoint configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn request_for(unit: &UnitSpec, goal: Uuid, mode: ResolveMode) -> ResolveRequest {
        ResolveRequest {
            known_skill_ids: BTreeSet::new(),
            goal_skill_ids: BTreeSet::from([goal]),
            candidate_units: vec![unit.clone()],
            mode,
        }
    }

    #[tokio::test]
    async fn test_successful_resolution() {
        let server = MockServer::start_async().await;
        let goal = Uuid::new_v4();
        let unit = UnitSpec::new("Intro").teaches([goal]);

        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/resolve").json_body(json!({
                    "knownSkillIds": [],
                    "goalSkillIds": [goal],
                    "candidateUnits": [{
                        "id": unit.id,
                        "requiredSkillIds": [],
                        "teachingGoalIds": [goal],
                    }],
                    "mode": "optimal",
                }));
                then.status(200)
                    .json_body(json!({ "ok": true, "unitSequence": [unit.id] }));
            })
            .await;

        let resolver = HttpGoalResolver::new(server.base_url()).unwrap();
        let outcome = resolver
            .resolve(request_for(&unit, goal, ResolveMode::Optimal))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(outcome, ResolveOutcome::Path(vec![unit.id]));
    }

    #[tokio::test]
    async fn test_failure_response_decoded() {
        let server = MockServer::start_async().await;
        let goal = Uuid::new_v4();
        let unit = UnitSpec::new("Loop").requires([goal]).teaches([goal]);

        server
            .mock_async(|when, then| {
                when.method(POST).path("/resolve");
                then.status(200).json_body(json!({
                    "ok": false,
                    "errorType": "CYCLE_DETECTED",
                    "affectedSkillIds": [goal],
                    "affectedUnitIds": [unit.id],
                }));
            })
            .await;

        let resolver = HttpGoalResolver::new(format!("{}/", server.base_url())).unwrap();
        let outcome = resolver
            .resolve(request_for(&unit, goal, ResolveMode::Greedy))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ResolveOutcome::Failure(ResolutionFailure::solver(
                ResolutionErrorKind::CycleDetected,
                vec![goal],
                vec![unit.id],
            ))
        );
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/resolve");
                then.status(503).body("overloaded");
            })
            .await;

        let resolver = HttpGoalResolver::new(server.base_url()).unwrap();
        let unit = UnitSpec::new("Intro");
        let err = resolver
            .resolve(request_for(&unit, Uuid::new_v4(), ResolveMode::Greedy))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ResolverUnavailable(ref msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn test_unknown_error_type_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/resolve");
                then.status(200)
                    .json_body(json!({ "ok": false, "errorType": "SOLVER_CRASHED" }));
            })
            .await;

        let resolver = HttpGoalResolver::new(server.base_url()).unwrap();
        let unit = UnitSpec::new("Intro");
        let err = resolver
            .resolve(request_for(&unit, Uuid::new_v4(), ResolveMode::Greedy))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidResolverResponse(_)));
    }

    #[tokio::test]
    async fn test_unconfigured_resolver() {
        let unit = UnitSpec::new("Intro");
        let err = UnconfiguredResolver
            .resolve(request_for(&unit, Uuid::new_v4(), ResolveMode::Greedy))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E302");
    }
}
