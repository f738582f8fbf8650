//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use skillpath_core::domain::resolver::{
    GoalResolver, ResolutionErrorKind, ResolutionFailure, ResolveOutcome, ResolveRequest,
};
use skillpath_core::domain::units::UnitSpec;
use skillpath_core::prelude::*;

/// Picks, in candidate order, any unit whose prerequisites are known and
/// which teaches something new, until every goal is known
#[derive(Default)]
pub struct GreedyResolver {
    pub requests: Mutex<Vec<ResolveRequest>>,
}

#[async_trait]
impl GoalResolver for GreedyResolver {
    async fn resolve(&self, request: ResolveRequest) -> Result<ResolveOutcome> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let mut known: BTreeSet<Uuid> = request.known_skill_ids.clone();
        let mut used: BTreeSet<Uuid> = BTreeSet::new();
        let mut sequence = Vec::new();

        while !request.goal_skill_ids.is_subset(&known) {
            let next = request.candidate_units.iter().find(|unit| {
                !used.contains(&unit.id)
                    && unit.required_skill_ids.iter().all(|s| known.contains(s))
                    && unit.teaching_goal_ids.iter().any(|s| !known.contains(s))
            });

            match next {
                Some(unit) => {
                    used.insert(unit.id);
                    known.extend(unit.teaching_goal_ids.iter().copied());
                    sequence.push(unit.id);
                }
                None => {
                    let unmet = request
                        .goal_skill_ids
                        .difference(&known)
                        .copied()
                        .collect();
                    return Ok(ResolveOutcome::Failure(ResolutionFailure::solver(
                        ResolutionErrorKind::PathNotFound,
                        unmet,
                        Vec::new(),
                    )));
                }
            }
        }

        Ok(ResolveOutcome::Path(sequence))
    }
}

/// Replays one outcome after an optional delay
pub struct ScriptedResolver {
    pub outcome: ResolveOutcome,
    pub delay: Duration,
}

impl ScriptedResolver {
    pub fn path(unit_ids: Vec<Uuid>) -> Self {
        Self {
            outcome: ResolveOutcome::Path(unit_ids),
            delay: Duration::ZERO,
        }
    }

    pub fn slow(unit_ids: Vec<Uuid>, delay: Duration) -> Self {
        Self {
            outcome: ResolveOutcome::Path(unit_ids),
            delay,
        }
    }
}

#[async_trait]
impl GoalResolver for ScriptedResolver {
    async fn resolve(&self, _request: ResolveRequest) -> Result<ResolveOutcome> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.outcome.clone())
    }
}

pub async fn context_with(resolver: impl GoalResolver + 'static) -> CoreContext {
    CoreContext::in_memory(Arc::new(resolver))
        .await
        .expect("in-memory context")
}

pub async fn greedy_context() -> CoreContext {
    context_with(GreedyResolver::default()).await
}

pub async fn repository(ctx: &CoreContext, name: &str) -> SkillRepository {
    ctx.repository_manager()
        .create_repository(NewRepository::new("owner-1", name))
        .await
        .expect("create repository")
}

pub async fn skill(ctx: &CoreContext, repository_id: Uuid, name: &str) -> Skill {
    ctx.graph_store()
        .add_skill(NewSkill::new(repository_id, name))
        .await
        .expect("create skill")
}

pub async fn unit(ctx: &CoreContext, title: &str, requires: &[Uuid], teaches: &[Uuid]) -> UnitSpec {
    let unit = UnitSpec::new(title)
        .requires(requires.iter().copied())
        .teaches(teaches.iter().copied());
    ctx.catalog().register_unit(&unit).await.expect("register unit");
    unit
}
