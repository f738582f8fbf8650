//! Goal resolution
//!
//! The ordering search itself belongs to an external resolver. This module
//! defines the contract, bounds calls in time, checks responses against the
//! offered candidates, and captures the inputs.

pub mod gateway;
pub mod snapshot;
pub mod types;

pub use gateway::{GoalResolver, ResolverGateway};
pub use snapshot::ResolutionSnapshot;
pub use types::{
    FailureReason, ResolutionErrorKind, ResolutionFailure, ResolveMode, ResolveOutcome,
    ResolveRequest,
};
