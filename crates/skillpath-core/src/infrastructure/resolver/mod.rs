//! Goal resolver clients

mod http;

pub use http::{HttpGoalResolver, UnconfiguredResolver};
