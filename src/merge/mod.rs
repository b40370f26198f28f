//! Merge decision engine
//!
//! Two-phase pattern:
//! 1. Plan - ordered readiness checks over gathered facts (pure, testable)
//! 2. Execute - gather lazily, rebase if needed, merge (effectful)
//!
//! The readiness checks are shared with `status sync`, which classifies
//! without merging.

mod execute;
mod plan;

pub use execute::{MergeInput, MergeOptions, MergeOutcome, check_readiness, merge};
pub use plan::{
    Readiness, ReadinessOptions, assess, check_build, check_pull_request, check_reviews,
};
