//! fleet-pr - apply one change across many GitHub/GitLab repositories
//!
//! The library is organised around a resumable, per-repo stage pipeline:
//!
//! - [`catalog`] - discover target repos and persist them in `init.json`
//! - [`artifact`] - per-repo, per-stage JSON results (the resumability layer)
//! - [`runtime`] - bounded concurrency, shared API throttle, retry/backoff
//! - [`platform`] - GitHub and GitLab services behind one trait
//! - [`push`] - force-push and converge on exactly one PR/MR
//! - [`merge`] - ordered readiness checks and merge execution
//! - [`status`] - derive pipeline stage and detail, optionally syncing live
//! - [`pipeline`] - the stage drivers that tie the above together

pub mod artifact;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod git;
pub mod merge;
pub mod pipeline;
pub mod platform;
pub mod push;
pub mod runtime;
pub mod status;
pub mod types;
