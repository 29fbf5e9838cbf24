//! Replication engine for imgrelay.
//!
//! This crate ties together the registry control plane and the local
//! container runtime into the `Replicator`: one run lists the matching source
//! repositories, pulls their tags once, then walks every destination region in
//! order, provisioning repositories and pushing only the tags each
//! destination is missing. It also provides the per-tag state machine, the
//! opt-in retry policy and the run report.

pub mod engine;
pub mod lifecycle;
pub mod report;
pub mod retry;

pub use engine::Replicator;
pub use lifecycle::{validate_transition, TagState};
pub use report::{RegionReport, ReplicationReport, TagOutcome};
pub use retry::{RetryPolicy, Retryable};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(#[from] imgrelay_schema::ConfigError),
    #[error("registry error: {0}")]
    Registry(#[from] imgrelay_registry::RegistryError),
    #[error("transfer error: {0}")]
    Runtime(#[from] imgrelay_runtime::RuntimeError),
    #[error("invalid tag state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}
