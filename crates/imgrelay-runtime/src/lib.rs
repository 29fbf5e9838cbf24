//! Local image transfer for imgrelay.
//!
//! This crate moves image bytes between registries through a local container
//! engine: the `ContainerRuntime` trait abstracts pull/tag/push/untag, with a
//! docker CLI backend and an in-memory mock for tests. The `transfer` module
//! builds the pull and retag-push steps of a replication on top of it, and
//! `prereq` checks that the engine binary is installed.

pub mod backend;
pub mod docker;
pub mod mock;
pub mod prereq;
pub mod transfer;

pub use backend::{select_runtime, ContainerRuntime};
pub use docker::DockerCli;
pub use prereq::{check_transfer_prereqs, format_missing, MissingPrereq};
pub use transfer::{pull, retag_and_push, LocalImage, LocalTag};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("runtime '{0}' is not available on this system")]
    Unavailable(String),
    #[error("{operation} {image} failed: {message}")]
    Transfer {
        operation: &'static str,
        image: String,
        message: String,
    },
}

impl RuntimeError {
    pub fn transfer(
        operation: &'static str,
        image: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Transfer {
            operation,
            image: image.to_string(),
            message: message.into(),
        }
    }
}
