//! Registry control plane for imgrelay.
//!
//! This crate talks to the registries on either side of a replication: the
//! `RegistryControl` trait abstracts the control-plane API (describe, create,
//! list images, issue pull/push tokens), `ecr` implements it against Amazon
//! ECR with SigV4-signed requests, and `mock` provides an in-memory fleet of
//! registries for tests. On top of the trait sit the three leaf components of
//! the replication engine: the credential provider (`auth`), the repository
//! catalog (`catalog`) and the repository provisioner (`provision`).

pub mod auth;
pub mod aws;
pub mod catalog;
pub mod ecr;
pub mod mock;
pub mod provision;
pub mod sigv4;

pub use auth::get_credential;
pub use aws::AwsCredentials;
pub use catalog::{list_repositories, list_tags};
pub use ecr::{EcrClient, EcrConnector};
pub use provision::{ensure_repository, Provisioned};

use chrono::{DateTime, Utc};
use imgrelay_schema::{ImageTag, RegistryEndpoint, RepositoryDescriptor};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("registry error {code}: {message}")]
    Unknown { code: String, message: String },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("registry config error: {0}")]
    Config(String),
    #[error("registry I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One image in a repository. Untagged images carry only a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageIdentifier {
    pub digest: String,
    pub tag: Option<ImageTag>,
}

/// Raw pull/push token as issued by the registry.
#[derive(Debug, Clone)]
pub struct AuthorizationData {
    /// Base64 of `principal:secret`.
    pub token: String,
    /// Registry URL the token is valid for, e.g. `https://<host>`.
    pub proxy_endpoint: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Control-plane API of a single registry instance.
pub trait RegistryControl: Send + Sync {
    fn endpoint(&self) -> &RegistryEndpoint;

    /// Every repository in the registry.
    fn describe_repositories(&self) -> Result<Vec<RepositoryDescriptor>, RegistryError>;

    /// Look up one repository by exact name. Fails with
    /// [`RegistryError::NotFound`] only when the repository does not exist.
    fn describe_repository(&self, name: &str) -> Result<RepositoryDescriptor, RegistryError>;

    fn create_repository(&self, name: &str) -> Result<RepositoryDescriptor, RegistryError>;

    /// Every image in `repository`, tagged or not.
    fn list_images(&self, repository: &str) -> Result<Vec<ImageIdentifier>, RegistryError>;

    /// Issue a short-lived token for pulling from and pushing to this registry.
    fn get_authorization_token(&self) -> Result<AuthorizationData, RegistryError>;
}

/// Opens a control-plane session for a registry endpoint.
pub trait RegistryConnector: Send + Sync {
    fn connect(
        &self,
        endpoint: &RegistryEndpoint,
    ) -> Result<Box<dyn RegistryControl>, RegistryError>;
}
